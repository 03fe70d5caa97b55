//! hub-notebook - Notebook-side orchestration
//!
//! This crate keeps the client's view of notebooks, their file membership,
//! their indexing jobs and the prompt template catalog consistent with the
//! notebook service.
//!
//! # Components
//!
//! - [`NotebookStore`] - authoritative notebook list, refreshed after writes
//! - [`FileMembership`] - ordered file list per notebook
//! - [`IndexingCoordinator`] - one indexing job per notebook
//! - [`PromptRegistry`] - built-in and custom prompt templates
//! - [`Hub`] - the context object wiring them together

mod hub;
mod indexing;
mod membership;
pub mod prompts;
mod store;

pub use hub::Hub;
pub use indexing::IndexingCoordinator;
pub use membership::FileMembership;
pub use prompts::{
    missing_placeholders, PromptRegistry, CUSTOM_PLACEHOLDER, CUSTOM_SLOT, CUSTOM_TEMPLATE_ID,
    DEFAULT_TEMPLATE_ID, SUMMARY_TEMPLATE_ID,
};
pub use store::NotebookStore;
