//! hub-query - Search sessions
//!
//! This crate runs searches against a notebook or a global collection and
//! keeps the result of the most recently issued request only.
//!
//! # Example
//!
//! ```rust,ignore
//! use hub_query::SearchSession;
//!
//! let session = SearchSession::from_hub(&hub, config.search.clone());
//! let target = SearchTarget::notebook(id, IndexMode::Basic);
//! let result = session.execute("warranty terms", target, 5, "default").await?;
//! for citation in session.citations() {
//!     println!("{}", citation);
//! }
//! ```

mod citation;
mod session;

pub use citation::{resolve_citations, ResolvedCitation};
pub use session::{SearchSession, SessionSnapshot};
