//! Prompt templates: two immutable built-ins and one user-editable custom
//! template persisted in a durable slot.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use hub_core::{HubError, PromptTemplate, Result, SlotStore};

/// Id of the designated default template.
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Id of the synthesis template.
pub const SUMMARY_TEMPLATE_ID: &str = "summary";

/// Id of the user-editable template.
pub const CUSTOM_TEMPLATE_ID: &str = "custom";

/// Durable slot holding the custom template content.
pub const CUSTOM_SLOT: &str = "customRagPrompt";

/// Shown as the custom template until the user saves one.
pub const CUSTOM_PLACEHOLDER: &str =
    "Write your custom prompt here. Use {query} and {context} as variables.";

/// Placeholders a template is expected to use.
pub const PLACEHOLDERS: [&str; 2] = ["{query}", "{context}"];

const DEFAULT_CONTENT: &str = "\
You are a search assistant. Your task is to find and extract the most relevant passages from the provided text to answer the user's query.
Do not synthesize or generate new answers. Your response should consist only of direct quotes from the text.
If no relevant passages are found, simply state that.

**Query:** {query}

**Context:**
---
{context}
---

**Citations:**";

const SUMMARY_CONTENT: &str = "\
Answer the question based on the provided text. If the text does not contain a direct answer, summarize the most important information it contains that relates to the question.

**Question:** {query}

**Text:**
---
{context}
---";

struct BuiltIn {
    id: &'static str,
    name: &'static str,
    content: &'static str,
}

static BUILT_INS: [BuiltIn; 2] = [
    BuiltIn {
        id: DEFAULT_TEMPLATE_ID,
        name: "Default (direct extraction)",
        content: DEFAULT_CONTENT,
    },
    BuiltIn {
        id: SUMMARY_TEMPLATE_ID,
        name: "Summary",
        content: SUMMARY_CONTENT,
    },
];

impl BuiltIn {
    fn template(&self) -> PromptTemplate {
        PromptTemplate {
            id: self.id.to_string(),
            name: self.name.to_string(),
            content: self.content.to_string(),
            is_custom: false,
        }
    }
}

fn built_in(id: &str) -> Option<&'static BuiltIn> {
    BUILT_INS.iter().find(|b| b.id == id)
}

/// Which of `{query}` and `{context}` a template does not use.
pub fn missing_placeholders(content: &str) -> Vec<&'static str> {
    PLACEHOLDERS
        .iter()
        .copied()
        .filter(|p| !content.contains(p))
        .collect()
}

/// Catalog of prompt templates plus the custom-template editor state.
pub struct PromptRegistry {
    slots: Arc<dyn SlotStore>,
    selected: Mutex<String>,
    draft: Mutex<Option<String>>,
}

impl PromptRegistry {
    /// Create a registry reading the custom template from `slots`.
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self {
            slots,
            selected: Mutex::new(DEFAULT_TEMPLATE_ID.to_string()),
            draft: Mutex::new(None),
        }
    }

    /// All templates, built-ins first and the custom template last.
    pub fn list(&self) -> Result<Vec<PromptTemplate>> {
        let mut templates: Vec<_> = BUILT_INS.iter().map(BuiltIn::template).collect();
        templates.push(self.custom()?);
        Ok(templates)
    }

    /// Look up a template by id.
    pub fn get(&self, id: &str) -> Result<PromptTemplate> {
        if let Some(b) = built_in(id) {
            return Ok(b.template());
        }
        if id == CUSTOM_TEMPLATE_ID {
            return self.custom();
        }
        Err(HubError::not_found("prompt template", id))
    }

    /// Content to send for a template id; `None` when the content is empty.
    pub fn resolve(&self, id: &str) -> Result<Option<String>> {
        let template = self.get(id)?;
        if template.content.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(template.content))
        }
    }

    /// Make a template the current selection.
    pub fn select(&self, id: &str) -> Result<PromptTemplate> {
        let template = self.get(id)?;
        let mut selected = self
            .selected
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        *selected = template.id.clone();
        debug!("Selected prompt template {}", template.id);
        Ok(template)
    }

    /// The current selection (initially the default template).
    pub fn selected(&self) -> Result<PromptTemplate> {
        let id = self
            .selected
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?
            .clone();
        self.get(&id)
    }

    /// Persist new custom template content, replacing the previous one.
    pub fn save_custom(&self, content: &str) -> Result<PromptTemplate> {
        let missing = missing_placeholders(content);
        if !missing.is_empty() {
            warn!("Custom prompt does not use {}", missing.join(" or "));
        }

        self.slots.save(CUSTOM_SLOT, content)?;
        self.set_draft(Some(content.to_string()))?;
        info!("Saved custom prompt ({} bytes)", content.len());

        self.custom()
    }

    /// Edit a template. Built-ins are read-only.
    pub fn update(&self, id: &str, content: &str) -> Result<PromptTemplate> {
        if built_in(id).is_some() {
            return Err(HubError::permission_denied(format!(
                "built-in prompt template '{}' cannot be modified",
                id
            )));
        }
        if id == CUSTOM_TEMPLATE_ID {
            return self.save_custom(content);
        }
        Err(HubError::not_found("prompt template", id))
    }

    /// Replace the unsaved editor content of the custom template.
    pub fn edit_draft(&self, content: &str) -> Result<()> {
        self.set_draft(Some(content.to_string()))
    }

    /// Editor content: the unsaved draft, or the saved custom content.
    pub fn draft(&self) -> Result<String> {
        let draft = self
            .draft
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?
            .clone();
        match draft {
            Some(content) => Ok(content),
            None => Ok(self.custom()?.content),
        }
    }

    /// Copy the default template's content into the editor draft.
    ///
    /// Neither the default template nor the saved custom content changes.
    pub fn restore_default(&self) -> Result<String> {
        self.set_draft(Some(DEFAULT_CONTENT.to_string()))?;
        debug!("Editor draft restored from default template");
        Ok(DEFAULT_CONTENT.to_string())
    }

    fn custom(&self) -> Result<PromptTemplate> {
        let content = self
            .slots
            .load(CUSTOM_SLOT)?
            .unwrap_or_else(|| CUSTOM_PLACEHOLDER.to_string());
        Ok(PromptTemplate {
            id: CUSTOM_TEMPLATE_ID.to_string(),
            name: "Custom".to_string(),
            content,
            is_custom: true,
        })
    }

    fn set_draft(&self, content: Option<String>) -> Result<()> {
        let mut draft = self
            .draft
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        *draft = content;
        Ok(())
    }
}
