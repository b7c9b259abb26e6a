//! `text_formatter`: tidies generated text before it is published.
//!
//! Trims surrounding whitespace, collapses blank-line pairs into single line
//! breaks and ends the text with a period unless it already ends in `.`, `!`
//! or `?`. The result replaces the input key; the untouched text is kept under
//! `original_text`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use pipeline::{CredentialStore, DataBag, Node, NodeConfig, NodeDefinition, NodeError, RunContext};

use crate::{GENERATED_TEXT, ORIGINAL_TEXT};

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default = "default_input_key")]
    input_key: String,
}

fn default_input_key() -> String {
    GENERATED_TEXT.to_string()
}

/// Normalises text in the data bag. Needs no credentials.
#[derive(Debug)]
pub struct TextFormatter {
    config: NodeConfig,
    input_key: String,
}

impl TextFormatter {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let params: Params = config.decode(&[])?;
        if params.input_key.is_empty() {
            return Err(NodeError::invalid_parameter("input_key", "must not be empty"));
        }
        Ok(Self {
            config,
            input_key: params.input_key,
        })
    }
}

/// Node factory for the `text_formatter` type tag.
pub fn create(
    definition: &NodeDefinition,
    _credentials: &CredentialStore,
) -> Result<Arc<dyn Node>, NodeError> {
    Ok(Arc::new(TextFormatter::new(NodeConfig::from_definition(
        definition,
    ))?))
}

/// Applies the formatting rules to `text`.
pub fn format_text(text: &str) -> String {
    let mut formatted = text.trim().replace("\n\n", "\n");
    if !formatted.ends_with(['.', '!', '?']) {
        formatted.push('.');
    }
    formatted
}

#[async_trait]
impl Node for TextFormatter {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn validate(&self) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, _ctx: &RunContext, input: &DataBag) -> Result<DataBag, NodeError> {
        let original = match input.get(&self.input_key) {
            Some(Value::String(text)) => text,
            Some(_) => {
                return Err(NodeError::Input {
                    key: self.input_key.clone(),
                    reason: "is not a string".to_string(),
                })
            }
            None => {
                return Err(NodeError::Input {
                    key: self.input_key.clone(),
                    reason: "is missing".to_string(),
                })
            }
        };

        let formatted = format_text(original);
        debug!(node = %self.name(), before = original.len(), after = formatted.len(), "Text formatted");

        Ok(DataBag::new()
            .with(self.input_key.clone(), formatted)
            .with(ORIGINAL_TEXT, original.clone()))
    }
}
