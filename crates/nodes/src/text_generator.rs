//! `text_generator`: renders a prompt from the data bag and asks a language
//! model to complete it.
//!
//! Parameters:
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `prompt_template` | string, required | |
//! | `system_prompt` | string | none |
//! | `model` | string | bundle `model`, then `gpt-3.5-turbo` |
//! | `max_tokens` | positive integer | bundle `max_tokens`, then 300 |
//! | `temperature` | number in `0.0..=2.0` | bundle `temperature`, then 0.8 |
//!
//! The `openai` bundle must carry an `api_key` starting with `sk-`; an optional
//! `base_url` points the client at an OpenAI-compatible endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use pipeline::{
    CredentialBundle, CredentialStore, DataBag, Fallback, LanguageModel, LanguageModelConnector,
    LanguageModelCredentials, ModelParams, Node, NodeConfig, NodeDefinition, NodeError,
    NodeFactory, Prompt, RunContext,
};

use crate::template;
use crate::{GENERATED_TEXT, MODEL_USED, OPENAI_SERVICE, TOKENS_USED};

const API_KEY_PREFIX: &str = "sk-";
const API_KEY_MIN_LEN: usize = 20;

#[derive(Debug, Deserialize)]
struct Params {
    prompt_template: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
}

/// Fields read from the `openai` credential bundle.
#[derive(Deserialize)]
struct Bundle {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
}

impl Bundle {
    fn decode(bundle: &CredentialBundle) -> Result<Self, NodeError> {
        serde_json::from_value(serde_json::Value::Object(bundle.as_map().clone()))
            .map_err(|e| NodeError::invalid_credential(OPENAI_SERVICE, "bundle", e.to_string()))
    }

    fn credentials(&self) -> Result<LanguageModelCredentials, NodeError> {
        let api_key = match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key.trim(),
            _ => {
                return Err(NodeError::invalid_credential(
                    OPENAI_SERVICE,
                    "api_key",
                    "must be a non-empty string",
                ))
            }
        };
        if !api_key.starts_with(API_KEY_PREFIX) {
            return Err(NodeError::invalid_credential(
                OPENAI_SERVICE,
                "api_key",
                format!("must start with '{API_KEY_PREFIX}'"),
            ));
        }
        if api_key.len() < API_KEY_MIN_LEN {
            return Err(NodeError::invalid_credential(
                OPENAI_SERVICE,
                "api_key",
                format!("must be at least {API_KEY_MIN_LEN} characters"),
            ));
        }

        Ok(LanguageModelCredentials {
            api_key: api_key.to_string(),
            base_url: self.base_url.clone().filter(|url| !url.is_empty()),
        })
    }
}

/// Generates text with a language model.
pub struct TextGenerator {
    config: NodeConfig,
    prompt_template: String,
    system_prompt: Option<String>,
    params: ModelParams,
    model: Option<Arc<dyn LanguageModel>>,
}

impl TextGenerator {
    /// Builds the node from a resolved configuration.
    ///
    /// Without an `openai` bundle the node is still built; [`Node::validate`]
    /// then reports the missing credentials.
    pub fn new(config: NodeConfig, connector: &LanguageModelConnector) -> Result<Self, NodeError> {
        let params: Params = config.decode(&["prompt_template"])?;
        if params.prompt_template.trim().is_empty() {
            return Err(NodeError::invalid_parameter(
                "prompt_template",
                "must not be empty",
            ));
        }

        let bundle = config
            .credentials(OPENAI_SERVICE)
            .map(Bundle::decode)
            .transpose()?;

        let defaults = ModelParams::default();
        let model_params = ModelParams {
            model: params
                .model
                .or_else(|| bundle.as_ref().and_then(|b| b.model.clone()))
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.model),
            max_tokens: params
                .max_tokens
                .or_else(|| bundle.as_ref().and_then(|b| b.max_tokens))
                .unwrap_or(defaults.max_tokens),
            temperature: params
                .temperature
                .or_else(|| bundle.as_ref().and_then(|b| b.temperature))
                .unwrap_or(defaults.temperature),
        };

        if model_params.max_tokens == 0 {
            return Err(NodeError::invalid_parameter(
                "max_tokens",
                "must be greater than zero",
            ));
        }
        if !ModelParams::is_valid_temperature(model_params.temperature) {
            return Err(NodeError::invalid_parameter(
                "temperature",
                format!("{} is outside 0.0..=2.0", model_params.temperature),
            ));
        }

        let model = match bundle {
            Some(bundle) => {
                let credentials = bundle.credentials()?;
                Some(connector(&credentials)?)
            }
            None => None,
        };

        Ok(Self {
            config,
            prompt_template: params.prompt_template,
            system_prompt: params.system_prompt.filter(|s| !s.trim().is_empty()),
            params: model_params,
            model,
        })
    }

    /// Sampling parameters after applying overrides and defaults.
    pub fn model_params(&self) -> &ModelParams {
        &self.params
    }

    fn language_model(&self) -> Result<&Arc<dyn LanguageModel>, NodeError> {
        self.model.as_ref().ok_or_else(|| NodeError::MissingCredentials {
            service: OPENAI_SERVICE.to_string(),
        })
    }
}

#[async_trait]
impl Node for TextGenerator {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn validate(&self) -> Result<(), NodeError> {
        self.language_model().map(|_| ())
    }

    async fn execute(&self, ctx: &RunContext, input: &DataBag) -> Result<DataBag, NodeError> {
        let model = self.language_model()?;

        let rendered = template::render(&self.prompt_template, input);
        if !rendered.unresolved.is_empty() {
            warn!(
                node = %self.name(),
                unresolved = ?rendered.unresolved,
                "Prompt placeholders left unresolved"
            );
        }

        let mut prompt = Prompt::user(rendered.text);
        if let Some(system) = &self.system_prompt {
            prompt = prompt.with_system(system.clone());
        }

        debug!(
            run_id = %ctx.run_id(),
            node = %self.name(),
            service = model.service(),
            model = %self.params.model,
            max_tokens = self.params.max_tokens,
            "Requesting completion"
        );
        let generation = model.generate_text(&prompt, &self.params).await?;
        info!(
            node = %self.name(),
            model = %generation.model,
            tokens = generation.usage.map(|t| t.as_u64()),
            chars = generation.text.len(),
            "Text generated"
        );

        let mut output = DataBag::new()
            .with(GENERATED_TEXT, generation.text)
            .with(MODEL_USED, generation.model);
        if let Some(usage) = generation.usage {
            output.insert(TOKENS_USED, usage.as_u64());
        }
        Ok(output)
    }
}

/// Builds [`TextGenerator`] nodes, opening one client per credential bundle.
///
/// An absent credential reference resolves to the `default` bundle; if that
/// does not exist either, the node is built without credentials. An explicit
/// reference that names no bundle fails the build.
pub struct TextGeneratorFactory {
    connector: LanguageModelConnector,
}

impl TextGeneratorFactory {
    pub fn new(connector: LanguageModelConnector) -> Self {
        Self { connector }
    }
}

impl NodeFactory for TextGeneratorFactory {
    fn create(
        &self,
        definition: &NodeDefinition,
        credentials: &CredentialStore,
    ) -> Result<Arc<dyn Node>, NodeError> {
        let reference = definition.credentials_ref();
        let mut config = NodeConfig::from_definition(definition);

        match credentials.resolve(OPENAI_SERVICE, reference.as_ref(), Fallback::Default) {
            Ok(bundle) => config = config.with_credentials(OPENAI_SERVICE, bundle),
            Err(NodeError::CredentialNotFound { .. }) if reference.is_none() => {
                debug!(
                    node = %definition.display_name(),
                    "No default openai credentials; node will fail validation"
                );
            }
            Err(err) => return Err(err),
        }

        Ok(Arc::new(TextGenerator::new(config, &self.connector)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{DelegateError, ErrorKind, Generation, NodeId, NodeType, TokenCount};
    use serde_json::json;
    use std::sync::Mutex;

    const KEY: &str = "sk-test-key-1234567890";

    struct Echo {
        seen: Mutex<Vec<(Prompt, ModelParams)>>,
    }

    #[async_trait]
    impl LanguageModel for Echo {
        fn service(&self) -> &str {
            "echo"
        }

        async fn generate_text(
            &self,
            prompt: &Prompt,
            params: &ModelParams,
        ) -> Result<Generation, DelegateError> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.clone(), params.clone()));
            Ok(Generation {
                text: format!("echo: {}", prompt.user),
                model: params.model.clone(),
                usage: Some(TokenCount::new(12)),
            })
        }
    }

    fn connector(model: Arc<Echo>) -> LanguageModelConnector {
        Arc::new(
            move |_: &LanguageModelCredentials| -> Result<Arc<dyn LanguageModel>, DelegateError> {
                Ok(model.clone())
            },
        )
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn definition() -> NodeDefinition {
        NodeDefinition::new(
            NodeId::new("gen").unwrap(),
            NodeType::new("text_generator").unwrap(),
            "Generator",
        )
        .with_param("prompt_template", "Write about {{topic}}")
    }

    fn store(bundle: serde_json::Value) -> CredentialStore {
        CredentialStore::builder()
            .bundle("openai", "default", bundle)
            .build()
    }

    #[test]
    fn test_parameter_precedence_over_bundle_and_defaults() {
        let store = store(json!({"api_key": KEY, "model": "gpt-4o-mini", "temperature": 0.2}));
        let def = definition().with_param("temperature", 1.5);
        let config = NodeConfig::from_definition(&def)
            .with_credentials("openai", store.get("openai", "default").unwrap());

        let generator = TextGenerator::new(config, &connector(echo())).unwrap();
        generator.validate().unwrap();

        let params = generator.model_params();
        assert_eq!(params.model, "gpt-4o-mini");
        assert_eq!(params.temperature, 1.5);
        assert_eq!(params.max_tokens, 300);
    }

    #[test]
    fn test_api_key_format_is_checked_at_construction() {
        let factory = TextGeneratorFactory::new(connector(echo()));
        for bad in ["pk-0123456789012345678", "sk-short", ""] {
            let err = factory
                .create(&definition(), &store(json!({ "api_key": bad })))
                .err()
                .unwrap();
            assert!(
                matches!(err, NodeError::InvalidCredentialFormat { ref field, .. } if field == "api_key"),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn test_out_of_range_model_params_rejected() {
        let factory = TextGeneratorFactory::new(connector(echo()));
        let store = store(json!({ "api_key": KEY }));

        let err = factory
            .create(&definition().with_param("temperature", 2.5), &store)
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::InvalidParameter { ref parameter, .. } if parameter == "temperature"));

        let err = factory
            .create(&definition().with_param("max_tokens", 0), &store)
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::InvalidParameter { ref parameter, .. } if parameter == "max_tokens"));
    }

    #[test]
    fn test_missing_prompt_template() {
        let factory = TextGeneratorFactory::new(connector(echo()));
        let def = NodeDefinition::new(
            NodeId::new("gen").unwrap(),
            NodeType::new("text_generator").unwrap(),
            "Generator",
        );
        let err = factory
            .create(&def, &store(json!({ "api_key": KEY })))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::MissingParameter { ref parameter } if parameter == "prompt_template"));
    }

    #[test]
    fn test_without_default_bundle_builds_but_fails_validation() {
        let factory = TextGeneratorFactory::new(connector(echo()));
        let node = factory.create(&definition(), &CredentialStore::new()).unwrap();

        let err = node.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(err, NodeError::MissingCredentials { ref service } if service == "openai"));
    }

    #[test]
    fn test_unknown_explicit_reference_fails_build() {
        let factory = TextGeneratorFactory::new(connector(echo()));
        let err = factory
            .create(
                &definition().with_credentials("premium"),
                &store(json!({ "api_key": KEY })),
            )
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::CredentialNotFound { ref name, .. } if name == "premium"));
    }

    #[tokio::test]
    async fn test_execute_renders_prompt_and_reports_usage() {
        let model = echo();
        let factory = TextGeneratorFactory::new(connector(Arc::clone(&model)));
        let def = definition().with_param("system_prompt", "Be brief.");
        let node = factory.create(&def, &store(json!({ "api_key": KEY }))).unwrap();

        let input = DataBag::new().with("topic", "focus");
        let output = node.execute(&RunContext::new(), &input).await.unwrap();

        assert_eq!(output.get_str(GENERATED_TEXT), Some("echo: Write about focus"));
        assert_eq!(output.get_str(MODEL_USED), Some("gpt-3.5-turbo"));
        assert_eq!(output.get(TOKENS_USED), Some(&json!(12)));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.system.as_deref(), Some("Be brief."));
    }
}
