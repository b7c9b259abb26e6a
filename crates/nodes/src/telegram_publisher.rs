//! `telegram_publisher`: posts text from the data bag to a Telegram channel.
//!
//! The node requires an explicit credential reference to a `telegram` bundle
//! holding `token` (at least 30 characters) and `channel_id` (at least 3
//! characters; `@handle` or numeric id). Parameters:
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `message_template` | string containing `{text}` or `%s` | [`DEFAULT_MESSAGE_TEMPLATE`] |
//! | `parse_mode` | `markdown`, `markdown_v2`, `html`, `plain` | `markdown` |
//! | `input_key` | string | `generated_text` |

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use pipeline::{
    ChannelRef, CredentialBundle, CredentialStore, DataBag, Fallback, Messenger,
    MessengerConnector, MessengerCredentials, Node, NodeConfig, NodeDefinition, NodeError,
    NodeFactory, ParseMode, RunContext,
};

use crate::{GENERATED_TEXT, TELEGRAM_SERVICE};

/// Frame wrapped around the published text when no template is configured.
pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "💪 *Motivational Message of the Day*\n\n{text}\n\n✨ Have an amazing day!";

const TEXT_PLACEHOLDER: &str = "{text}";
const PRINTF_PLACEHOLDER: &str = "%s";
const TOKEN_MIN_LEN: usize = 30;
const CHANNEL_MIN_LEN: usize = 3;

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default)]
    message_template: Option<String>,
    #[serde(default)]
    parse_mode: Option<ParseMode>,
    #[serde(default)]
    input_key: Option<String>,
}

/// Credentials and target read from the `telegram` bundle.
struct Target {
    credentials: MessengerCredentials,
    channel: ChannelRef,
}

impl Target {
    fn from_bundle(bundle: &CredentialBundle) -> Result<Self, NodeError> {
        let token = match bundle.get_str("token").map(str::trim) {
            Some(token) if token.len() >= TOKEN_MIN_LEN => token.to_string(),
            Some(_) => {
                return Err(NodeError::invalid_credential(
                    TELEGRAM_SERVICE,
                    "token",
                    format!("must be at least {TOKEN_MIN_LEN} characters"),
                ))
            }
            None => {
                return Err(NodeError::invalid_credential(
                    TELEGRAM_SERVICE,
                    "token",
                    "must be a string",
                ))
            }
        };

        // Numeric channel ids are accepted unquoted.
        let channel = match bundle.get("channel_id") {
            Some(Value::String(id)) => id.trim().to_string(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(NodeError::invalid_credential(
                    TELEGRAM_SERVICE,
                    "channel_id",
                    "must be a string or a number",
                ))
            }
        };
        if channel.chars().count() < CHANNEL_MIN_LEN {
            return Err(NodeError::invalid_credential(
                TELEGRAM_SERVICE,
                "channel_id",
                format!("must be at least {CHANNEL_MIN_LEN} characters"),
            ));
        }
        let channel = ChannelRef::new(channel).ok_or_else(|| {
            NodeError::invalid_credential(TELEGRAM_SERVICE, "channel_id", "must not be empty")
        })?;

        let base_url = bundle
            .get_str("base_url")
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        Ok(Self {
            credentials: MessengerCredentials { token, base_url },
            channel,
        })
    }
}

/// Publishes a data-bag value to a messaging channel.
pub struct TelegramPublisher {
    config: NodeConfig,
    channel: ChannelRef,
    template: String,
    parse_mode: ParseMode,
    input_key: String,
    messenger: Arc<dyn Messenger>,
}

impl TelegramPublisher {
    /// Builds the node; `config` must carry a `telegram` bundle.
    pub fn new(config: NodeConfig, connector: &MessengerConnector) -> Result<Self, NodeError> {
        let params: Params = config.decode(&[])?;

        let template = params
            .message_template
            .unwrap_or_else(|| DEFAULT_MESSAGE_TEMPLATE.to_string());
        if !template.contains(TEXT_PLACEHOLDER) && !template.contains(PRINTF_PLACEHOLDER) {
            return Err(NodeError::invalid_parameter(
                "message_template",
                "must contain a {text} or %s placeholder",
            ));
        }

        let input_key = params
            .input_key
            .unwrap_or_else(|| GENERATED_TEXT.to_string());
        if input_key.is_empty() {
            return Err(NodeError::invalid_parameter("input_key", "must not be empty"));
        }

        let bundle = config
            .credentials(TELEGRAM_SERVICE)
            .ok_or_else(|| NodeError::MissingCredentials {
                service: TELEGRAM_SERVICE.to_string(),
            })?;
        let target = Target::from_bundle(bundle)?;
        let messenger = connector(&target.credentials)?;

        Ok(Self {
            config,
            channel: target.channel,
            template,
            parse_mode: params.parse_mode.unwrap_or_default(),
            input_key,
            messenger,
        })
    }

    /// Wraps `text` in the configured template.
    pub fn compose(&self, text: &str) -> String {
        if self.template.contains(TEXT_PLACEHOLDER) {
            self.template.replace(TEXT_PLACEHOLDER, text)
        } else {
            self.template.replacen(PRINTF_PLACEHOLDER, text, 1)
        }
    }
}

#[async_trait]
impl Node for TelegramPublisher {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn validate(&self) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, ctx: &RunContext, input: &DataBag) -> Result<DataBag, NodeError> {
        let text = match input.get(&self.input_key) {
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

        let message = self.compose(text);
        self.messenger
            .send_message(&self.channel, &message, self.parse_mode)
            .await?;

        info!(
            run_id = %ctx.run_id(),
            node = %self.name(),
            platform = self.messenger.platform(),
            channel = %self.channel,
            "Message published"
        );

        Ok(DataBag::new()
            .with("published", true)
            .with("channel_id", self.channel.as_str())
            .with("platform", self.messenger.platform()))
    }
}

/// Builds [`TelegramPublisher`] nodes. An explicit credential reference is
/// required; there is no default bundle fallback.
pub struct TelegramPublisherFactory {
    connector: MessengerConnector,
}

impl TelegramPublisherFactory {
    pub fn new(connector: MessengerConnector) -> Self {
        Self { connector }
    }
}

impl NodeFactory for TelegramPublisherFactory {
    fn create(
        &self,
        definition: &NodeDefinition,
        credentials: &CredentialStore,
    ) -> Result<Arc<dyn Node>, NodeError> {
        let reference = definition.credentials_ref();
        let bundle = credentials.resolve(TELEGRAM_SERVICE, reference.as_ref(), Fallback::Required)?;
        let config = NodeConfig::from_definition(definition).with_credentials(TELEGRAM_SERVICE, bundle);
        Ok(Arc::new(TelegramPublisher::new(config, &self.connector)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{DelegateError, ErrorKind, NodeId, NodeType};
    use serde_json::json;
    use std::sync::Mutex;

    const TOKEN: &str = "123456789:ABCdefGHIjklMNOpqrSTUvwxYZ012345";

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String, ParseMode)>>,
    }

    #[async_trait]
    impl Messenger for Outbox {
        fn platform(&self) -> &str {
            "telegram"
        }

        async fn send_message(
            &self,
            channel: &ChannelRef,
            text: &str,
            parse_mode: ParseMode,
        ) -> Result<(), DelegateError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string(), parse_mode));
            Ok(())
        }
    }

    fn connector(outbox: Arc<Outbox>) -> MessengerConnector {
        Arc::new(
            move |_: &MessengerCredentials| -> Result<Arc<dyn Messenger>, DelegateError> {
                Ok(outbox.clone())
            },
        )
    }

    fn store(bundle: serde_json::Value) -> CredentialStore {
        CredentialStore::builder()
            .bundle("telegram", "main", bundle)
            .build()
    }

    fn definition() -> NodeDefinition {
        NodeDefinition::new(
            NodeId::new("publish").unwrap(),
            NodeType::new("telegram_publisher").unwrap(),
            "Publisher",
        )
        .with_credentials("main")
    }

    #[test]
    fn test_requires_explicit_reference() {
        let factory = TelegramPublisherFactory::new(connector(Arc::default()));
        let def = NodeDefinition::new(
            NodeId::new("publish").unwrap(),
            NodeType::new("telegram_publisher").unwrap(),
            "Publisher",
        );
        let store = CredentialStore::builder()
            .bundle("telegram", "default", json!({"token": TOKEN, "channel_id": "@x_channel"}))
            .build();

        let err = factory.create(&def, &store).err().unwrap();
        assert!(matches!(err, NodeError::MissingCredentials { ref service } if service == "telegram"));
    }

    #[test]
    fn test_bundle_format_checks() {
        let factory = TelegramPublisherFactory::new(connector(Arc::default()));
        let cases = [
            (json!({"token": "short", "channel_id": "@x_channel"}), "token"),
            (json!({"channel_id": "@x_channel"}), "token"),
            (json!({"token": TOKEN, "channel_id": "@x"}), "channel_id"),
            (json!({"token": TOKEN}), "channel_id"),
        ];
        for (bundle, expected) in cases {
            let err = factory.create(&definition(), &store(bundle)).err().unwrap();
            assert!(
                matches!(err, NodeError::InvalidCredentialFormat { ref field, .. } if field == expected),
                "{err}"
            );
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn test_numeric_channel_id_is_accepted() {
        let factory = TelegramPublisherFactory::new(connector(Arc::default()));
        let node = factory
            .create(
                &definition(),
                &store(json!({"token": TOKEN, "channel_id": -1001234567890_i64})),
            )
            .unwrap();
        node.validate().unwrap();
    }

    #[test]
    fn test_template_must_have_placeholder() {
        let factory = TelegramPublisherFactory::new(connector(Arc::default()));
        let def = definition().with_param("message_template", "no slot here");
        let err = factory
            .create(&def, &store(json!({"token": TOKEN, "channel_id": "@x_channel"})))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::InvalidParameter { ref parameter, .. } if parameter == "message_template"));
    }

    #[tokio::test]
    async fn test_publishes_with_template_and_parse_mode() {
        let outbox = Arc::new(Outbox::default());
        let factory = TelegramPublisherFactory::new(connector(Arc::clone(&outbox)));
        let def = definition()
            .with_param("message_template", "Today: %s")
            .with_param("parse_mode", "HTML");
        let node = factory
            .create(&def, &store(json!({"token": TOKEN, "channel_id": "@x_channel"})))
            .unwrap();

        let input = DataBag::new().with(GENERATED_TEXT, "Keep going.");
        let output = node.execute(&RunContext::new(), &input).await.unwrap();

        assert_eq!(output.get("published"), Some(&json!(true)));
        assert_eq!(output.get_str("channel_id"), Some("@x_channel"));
        assert_eq!(output.get_str("platform"), Some("telegram"));

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![(
                "@x_channel".to_string(),
                "Today: Keep going.".to_string(),
                ParseMode::Html
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_sending() {
        let outbox = Arc::new(Outbox::default());
        let factory = TelegramPublisherFactory::new(connector(Arc::clone(&outbox)));
        let node = factory
            .create(&definition(), &store(json!({"token": TOKEN, "channel_id": "@x_channel"})))
            .unwrap();

        let err = node
            .execute(&RunContext::new(), &DataBag::new().with("other", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_string_input_fails_before_sending() {
        let outbox = Arc::new(Outbox::default());
        let factory = TelegramPublisherFactory::new(connector(Arc::clone(&outbox)));
        let node = factory
            .create(&definition(), &store(json!({"token": TOKEN, "channel_id": "@x_channel"})))
            .unwrap();

        let err = node
            .execute(&RunContext::new(), &DataBag::new().with(GENERATED_TEXT, 42))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Input { ref reason, .. } if reason == "is not a string"));
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_is_still_published() {
        let outbox = Arc::new(Outbox::default());
        let factory = TelegramPublisherFactory::new(connector(Arc::clone(&outbox)));
        let def = definition().with_param("message_template", "[{text}]");
        let node = factory
            .create(&def, &store(json!({"token": TOKEN, "channel_id": "@x_channel"})))
            .unwrap();

        let output = node
            .execute(&RunContext::new(), &DataBag::new().with(GENERATED_TEXT, ""))
            .await
            .unwrap();
        assert_eq!(output.get("published"), Some(&json!(true)));

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "[]");
    }

    #[test]
    fn test_default_template_frames_text() {
        let factory = TelegramPublisherFactory::new(connector(Arc::default()));
        let store = store(json!({"token": TOKEN, "channel_id": "@x_channel"}));
        let config = NodeConfig::from_definition(&definition())
            .with_credentials("telegram", store.get("telegram", "main").unwrap());
        let publisher = TelegramPublisher::new(config, &factory.connector).unwrap();

        let message = publisher.compose("Believe.");
        assert!(message.starts_with("💪 *Motivational Message of the Day*"));
        assert!(message.contains("\n\nBelieve.\n\n"));
    }
}
