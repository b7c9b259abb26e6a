//! Recording collaborator doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nodes::Collaborators;
use pipeline::{
    ChannelRef, CredentialStore, DelegateError, Generation, LanguageModel, LanguageModelConnector,
    LanguageModelCredentials, Messenger, MessengerConnector, MessengerCredentials, ModelParams,
    NodeRegistry, ParseMode, Prompt, TokenCount,
};
use serde_json::json;

pub const OPENAI_KEY: &str = "sk-test-default-openai-key";
pub const PREMIUM_KEY: &str = "sk-test-premium-openai-key";
pub const BOT_TOKEN: &str = "123456789:ABCdefGHIjklMNOpqrSTUvwxYZ012345";

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Returns a fixed reply and records every prompt.
pub struct MockLanguageModel {
    reply: String,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl MockLanguageModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn service(&self) -> &str {
        "mock-llm"
    }

    async fn generate_text(
        &self,
        prompt: &Prompt,
        params: &ModelParams,
    ) -> Result<Generation, DelegateError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(Generation {
            text: self.reply.clone(),
            model: params.model.clone(),
            usage: Some(TokenCount::new(42)),
        })
    }
}

/// Never completes; used to drive the run deadline.
pub struct HangingLanguageModel;

#[async_trait]
impl LanguageModel for HangingLanguageModel {
    fn service(&self) -> &str {
        "hanging-llm"
    }

    async fn generate_text(
        &self,
        _prompt: &Prompt,
        _params: &ModelParams,
    ) -> Result<Generation, DelegateError> {
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

/// A message captured by [`MockMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub text: String,
    pub parse_mode: ParseMode,
}

/// Records every message instead of delivering it.
#[derive(Default)]
pub struct MockMessenger {
    pub sent: Mutex<Vec<SentMessage>>,
}

impl MockMessenger {
    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    fn platform(&self) -> &str {
        "telegram"
    }

    async fn send_message(
        &self,
        channel: &ChannelRef,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), DelegateError> {
        self.sent.lock().unwrap().push(SentMessage {
            channel: channel.to_string(),
            text: text.to_string(),
            parse_mode,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Connectors backed by shared doubles, recording which credentials each
/// client was opened with.
pub struct Harness {
    pub model: Arc<dyn LanguageModel>,
    pub messenger: Arc<MockMessenger>,
    pub model_keys: Arc<Mutex<Vec<String>>>,
    pub messenger_tokens: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            messenger: Arc::new(MockMessenger::default()),
            model_keys: Arc::default(),
            messenger_tokens: Arc::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        let model = Arc::clone(&self.model);
        let keys = Arc::clone(&self.model_keys);
        let language_model: LanguageModelConnector = Arc::new(
            move |creds: &LanguageModelCredentials| -> Result<Arc<dyn LanguageModel>, DelegateError> {
                keys.lock().unwrap().push(creds.api_key.clone());
                Ok(Arc::clone(&model))
            },
        );

        let messenger = Arc::clone(&self.messenger);
        let tokens = Arc::clone(&self.messenger_tokens);
        let messenger: MessengerConnector = Arc::new(
            move |creds: &MessengerCredentials| -> Result<Arc<dyn Messenger>, DelegateError> {
                tokens.lock().unwrap().push(creds.token.clone());
                let messenger: Arc<dyn Messenger> = messenger.clone();
                Ok(messenger)
            },
        );

        Collaborators {
            language_model,
            messenger,
        }
    }

    pub fn registry(&self) -> Arc<NodeRegistry> {
        Arc::new(nodes::builtin_registry(&self.collaborators()))
    }
}

/// Credential store mirroring a typical deployment: two OpenAI bundles and a
/// Telegram bot.
pub fn credential_store() -> Arc<CredentialStore> {
    let store = CredentialStore::builder()
        .bundle("openai", "default", json!({ "api_key": OPENAI_KEY }))
        .bundle(
            "openai",
            "premium",
            json!({ "api_key": PREMIUM_KEY, "model": "gpt-4o" }),
        )
        .bundle(
            "telegram",
            "main",
            json!({ "token": BOT_TOKEN, "channel_id": "@test_channel" }),
        )
        .build();
    Arc::new(store)
}
