//! Newtype domain identifiers.
//!
//! Every configured name that the engine keys on is a distinct newtype so a
//! [`NodeType`] tag can never be passed where a [`CredentialName`] is
//! expected, even though both are strings underneath. String identifiers
//! reject the empty string both on construction and on deserialisation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display,
// and serde conversions that refuse empty values.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| {
                    concat!(stringify!($name), " must not be empty").to_string()
                })
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pipeline execution run.
///
/// Generated fresh for every run; recorded on the run span so all log lines
/// of one run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: string-backed (configuration names)
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a node within a pipeline definition (the `id` field).
    NodeId
}

string_id! {
    /// The discriminator tag selecting a node implementation
    /// (e.g. `"text_generator"`, `"telegram_publisher"`).
    NodeType
}

string_id! {
    /// Names one credential bundle within a service
    /// (e.g. `"default"`, `"premium"`, `"news_bot"`).
    CredentialName
}

string_id! {
    /// A messaging channel reference exactly as configured.
    ///
    /// May be a handle (`"@my_channel"`) or a numeric identifier
    /// (`"-1001234567890"`); interpreting the form is the messaging
    /// collaborator's job.
    ChannelRef
}
