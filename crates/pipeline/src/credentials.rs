//! Credential bundles and the read-only store nodes resolve them from.
//!
//! The store is populated once, from a JSON document or assembled in code, and
//! is never mutated while pipelines run. Share it behind an `Arc`.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "openai":   { "default": { "api_key": "sk-...", "model": "gpt-4o-mini" } },
//!   "telegram": { "main":    { "token": "...", "channel_id": "@my_channel" } }
//! }
//! ```
//!
//! A bundle given as a bare string is shorthand for `{"api_key": "<string>"}`.
//!
//! Bundle *contents* are not validated here; each node checks the fields it
//! needs when it is constructed.

use std::collections::BTreeMap;
use std::io::Read;

use serde_json::{Map, Value};

use crate::errors::{CredentialError, NodeError};
use crate::identifiers::CredentialName;

/// Name used when a node allows an implicit credential reference.
pub const DEFAULT_CREDENTIAL: &str = "default";

/// Field a bare-string bundle is expanded into.
const SHORTHAND_FIELD: &str = "api_key";

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Named group of secret and configuration values for one service.
///
/// Immutable once loaded. `Debug` output lists keys only so bundles can be
/// logged without leaking secrets.
#[derive(Clone, PartialEq, Default)]
pub struct CredentialBundle(Map<String, Value>);

impl CredentialBundle {
    /// Returns the raw value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value under `key` if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Iterates over the field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the bundle as a JSON map (for typed decoding).
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for CredentialBundle {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// How a node treats an absent credential reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Use the bundle named [`DEFAULT_CREDENTIAL`].
    Default,
    /// Fail with [`NodeError::MissingCredentials`].
    Required,
}

/// Credential bundles keyed by service, then by credential name.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    services: BTreeMap<String, BTreeMap<String, CredentialBundle>>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts assembling a store in code.
    pub fn builder() -> CredentialStoreBuilder {
        CredentialStoreBuilder::default()
    }

    /// Parses a credential document from `reader`.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, CredentialError> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        Self::from_json_str(&raw)
    }

    /// Parses a credential document from a string.
    pub fn from_json_str(raw: &str) -> Result<Self, CredentialError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Builds a store from an already-parsed credential document.
    pub fn from_value(value: Value) -> Result<Self, CredentialError> {
        let Value::Object(services) = value else {
            return Err(CredentialError::Malformed {
                path: "$".to_string(),
                reason: "expected an object keyed by service".to_string(),
            });
        };

        let mut store = Self::new();
        for (service, entries) in services {
            let Value::Object(entries) = entries else {
                return Err(CredentialError::Malformed {
                    path: service,
                    reason: "expected an object keyed by credential name".to_string(),
                });
            };

            let bundles = store.services.entry(service.clone()).or_default();
            for (name, bundle) in entries {
                let bundle = match bundle {
                    Value::Object(map) => CredentialBundle(map),
                    Value::String(secret) => {
                        let mut map = Map::new();
                        map.insert(SHORTHAND_FIELD.to_string(), Value::String(secret));
                        CredentialBundle(map)
                    }
                    _ => {
                        return Err(CredentialError::Malformed {
                            path: format!("{service}.{name}"),
                            reason: "expected an object or a string".to_string(),
                        })
                    }
                };
                bundles.insert(name, bundle);
            }
        }

        Ok(store)
    }

    /// Looks up the bundle `name` of `service`.
    pub fn get(&self, service: &str, name: &str) -> Option<&CredentialBundle> {
        self.services.get(service)?.get(name)
    }

    /// Resolves a node's credential reference for `service`.
    ///
    /// An absent `reference` resolves to [`DEFAULT_CREDENTIAL`] under
    /// [`Fallback::Default`] and fails under [`Fallback::Required`]. A
    /// reference naming no bundle fails with [`NodeError::CredentialNotFound`].
    pub fn resolve(
        &self,
        service: &str,
        reference: Option<&CredentialName>,
        fallback: Fallback,
    ) -> Result<&CredentialBundle, NodeError> {
        let name = match (reference, fallback) {
            (Some(name), _) => name.as_str(),
            (None, Fallback::Default) => DEFAULT_CREDENTIAL,
            (None, Fallback::Required) => {
                return Err(NodeError::MissingCredentials {
                    service: service.to_string(),
                })
            }
        };

        self.get(service, name)
            .ok_or_else(|| NodeError::CredentialNotFound {
                service: service.to_string(),
                name: name.to_string(),
            })
    }

    /// Adds a bundle unless one is already stored under `(service, name)`.
    ///
    /// Only for assembling a store before it is shared; returns `true` if the
    /// bundle was inserted.
    pub fn insert_if_absent(
        &mut self,
        service: impl Into<String>,
        name: impl Into<String>,
        bundle: CredentialBundle,
    ) -> bool {
        let bundles = self.services.entry(service.into()).or_default();
        match bundles.entry(name.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(bundle);
                true
            }
        }
    }

    /// Service names with at least one bundle.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|(_, bundles)| !bundles.is_empty())
            .map(|(service, _)| service.as_str())
    }

    /// Credential names registered for `service`.
    pub fn names(&self, service: &str) -> Vec<&str> {
        self.services
            .get(service)
            .map(|bundles| bundles.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Total number of bundles across all services.
    pub fn len(&self) -> usize {
        self.services.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if the store holds no bundles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assembles a [`CredentialStore`] in code (tests, environment overlays).
#[derive(Debug, Default)]
pub struct CredentialStoreBuilder {
    store: CredentialStore,
}

impl CredentialStoreBuilder {
    /// Adds (or replaces) the bundle `name` of `service`.
    ///
    /// Non-object values are stored under `api_key`, as in the document format.
    pub fn bundle(mut self, service: &str, name: &str, fields: Value) -> Self {
        let bundle = match fields {
            Value::Object(map) => CredentialBundle(map),
            other => {
                let mut map = Map::new();
                map.insert(SHORTHAND_FIELD.to_string(), other);
                CredentialBundle(map)
            }
        };
        self.store
            .services
            .entry(service.to_string())
            .or_default()
            .insert(name.to_string(), bundle);
        self
    }

    /// Finishes the store.
    pub fn build(self) -> CredentialStore {
        self.store
    }
}
