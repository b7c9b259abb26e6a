//! Pipeline files, the credential document and the environment overlay.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use pipeline::{CredentialBundle, CredentialStore, NodeDefinition, DEFAULT_CREDENTIAL};

/// Directory searched when `--config-dir` is not given.
pub const DEFAULT_CONFIG_DIR: &str = "config";

const PIPELINES_DIR: &str = "pipelines";
const CREDENTIALS_FILE: &str = "credentials.json";
const DOTENV_FILE: &str = ".env";

/// Environment variables folded into the credential store.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHANNEL_ID: &str = "TELEGRAM_CHANNEL_ID";

// ---------------------------------------------------------------------------
// Pipeline files
// ---------------------------------------------------------------------------

/// A pipeline definition as stored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Informational only; scheduling is left to whatever invokes the CLI.
    #[serde(default)]
    pub schedule: Option<String>,
    pub nodes: Vec<NodeDefinition>,
}

impl PipelineFile {
    /// Reads and parses a pipeline file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open pipeline file {}", path.display()))?;
        let pipeline: Self = serde_json::from_reader(file)
            .with_context(|| format!("failed to parse pipeline file {}", path.display()))?;
        debug!(
            path = %path.display(),
            pipeline = %pipeline.name,
            nodes = pipeline.nodes.len(),
            "Loaded pipeline file"
        );
        Ok(pipeline)
    }
}

/// Locates a pipeline by name.
///
/// A name ending in `.json` or containing a path separator is used as a path;
/// anything else resolves to `<config_dir>/pipelines/<name>.json`.
pub fn pipeline_path(config_dir: &Path, name: &str) -> PathBuf {
    if name.ends_with(".json") || name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        PathBuf::from(name)
    } else {
        config_dir.join(PIPELINES_DIR).join(format!("{name}.json"))
    }
}

/// Default credential document location inside `config_dir`.
pub fn default_credentials_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CREDENTIALS_FILE)
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Reads `KEY=value` pairs from a dotenv file. A missing file yields none.
pub fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => {
            debug!(path = %path.display(), "No dotenv file");
            return Ok(HashMap::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", path.display()))
        }
    };
    let vars = entries
        .collect::<Result<HashMap<_, _>, _>>()
        .with_context(|| format!("failed to parse {}", path.display()))?;
    debug!(path = %path.display(), vars = vars.len(), "Loaded dotenv file");
    Ok(vars)
}

/// Variable lookup for the credential overlay.
///
/// The process environment wins, then `<config_dir>/.env`, then `./.env`.
pub fn environment(config_dir: &Path) -> Result<impl Fn(&str) -> Option<String>> {
    let mut file_vars = read_dotenv(Path::new(DOTENV_FILE))?;
    file_vars.extend(read_dotenv(&config_dir.join(DOTENV_FILE))?);
    Ok(move |name: &str| {
        std::env::var(name)
            .ok()
            .or_else(|| file_vars.get(name).cloned())
    })
}

/// Loads the credential document at `path` and applies the environment overlay.
///
/// A missing file is tolerated when the overlay supplies at least one bundle;
/// an unreadable or malformed file is always an error.
pub fn load_credentials<F>(path: &Path, env: F) -> Result<CredentialStore>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut store, found) = match File::open(path) {
        Ok(file) => {
            let store = CredentialStore::from_reader(file)
                .with_context(|| format!("failed to load credentials from {}", path.display()))?;
            (store, true)
        }
        Err(err) if err.kind() == IoErrorKind::NotFound => {
            debug!(path = %path.display(), "Credential file not found");
            (CredentialStore::new(), false)
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to open credentials {}", path.display()))
        }
    };

    let added = apply_env_overlay(&mut store, env);
    if !found && added.is_empty() {
        bail!(
            "credential file {} not found and no credentials set in the environment",
            path.display()
        );
    }
    if !found {
        warn!(path = %path.display(), "Credential file not found; using environment only");
    }

    info!(
        bundles = store.len(),
        services = ?store.services().collect::<Vec<_>>(),
        "Credentials loaded"
    );
    Ok(store)
}

/// Adds `default` bundles built from environment variables, never replacing
/// bundles the document already defines. Returns the `service.name` of each
/// bundle added.
pub fn apply_env_overlay<F>(store: &mut CredentialStore, env: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut added = Vec::new();

    if let Some(api_key) = var(OPENAI_API_KEY) {
        let mut fields = json!({ "api_key": api_key });
        if let Some(model) = var(OPENAI_MODEL) {
            fields["model"] = Value::String(model);
        }
        if insert(store, "openai", fields) {
            added.push(format!("openai.{DEFAULT_CREDENTIAL}"));
        }
    }

    match (var(TELEGRAM_BOT_TOKEN), var(TELEGRAM_CHANNEL_ID)) {
        (Some(token), Some(channel_id)) => {
            let fields = json!({ "token": token, "channel_id": channel_id });
            if insert(store, "telegram", fields) {
                added.push(format!("telegram.{DEFAULT_CREDENTIAL}"));
            }
        }
        (Some(_), None) | (None, Some(_)) => warn!(
            "{TELEGRAM_BOT_TOKEN} and {TELEGRAM_CHANNEL_ID} must be set together; ignoring"
        ),
        (None, None) => {}
    }

    for bundle in &added {
        debug!(bundle = %bundle, "Credential bundle taken from environment");
    }
    added
}

fn insert(store: &mut CredentialStore, service: &str, fields: Value) -> bool {
    let map = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    store.insert_if_absent(service, DEFAULT_CREDENTIAL, CredentialBundle::from(map))
}
