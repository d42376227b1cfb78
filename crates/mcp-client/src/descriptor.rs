//! Provider descriptor parsing and validation.
//!
//! A descriptor document maps provider name → `{type?, command, args?, env?,
//! url?, headers?, disabled?, autoApprove?}`. A top-level `mcpServers` key is
//! unwrapped when present. Validation fails fast on the first bad field and
//! names the provider; disabled entries are split off so nothing downstream
//! ever sees them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde_json::{Map, Value};

use crate::error::ClassifiedError;
use crate::session::{ConnectionParams, NetworkKind, ProviderParams};

/// Key some documents nest the provider map under.
const SERVERS_KEY: &str = "mcpServers";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One validated tool provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub transport: ConnectionParams,
    pub enabled: bool,
    /// Tools exempt from confirmation. Passed through to the host untouched.
    pub auto_approve: BTreeSet<String>,
}

impl ProviderDescriptor {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: ConnectionParams::Stdio {
                command: command.into(),
                args,
                env: BTreeMap::new(),
            },
            enabled: true,
            auto_approve: BTreeSet::new(),
        }
    }

    pub fn network(name: impl Into<String>, kind: NetworkKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: ConnectionParams::Network {
                kind,
                url: url.into(),
                headers: BTreeMap::new(),
            },
            enabled: true,
            auto_approve: BTreeSet::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Connection parameters handed to the session connector.
    pub fn params(&self) -> ProviderParams {
        ProviderParams {
            name: self.name.clone(),
            connection: self.transport.clone(),
        }
    }
}

/// Result of validating a document.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    /// Providers to construct, in document order.
    pub enabled: Vec<ProviderDescriptor>,
    /// Names of providers marked `disabled: true`.
    pub disabled: Vec<String>,
}

impl DescriptorSet {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

/// A descriptor document failed to load or validate.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("provider descriptor document must be a map of provider name to descriptor")]
    NotAMap,

    #[error("provider '{provider}': field '{field}' {reason}")]
    InvalidField {
        provider: String,
        field: &'static str,
        reason: String,
    },

    #[error("provider '{provider}': {reason}")]
    InvalidProvider { provider: String, reason: String },

    #[error("reading descriptor file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing descriptor file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
}

impl DescriptorError {
    /// Provider the failure refers to, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            DescriptorError::InvalidField { provider, .. }
            | DescriptorError::InvalidProvider { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

impl From<DescriptorError> for ClassifiedError {
    fn from(e: DescriptorError) -> Self {
        let provider = e.provider().map(str::to_owned);
        let err = ClassifiedError::configuration(e.to_string()).with_source(e);
        match provider {
            Some(p) => err.with_provider(p),
            None => err,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a whole descriptor document.
pub fn validate_descriptors(doc: &Value) -> Result<DescriptorSet, DescriptorError> {
    let map = match doc {
        Value::Object(m) => match m.get(SERVERS_KEY) {
            Some(Value::Object(inner)) => inner,
            Some(_) => return Err(DescriptorError::NotAMap),
            None => m,
        },
        // An empty YAML document parses as null.
        Value::Null => return Ok(DescriptorSet::default()),
        _ => return Err(DescriptorError::NotAMap),
    };

    let mut set = DescriptorSet::default();
    for (name, entry) in map {
        let descriptor = validate_entry(name, entry)?;
        if descriptor.enabled {
            set.enabled.push(descriptor);
        } else {
            tracing::debug!(provider = %name, "provider disabled, skipping");
            set.disabled.push(name.clone());
        }
    }
    Ok(set)
}

/// Validate a single `name → descriptor` entry.
pub fn validate_entry(name: &str, entry: &Value) -> Result<ProviderDescriptor, DescriptorError> {
    if name.trim().is_empty() {
        return Err(DescriptorError::InvalidProvider {
            provider: name.to_owned(),
            reason: "provider name must not be empty".into(),
        });
    }
    let obj = entry.as_object().ok_or_else(|| DescriptorError::InvalidProvider {
        provider: name.to_owned(),
        reason: "descriptor must be an object".into(),
    })?;
    let field = Fields { provider: name, obj };

    let declared = field.string("type")?;
    let command = field.string("command")?.filter(|c| !c.trim().is_empty());
    let url = field.string("url")?;
    let args = field.string_list("args")?.unwrap_or_default();
    let env = field.string_map("env")?.unwrap_or_default();
    let headers = field.string_map("headers")?.unwrap_or_default();
    let disabled = field.boolean("disabled")?.unwrap_or(false);
    let auto_approve = field
        .string_list("autoApprove")?
        .unwrap_or_default()
        .into_iter()
        .collect();

    let declared_kind = match declared.as_deref() {
        None => None,
        Some("stdio") => Some(None),
        Some("http") => Some(Some(NetworkKind::Http)),
        Some("streamable-http" | "streamableHttp" | "streamable_http") => {
            Some(Some(NetworkKind::StreamableHttp))
        }
        Some(other) => {
            return Err(field.invalid(
                "type",
                format!("must be one of stdio, http, streamable-http (got '{other}')"),
            ))
        }
    };

    let transport = match url {
        Some(url) => {
            if command.is_some() {
                return Err(DescriptorError::InvalidProvider {
                    provider: name.to_owned(),
                    reason: "declares both command and url; exactly one transport is allowed".into(),
                });
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(field.invalid("url", "must start with http:// or https://"));
            }
            let parsed = Url::parse(&url)
                .map_err(|e| field.invalid("url", format!("is not a valid URL: {e}")))?;
            let kind = match declared_kind {
                Some(Some(kind)) => kind,
                Some(None) => {
                    return Err(field.invalid("type", "stdio transport cannot be used with a url"))
                }
                None => network_kind_for(&parsed),
            };
            ConnectionParams::Network { kind, url, headers }
        }
        None => {
            if let Some(Some(kind)) = declared_kind {
                return Err(field.invalid(
                    "url",
                    format!("is required for {} transport", kind.as_str()),
                ));
            }
            let command = command
                .ok_or_else(|| field.invalid("command", "is required when no url is given"))?;
            ConnectionParams::Stdio { command, args, env }
        }
    };

    Ok(ProviderDescriptor {
        name: name.to_owned(),
        transport,
        enabled: !disabled,
        auto_approve,
    })
}

/// A path segment mentioning "stream" selects streamable HTTP.
fn network_kind_for(url: &Url) -> NetworkKind {
    let streaming = url
        .path_segments()
        .map(|mut segs| segs.any(|s| s.to_ascii_lowercase().contains("stream")))
        .unwrap_or(false);
    if streaming {
        NetworkKind::StreamableHttp
    } else {
        NetworkKind::Http
    }
}

/// Typed field access with errors that name provider and field.
struct Fields<'a> {
    provider: &'a str,
    obj: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> DescriptorError {
        DescriptorError::InvalidField {
            provider: self.provider.to_owned(),
            field,
            reason: reason.into(),
        }
    }

    fn present(&self, key: &'static str) -> Option<&Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn string(&self, key: &'static str) -> Result<Option<String>, DescriptorError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "must be a string")),
        }
    }

    fn boolean(&self, key: &'static str) -> Result<Option<bool>, DescriptorError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(key, "must be a boolean")),
        }
    }

    fn string_list(&self, key: &'static str) -> Result<Option<Vec<String>>, DescriptorError> {
        let Some(value) = self.present(key) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(key, "must be a list of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| self.invalid(key, "must be a list of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn string_map(
        &self,
        key: &'static str,
    ) -> Result<Option<BTreeMap<String, String>>, DescriptorError> {
        let Some(value) = self.present(key) else {
            return Ok(None);
        };
        let map = value
            .as_object()
            .ok_or_else(|| self.invalid(key, "must be a map of strings"))?;
        map.iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                _ => Err(self.invalid(key, format!("value for '{k}' must be a string"))),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse document text. `.yaml`/`.yml` paths are YAML, everything else JSON.
pub fn parse_document(path: &Path, raw: &str) -> Result<Value, DescriptorError> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let parsed = if is_yaml {
        serde_yaml::from_str::<Value>(raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| DescriptorError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Read and validate a descriptor file. A missing file is an empty set.
pub async fn load_descriptor_file(path: &Path) -> Result<DescriptorSet, DescriptorError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no provider descriptor file, no providers configured");
            return Ok(DescriptorSet::default());
        }
        Err(source) => {
            return Err(DescriptorError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let doc = parse_document(path, &raw)?;
    validate_descriptors(&doc)
}
