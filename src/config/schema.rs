//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the command gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// How commands are built and spawned.
    pub command: CommandConfig,

    /// Multipart upload handling and scratch directories.
    pub uploads: UploadConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Headers applied to every command response.
    pub response: GlobalResponseConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// View rendering settings.
    pub views: ViewsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-route overrides keyed by `"METHOD /path"`.
    pub api: BTreeMap<String, RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Command construction and process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Program prefixed to every path-derived command line.
    pub program: String,

    /// Shell used to interpret the command line.
    pub shell: String,

    /// Only paths under this prefix are command invocations; the prefix is
    /// stripped before translation.
    pub path_prefix: Option<String>,

    /// Working directory for spawned commands.
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for spawned commands.
    pub env: BTreeMap<String, String>,

    /// Run commands in their own process group.
    pub detached: bool,

    /// Kill commands that run longer than this. Unbounded when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "aux4".to_string(),
            shell: "sh".to_string(),
            path_prefix: None,
            working_dir: None,
            env: BTreeMap::new(),
            detached: false,
            timeout_secs: None,
        }
    }
}

/// Upload and scratch directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Root under which per-request scratch directories are created.
    pub tmp_root: PathBuf,

    /// Maximum number of files per multipart request.
    pub max_files: Option<usize>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tmp_root: PathBuf::from(".tmp"),
            max_files: None,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Headers applied to every command response before route headers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GlobalResponseConfig {
    pub headers: BTreeMap<String, String>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable the CORS layer.
    pub enabled: bool,

    /// Allowed origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// View rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Directory holding view templates. Views are disabled if it does not exist.
    pub dir: PathBuf,

    /// Template file extension.
    pub extension: String,

    /// Layout used when a route does not name one.
    pub default_layout: String,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("views"),
            extension: "html".to_string(),
            default_layout: "main".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Per-route behaviour overrides.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RouteConfig {
    /// Command-line template replacing the path-derived command.
    pub command: Option<String>,

    pub response: RouteResponseConfig,

    pub output: OutputConfig,

    pub view: Option<ViewConfig>,
}

/// Status and header overrides for a route.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RouteResponseConfig {
    /// Success status, or a full exit-code to status map.
    pub status: Option<StatusConfig>,

    /// Headers that always win over negotiated values.
    pub headers: BTreeMap<String, String>,
}

/// Either a single success status or an exit-code map.
///
/// Map keys are exit codes written as strings, since TOML table keys are
/// always strings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StatusConfig {
    Code(u16),
    Map(BTreeMap<String, u16>),
}

/// Output transforms for a route.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// The command prints base64; decode it before sending.
    pub base64: bool,
}

/// View selection for a route.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ViewConfig {
    pub name: String,

    #[serde(default)]
    pub layout: Option<String>,
}
