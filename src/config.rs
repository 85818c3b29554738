//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the immutable input of the supervisor, and the
//! agent-level sections it carries.
//!
//! ```text
//! SupervisorConfig
//!   ├─ log_sink / log_level      → the supervisor's tracing output and the rendering engine
//!   ├─ namespace                 → rendering engine (secret namespace)
//!   ├─ bus_capacity              → event bus ring buffer
//!   └─ agent: AgentConfig
//!        ├─ vault: VaultConfig           (address, initial token)
//!        ├─ env_templates: [TemplateSpec] (one env var each)
//!        ├─ exec: Option<ExecConfig>      (command, restart policy, stop signal)
//!        └─ template_config: Option<TemplateConfig> (exit_on_retry_failure)
//! ```
//!
//! The agent-level sections derive [`serde::Deserialize`] so they can be loaded
//! from any serde format; signals are written by name (`"SIGTERM"`, `"SIGHUP"`).
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1 by [`SupervisorConfig::bus_capacity_clamped`]
//! - `exec = None` or no templates → nothing to supervise

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::policies::RestartPolicy;

/// Top-level configuration of the supervisor.
///
/// Owned by the caller and read-only to the supervisor for its whole lifetime.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Where log records (supervisor diagnostics, `LogWriter` event lines and
    /// rendering engine output) are written.
    pub log_sink: LogSink,
    /// Most verbose level written to the log sink.
    pub log_level: LogLevel,
    /// Templates, exec section and rendering options.
    pub agent: AgentConfig,
    /// Secret namespace handed to the rendering engine.
    pub namespace: Option<String>,
    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Creates a configuration for `agent` with default logging.
    pub fn new(agent: AgentConfig) -> Self {
        Self {
            agent,
            ..Self::default()
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns `true` when the render engine should stop supervision on its first error.
    #[inline]
    pub fn exit_on_retry_failure(&self) -> bool {
        self.agent
            .template_config
            .as_ref()
            .is_some_and(|t| t.exit_on_retry_failure)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `log_sink = stderr`
    /// - `log_level = Info`
    /// - `bus_capacity = 1024`
    /// - no templates, no exec section
    fn default() -> Self {
        Self {
            log_sink: LogSink::stderr(),
            log_level: LogLevel::default(),
            agent: AgentConfig::default(),
            namespace: None,
            bus_capacity: 1024,
        }
    }
}

/// Agent-level template and exec configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Connection settings of the secret store.
    pub vault: VaultConfig,
    /// Templates rendered into environment variables.
    pub env_templates: Vec<TemplateSpec>,
    /// The child process to supervise.
    pub exec: Option<ExecConfig>,
    /// Options shared by all templates.
    pub template_config: Option<TemplateConfig>,
}

impl AgentConfig {
    /// `true` when there is nothing to render or nothing to run.
    pub fn is_idle(&self) -> bool {
        self.env_templates.is_empty() || self.exec.is_none()
    }
}

/// Connection settings of the secret store used by the rendering engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Address of the secret store.
    pub address: Option<String>,
    /// Initial authentication token (usually delivered later over the token stream).
    pub token: Option<String>,
}

/// Options shared by all templates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Stop supervising when the rendering engine reports an error instead of rebuilding it.
    pub exit_on_retry_failure: bool,
}

/// One template rendered into one environment variable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateSpec {
    /// Inline template text.
    pub contents: Option<String>,
    /// Path to a template file.
    pub source: Option<PathBuf>,
    /// Name of the environment variable receiving the rendered content.
    #[serde(alias = "name")]
    pub env_var: String,
    /// Fail rendering when a referenced key is missing.
    pub error_on_missing_key: bool,
}

impl TemplateSpec {
    /// Creates an inline template rendered into `env_var`.
    pub fn inline(env_var: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
            env_var: env_var.into(),
            ..Self::default()
        }
    }

    /// Identity of the underlying template.
    ///
    /// Specs with the same source (or the same inline text) share one template,
    /// and therefore one render event.
    pub fn template_id(&self) -> String {
        match (&self.source, &self.contents) {
            (Some(path), _) => format!("file:{}", path.display()),
            (None, Some(contents)) => format!("inline:{contents}"),
            (None, None) => String::new(),
        }
    }
}

/// The child process section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Command line: one shell string or an executable followed by its arguments.
    pub command: Vec<String>,
    /// `"always"` or `"never"`.
    pub restart_on_secret_changes: String,
    /// Signal sent to stop the child.
    #[serde(deserialize_with = "deserialize_signal")]
    pub restart_stop_signal: Signal,
}

impl ExecConfig {
    /// Creates an exec section with the default policy and stop signal.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parses the configured restart policy.
    pub fn restart_policy(&self) -> Result<RestartPolicy, ConfigError> {
        self.restart_on_secret_changes.parse()
    }
}

impl Default for ExecConfig {
    /// Defaults: empty command, `"always"`, `SIGTERM`.
    fn default() -> Self {
        Self {
            command: Vec::new(),
            restart_on_secret_changes: RestartPolicy::Always.as_str().to_string(),
            restart_stop_signal: Signal::SIGTERM,
        }
    }
}

/// Parses a signal name, with or without the `SIG` prefix.
pub fn parse_signal(raw: &str) -> Result<Signal, ConfigError> {
    let upper = raw.trim().to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&name).map_err(|_| ConfigError::UnknownSignal(raw.to_string()))
}

fn deserialize_signal<'de, D>(deserializer: D) -> Result<Signal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_signal(&raw).map_err(serde::de::Error::custom)
}

/// Verbosity of the log sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Equivalent `tracing` filter.
    pub fn as_filter(&self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "err" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            _ => Err(ConfigError::UnknownLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, line-oriented log destination.
///
/// Cheap to clone; all clones write to the same writer. Write errors are ignored.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
    /// Wraps an arbitrary writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes to the process's standard error.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    /// Discards everything.
    pub fn discard() -> Self {
        Self::new(std::io::sink())
    }

    /// Appends one formatted record.
    pub(crate) fn append(&self, record: &[u8]) {
        let Ok(mut w) = self.inner.lock() else {
            return;
        };
        let _ = w.write_all(record);
        let _ = w.flush();
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}
