//! # Rendering-engine configuration.
//!
//! [`RenderConfig`] is a persistent value: once handed to an engine it is never
//! mutated. Token rotation produces a **new** value with [`RenderConfig::merge`],
//! so an engine still holding the previous `Arc<RenderConfig>` is unaffected.
//!
//! ## Merge semantics
//! ```text
//! base.merge(fragment):
//!   Option fields  → fragment wins when Some, otherwise base is kept
//!   templates      → base templates followed by fragment templates
//! ```

use crate::config::{AgentConfig, LogLevel, LogSink, TemplateSpec};
use crate::error::ConfigError;

/// Client identification sent by the rendering engine to the secret store.
pub const CLIENT_USER_AGENT: &str = concat!("execvisor-templating/", env!("CARGO_PKG_VERSION"));

/// Inputs needed to derive a [`RenderConfig`] from the supervisor configuration.
#[derive(Clone, Debug)]
pub struct ManagerConfig<'a> {
    pub agent: &'a AgentConfig,
    pub namespace: Option<&'a str>,
    pub log_level: LogLevel,
    pub log_sink: LogSink,
}

/// Secret-store connection settings of the rendering engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaultSettings {
    pub address: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub client_user_agent: Option<String>,
}

impl VaultSettings {
    fn merge(&self, other: &VaultSettings) -> VaultSettings {
        VaultSettings {
            address: other.address.clone().or_else(|| self.address.clone()),
            token: other.token.clone().or_else(|| self.token.clone()),
            namespace: other.namespace.clone().or_else(|| self.namespace.clone()),
            client_user_agent: other
                .client_user_agent
                .clone()
                .or_else(|| self.client_user_agent.clone()),
        }
    }
}

/// Full configuration of one rendering-engine instance.
#[derive(Clone, Debug, Default)]
pub struct RenderConfig {
    pub vault: VaultSettings,
    pub templates: Vec<TemplateSpec>,
    pub log_level: Option<LogLevel>,
    pub log_sink: Option<LogSink>,
}

impl RenderConfig {
    /// Builds the engine configuration for the agent's env templates.
    ///
    /// Every template must have contents or a source, and must name a usable
    /// environment variable.
    pub fn from_manager(cfg: &ManagerConfig<'_>) -> Result<Self, ConfigError> {
        for (index, tpl) in cfg.agent.env_templates.iter().enumerate() {
            if tpl.contents.is_none() && tpl.source.is_none() {
                return Err(ConfigError::MissingTemplateSource { index });
            }
            if tpl.env_var.is_empty() {
                return Err(ConfigError::MissingEnvVar { index });
            }
            if tpl.env_var.contains(['=', '\0']) {
                return Err(ConfigError::InvalidEnvVar {
                    name: tpl.env_var.clone(),
                });
            }
        }

        Ok(Self {
            vault: VaultSettings {
                address: cfg.agent.vault.address.clone(),
                token: cfg.agent.vault.token.clone(),
                namespace: cfg.namespace.map(str::to_string),
                client_user_agent: Some(CLIENT_USER_AGENT.to_string()),
            },
            templates: cfg.agent.env_templates.clone(),
            log_level: Some(cfg.log_level),
            log_sink: Some(cfg.log_sink.clone()),
        })
    }

    /// Fragment carrying only a new token and the client identification.
    pub fn token_fragment(token: &str) -> Self {
        Self {
            vault: VaultSettings {
                token: Some(token.to_string()),
                client_user_agent: Some(CLIENT_USER_AGENT.to_string()),
                ..VaultSettings::default()
            },
            ..Self::default()
        }
    }

    /// Returns a new configuration with `other` laid over `self`.
    pub fn merge(&self, other: &RenderConfig) -> RenderConfig {
        let mut templates = self.templates.clone();
        templates.extend(other.templates.iter().cloned());

        RenderConfig {
            vault: self.vault.merge(&other.vault),
            templates,
            log_level: other.log_level.or(self.log_level),
            log_sink: other.log_sink.clone().or_else(|| self.log_sink.clone()),
        }
    }
}
