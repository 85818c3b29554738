//! Token rotation bookkeeping.
//!
//! Remembers the latest token and produces the next engine configuration for
//! a new one. The latest token starts out as the token of the agent
//! configuration (empty when none is configured), so receiving the token the
//! engine was built with is not a rotation.

use crate::engine::RenderConfig;

/// Latest-token tracker.
#[derive(Debug, Default)]
pub struct TokenRotation {
    latest: String,
}

impl TokenRotation {
    /// Starts from `initial`, the token the first engine is built with.
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            latest: initial.unwrap_or_default().to_string(),
        }
    }

    /// Returns `true` if `token` differs from the latest one received.
    pub fn is_new(&self, token: &str) -> bool {
        token != self.latest
    }

    /// Records `token` and returns `base` with the token laid over it.
    pub fn rotate(&mut self, token: String, base: &RenderConfig) -> RenderConfig {
        let next = base.merge(&RenderConfig::token_fragment(&token));
        self.latest = token;
        next
    }

    /// Latest token (the configured one before any rotation).
    pub fn latest(&self) -> &str {
        &self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSpec;
    use crate::engine::VaultSettings;

    fn base() -> RenderConfig {
        RenderConfig {
            vault: VaultSettings {
                address: Some("https://vault:8200".into()),
                token: Some("initial".into()),
                ..VaultSettings::default()
            },
            templates: vec![TemplateSpec::inline("FOO", "{{ .foo }}")],
            ..RenderConfig::default()
        }
    }

    #[test]
    fn configured_token_is_not_new() {
        let rotation = TokenRotation::new(Some("initial"));
        assert!(!rotation.is_new("initial"));
        assert!(rotation.is_new("tokenA"));
        assert_eq!(rotation.latest(), "initial");
    }

    #[test]
    fn without_configured_token_any_token_is_new() {
        let rotation = TokenRotation::new(None);
        assert!(rotation.is_new("tokenA"));
        assert_eq!(rotation.latest(), "");
    }

    #[test]
    fn duplicate_tokens_are_not_new() {
        let mut rotation = TokenRotation::new(None);
        let cfg = rotation.rotate("tokenA".into(), &base());
        assert!(!rotation.is_new("tokenA"));
        assert!(rotation.is_new("tokenB"));
        assert_eq!(cfg.vault.token.as_deref(), Some("tokenA"));
    }

    #[test]
    fn rotation_keeps_everything_but_the_token() {
        let mut rotation = TokenRotation::new(None);
        let first = rotation.rotate("tokenA".into(), &base());
        let second = rotation.rotate("tokenB".into(), &first);

        assert_eq!(second.vault.token.as_deref(), Some("tokenB"));
        assert_eq!(second.vault.address.as_deref(), Some("https://vault:8200"));
        assert_eq!(second.templates.len(), 1);
        assert_eq!(rotation.latest(), "tokenB");
        // the value handed in is untouched
        assert_eq!(first.vault.token.as_deref(), Some("tokenA"));
    }
}
