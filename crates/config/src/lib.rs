use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Provider mode ─────────────────────────────────────────────────────────────

/// Which enrichment backend handles the next call.
///
/// | Mode     | Selected when                                            |
/// |----------|----------------------------------------------------------|
/// | `Proxy`  | `gateway.proxy_base_url` is non-empty                    |
/// | `Direct` | no proxy, but `gateway.api_key` is present               |
/// | `Mock`   | neither is configured (offline / tests)                  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Proxy,
    Direct,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the enrichment proxy backend.  Empty means "not configured".
    /// Overridden at load time by the `MEMOIR_PROXY_URL` environment variable.
    pub proxy_base_url: String,
    /// Credential for the direct provider.  Empty means "absent".
    /// Overridden at load time by `MEMOIR_API_KEY`.
    pub api_key: String,
    /// Model identifier sent to the direct provider.
    pub direct_model: String,
    /// Style / persona selector forwarded with every request.
    pub persona: String,
    /// Target output language for generated text (BCP 47 tag).
    pub language: String,
    /// Entitlement flag used by the proxy for request prioritization.
    pub premium: bool,
    /// Seed for the deterministic mock provider.
    pub mock_seed: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: String::new(),
            api_key: String::new(),
            direct_model: "gpt-4o-mini".to_string(),
            persona: "warm".to_string(),
            language: "en".to_string(),
            premium: false,
            mock_seed: 0,
        }
    }
}

impl GatewayConfig {
    /// Select the provider for the next call.
    ///
    /// This is evaluated on **every** gateway call rather than cached, so a
    /// configuration change takes effect on the call that follows it.
    pub fn provider_mode(&self) -> ProviderMode {
        if !self.proxy_base_url.trim().is_empty() {
            ProviderMode::Proxy
        } else if !self.api_key.trim().is_empty() {
            ProviderMode::Direct
        } else {
            ProviderMode::Mock
        }
    }
}

// ── Retry tuning ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt budget per network call (first try included).
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles on each subsequent one.
    pub base_delay_ms: u64,
    /// Ceiling on the per-attempt delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 400,
            max_delay_ms: 5_000,
        }
    }
}

// ── Sync / remote store ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote store.  Empty disables real uploads.
    /// Overridden at load time by `MEMOIR_REMOTE_URL`.
    pub remote_base_url: String,
    /// Opaque bearer token.  Acquisition is out of scope; the sync engine
    /// only forwards it.
    pub auth_token: String,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_base_url: String::new(),
            auth_token: String::new(),
            request_timeout_secs: 30,
        }
    }
}

// ── Local store ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the draft database.
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: ".memoir".to_string(),
        }
    }
}

// ── Telemetry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// ── AppConfig ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("MEMOIR_PROXY_URL") {
            if !value.is_empty() {
                config.gateway.proxy_base_url = value;
            }
        }

        if let Ok(value) = env::var("MEMOIR_API_KEY") {
            if !value.is_empty() {
                config.gateway.api_key = value;
            }
        }

        if let Ok(value) = env::var("MEMOIR_REMOTE_URL") {
            if !value.is_empty() {
                config.sync.remote_base_url = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // ── Defaults ───────────────────────────────────────────────────────────

    #[test]
    fn defaults_select_mock_provider() {
        let cfg = AppConfig::default();
        assert!(cfg.gateway.proxy_base_url.is_empty());
        assert!(cfg.gateway.api_key.is_empty());
        assert_eq!(cfg.gateway.provider_mode(), ProviderMode::Mock);
    }

    #[test]
    fn cosmetic_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.gateway.direct_model, "gpt-4o-mini");
        assert_eq!(cfg.gateway.persona, "warm");
        assert_eq!(cfg.gateway.language, "en");
        assert!(!cfg.gateway.premium);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay_ms, 400);
        assert_eq!(cfg.retry.max_delay_ms, 5_000);
        assert_eq!(cfg.sync.request_timeout_secs, 30);
        assert_eq!(cfg.store.data_dir, ".memoir");
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    // ── provider_mode chain ────────────────────────────────────────────────

    #[test]
    fn proxy_wins_over_direct() {
        let mut gw = GatewayConfig::default();
        gw.proxy_base_url = "https://proxy.example.com".to_string();
        gw.api_key = "sk-123".to_string();
        assert_eq!(gw.provider_mode(), ProviderMode::Proxy);
    }

    #[test]
    fn direct_when_only_key_present() {
        let mut gw = GatewayConfig::default();
        gw.api_key = "sk-123".to_string();
        assert_eq!(gw.provider_mode(), ProviderMode::Direct);
    }

    #[test]
    fn whitespace_only_values_do_not_configure_a_provider() {
        let mut gw = GatewayConfig::default();
        gw.proxy_base_url = "   ".to_string();
        gw.api_key = "\t".to_string();
        assert_eq!(gw.provider_mode(), ProviderMode::Mock);
    }

    #[test]
    fn mode_changes_take_effect_without_reload() {
        let mut gw = GatewayConfig::default();
        assert_eq!(gw.provider_mode(), ProviderMode::Mock);
        gw.api_key = "sk-123".to_string();
        assert_eq!(gw.provider_mode(), ProviderMode::Direct);
        gw.api_key.clear();
        assert_eq!(gw.provider_mode(), ProviderMode::Mock);
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.gateway.provider_mode(), ProviderMode::Mock);
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn load_from_valid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.toml");
        fs::write(
            &path,
            r#"
[gateway]
proxy_base_url = "https://enrich.example.com"
persona = "playful"
language = "ja"
premium = true

[retry]
max_attempts = 5
base_delay_ms = 100

[sync]
remote_base_url = "https://store.example.com"
auth_token = "tok-abc"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.gateway.proxy_base_url, "https://enrich.example.com");
        assert_eq!(cfg.gateway.persona, "playful");
        assert_eq!(cfg.gateway.language, "ja");
        assert!(cfg.gateway.premium);
        assert_eq!(cfg.gateway.provider_mode(), ProviderMode::Proxy);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_ms, 100);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.retry.max_delay_ms, 5_000);
        assert_eq!(cfg.sync.remote_base_url, "https://store.example.com");
        assert_eq!(cfg.sync.auth_token, "tok-abc");
        assert_eq!(cfg.store.data_dir, ".memoir");
    }

    #[test]
    fn load_from_partial_toml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            r#"
[telemetry]
log_level = "debug"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.telemetry.log_level, "debug");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.gateway.provider_mode(), ProviderMode::Mock);
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    // ── save_to + roundtrip ────────────────────────────────────────────────

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.gateway.api_key = "sk-roundtrip".to_string();
        cfg.gateway.mock_seed = 42;
        cfg.sync.remote_base_url = "https://store.example.com".to_string();
        cfg.retry.max_attempts = 7;

        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.api_key, "sk-roundtrip");
        assert_eq!(loaded.gateway.mock_seed, 42);
        assert_eq!(loaded.sync.remote_base_url, "https://store.example.com");
        assert_eq!(loaded.retry.max_attempts, 7);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/config.toml");
        let cfg = AppConfig::default();
        cfg.save_to(&path).unwrap();
        assert!(path.exists());
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    #[test]
    fn env_proxy_url_overrides_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(
            &path,
            r#"
[gateway]
api_key = "sk-from-file"
"#,
        )
        .unwrap();

        // SAFETY: test is single-threaded for this env var.
        unsafe { env::set_var("MEMOIR_PROXY_URL", "https://env.example.com") };
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.gateway.proxy_base_url, "https://env.example.com");
        // Proxy now outranks the file-provided key.
        assert_eq!(cfg.gateway.provider_mode(), ProviderMode::Proxy);
        unsafe { env::remove_var("MEMOIR_PROXY_URL") };
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty-env.toml");
        fs::write(
            &path,
            r#"
[sync]
remote_base_url = "https://file.example.com"
"#,
        )
        .unwrap();

        // SAFETY: test is single-threaded for this env var.
        unsafe { env::set_var("MEMOIR_REMOTE_URL", "") };
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.sync.remote_base_url, "https://file.example.com");
        unsafe { env::remove_var("MEMOIR_REMOTE_URL") };
    }

    // ── ProviderMode serde ─────────────────────────────────────────────────

    #[test]
    fn provider_mode_serde_roundtrip() {
        for (mode, label) in [
            (ProviderMode::Proxy, "\"proxy\""),
            (ProviderMode::Direct, "\"direct\""),
            (ProviderMode::Mock, "\"mock\""),
        ] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, label);
            let back: ProviderMode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, mode);
        }
    }
}
