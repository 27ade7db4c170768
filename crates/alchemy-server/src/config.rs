use std::time::Duration;

use serde::Deserialize;

/// Top-level server configuration, loaded from `alchemy.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub timeouts: TimeoutsConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            provider: ProviderConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutsConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Together AI generation backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Text model for random elements.
    pub random_text_model: String,
    /// Text model for combinations.
    pub combine_text_model: String,
    pub image_model: String,
    pub random_image_steps: u32,
    pub combine_image_steps: u32,
    pub named_image_steps: u32,
    pub temperature: f32,
    /// Fixed image seed, so repeated renders of one prompt match.
    pub image_seed: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.together.xyz/v1".to_string(),
            random_text_model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo".to_string(),
            combine_text_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo".to_string(),
            image_model: "black-forest-labs/FLUX.1-schnell".to_string(),
            random_image_steps: 1,
            combine_image_steps: 2,
            named_image_steps: 4,
            temperature: 1.2,
            image_seed: 123,
        }
    }
}

/// Upstash Redis REST cache. When either field is missing the server falls
/// back to an in-process cache.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub upstash_url: Option<String>,
    pub upstash_token: Option<String>,
}

impl CacheConfig {
    pub fn upstash(&self) -> Option<(&str, &str)> {
        match (&self.upstash_url, &self.upstash_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }
}

/// Token bucket parameters. All generation requests share one bucket.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub scope: String,
    pub capacity: u32,
    /// Tokens added per elapsed interval.
    pub refill_amount: u32,
    pub refill_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scope: "api".to_string(),
            capacity: 15,
            refill_amount: 5,
            refill_interval_secs: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.refill_interval_secs)
    }
}

/// Upper bounds on every external round-trip.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub generation_ms: u64,
    pub limiter_ms: u64,
    pub cache_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            generation_ms: 10_000,
            limiter_ms: 6_000,
            cache_ms: 5_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }

    pub fn limiter(&self) -> Duration {
        Duration::from_millis(self.limiter_ms)
    }

    pub fn cache(&self) -> Duration {
        Duration::from_millis(self.cache_ms)
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_prompt_len: usize,
    pub max_batch_ids: usize,
    pub max_id_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_len: 256,
            max_batch_ids: 500,
            max_id_len: 128,
        }
    }
}

/// Fatal configuration problems found by [`ServerConfig::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("listen_addr {0:?} is not a valid socket address")]
    InvalidListenAddr(String),
    #[error("{0} must be > 0")]
    Zero(&'static str),
    #[error("rate_limit.scope must not be empty")]
    EmptyScope,
}

impl ServerConfig {
    /// Validate configuration. Non-fatal issues are logged as warnings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }

        if self.provider.api_key.is_none() {
            tracing::warn!("No TOGETHER_AI_API_KEY configured, generation requests will fail");
        }
        if self.cache.upstash().is_none() {
            tracing::warn!("Upstash cache not configured, using in-memory cache");
        }

        if self.rate_limit.scope.is_empty() {
            return Err(ConfigError::EmptyScope);
        }
        let positive = [
            ("rate_limit.capacity", self.rate_limit.capacity as u64),
            ("rate_limit.refill_amount", self.rate_limit.refill_amount as u64),
            ("rate_limit.refill_interval_secs", self.rate_limit.refill_interval_secs),
            ("timeouts.generation_ms", self.timeouts.generation_ms),
            ("timeouts.limiter_ms", self.timeouts.limiter_ms),
            ("timeouts.cache_ms", self.timeouts.cache_ms),
            ("limits.max_prompt_len", self.limits.max_prompt_len as u64),
            ("limits.max_batch_ids", self.limits.max_batch_ids as u64),
            ("limits.max_id_len", self.limits.max_id_len as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }

    /// Load config from `alchemy.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("alchemy.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from alchemy.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse alchemy.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No alchemy.toml found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(addr) = get("ALCHEMY_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(root) = get("ALCHEMY_WEB_ROOT") {
            self.web_root = root;
        }
        if let Some(key) = get("TOGETHER_AI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = get("UPSTASH_REDIS_REST_URL") {
            self.cache.upstash_url = Some(url);
        }
        if let Some(token) = get("UPSTASH_REDIS_REST_TOKEN") {
            self.cache.upstash_token = Some(token);
        }

        if let Some(val) = get("ALCHEMY_RATE_LIMIT_CAPACITY")
            && let Ok(n) = val.parse::<u32>()
        {
            self.rate_limit.capacity = n;
        }
        if let Some(val) = get("ALCHEMY_RATE_LIMIT_REFILL")
            && let Ok(n) = val.parse::<u32>()
        {
            self.rate_limit.refill_amount = n;
        }
        if let Some(val) = get("ALCHEMY_RATE_LIMIT_INTERVAL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.rate_limit.refill_interval_secs = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert!(cfg.provider.api_key.is_none());
        assert!(cfg.cache.upstash().is_none());
        assert_eq!(cfg.rate_limit.scope, "api");
        assert_eq!(cfg.rate_limit.capacity, 15);
        assert_eq!(cfg.rate_limit.refill_amount, 5);
        assert_eq!(cfg.rate_limit.refill_interval(), Duration::from_secs(300));
        assert_eq!(cfg.timeouts.generation(), Duration::from_secs(10));
        assert_eq!(cfg.timeouts.limiter(), Duration::from_secs(6));
        assert_eq!(cfg.provider.image_seed, 123);
    }

    #[test]
    fn validate_accepts_default_config() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidListenAddr(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut cfg = ServerConfig::default();
        cfg.rate_limit.capacity = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Zero("rate_limit.capacity"))
        ));
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:3000"
web_root = "dist"

[provider]
api_key = "tg-key"
image_seed = 7

[cache]
upstash_url = "https://eu1-example.upstash.io"
upstash_token = "tok"

[rate_limit]
capacity = 3
refill_amount = 1
refill_interval_secs = 60

[timeouts]
limiter_ms = 250
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:3000");
        assert_eq!(cfg.provider.api_key.as_deref(), Some("tg-key"));
        assert_eq!(cfg.provider.image_seed, 7);
        assert_eq!(
            cfg.cache.upstash(),
            Some(("https://eu1-example.upstash.io", "tok"))
        );
        assert_eq!(cfg.rate_limit.capacity, 3);
        assert_eq!(cfg.timeouts.limiter_ms, 250);
        // Unspecified fields keep defaults
        assert_eq!(cfg.timeouts.generation_ms, 10_000);
        assert_eq!(cfg.provider.random_image_steps, 1);
    }

    #[test]
    fn cache_needs_both_url_and_token() {
        let cfg = CacheConfig {
            upstash_url: Some("https://x.upstash.io".to_string()),
            upstash_token: None,
        };
        assert!(cfg.upstash().is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("TOGETHER_AI_API_KEY", "env-key"),
            ("UPSTASH_REDIS_REST_URL", "https://env.upstash.io"),
            ("UPSTASH_REDIS_REST_TOKEN", "env-token"),
            ("ALCHEMY_RATE_LIMIT_CAPACITY", "42"),
            ("ALCHEMY_RATE_LIMIT_INTERVAL_SECS", "not-a-number"),
            ("ALCHEMY_LISTEN_ADDR", ""),
        ]
        .into_iter()
        .collect();
        let mut cfg = ServerConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.provider.api_key.as_deref(), Some("env-key"));
        assert_eq!(
            cfg.cache.upstash(),
            Some(("https://env.upstash.io", "env-token"))
        );
        assert_eq!(cfg.rate_limit.capacity, 42);
        // Unparseable and empty values are ignored
        assert_eq!(cfg.rate_limit.refill_interval_secs, 300);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
    }
}
