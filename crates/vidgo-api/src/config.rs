//! API configuration.

/// Per-vendor API keys and base URL overrides.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub piapi_key: String,
    pub piapi_base_url: Option<String>,
    pub pollo_key: String,
    pub pollo_base_url: Option<String>,
    pub a2e_key: String,
    pub a2e_base_url: Option<String>,
    pub goenhance_key: String,
    pub goenhance_base_url: Option<String>,
    pub gemini_key: String,
    pub gemini_base_url: Option<String>,
}

impl ProviderSettings {
    fn from_env() -> Self {
        Self {
            piapi_key: env_str("PIAPI_API_KEY"),
            piapi_base_url: std::env::var("PIAPI_BASE_URL").ok(),
            pollo_key: env_str("POLLO_API_KEY"),
            pollo_base_url: std::env::var("POLLO_BASE_URL").ok(),
            a2e_key: env_str("A2E_API_KEY"),
            a2e_base_url: std::env::var("A2E_BASE_URL").ok(),
            goenhance_key: env_str("GOENHANCE_API_KEY"),
            goenhance_base_url: std::env::var("GOENHANCE_BASE_URL").ok(),
            gemini_key: env_str("GEMINI_API_KEY"),
            gemini_base_url: std::env::var("GEMINI_BASE_URL").ok(),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Run the moderation pre-step for user-imagery tools
    pub moderation_enabled: bool,
    /// Optional path to a JSON material seed file
    pub materials_path: Option<String>,
    /// Vendor credentials
    pub providers: ProviderSettings,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
            moderation_enabled: true,
            materials_path: None,
            providers: ProviderSettings::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            moderation_enabled: std::env::var("MODERATION_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            materials_path: std::env::var("MATERIALS_PATH").ok(),
            providers: ProviderSettings::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn env_str(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8000);
        assert!(config.moderation_enabled);
        assert!(!config.is_production());
    }
}
