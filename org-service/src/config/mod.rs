use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub http: HttpConfig,
    pub captcha: CaptchaConfig,
    pub smtp: SmtpConfig,
    pub policy_path: String,
    pub rate_limit_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub cookie_domain: Option<String>,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    pub secret: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_name: String,
    pub from_email: String,
    pub reply_to: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("mongo"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let config = ServiceConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("org-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
            store: StoreConfig {
                backend,
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("org_service"), is_prod)?,
            },
            auth: AuthConfig {
                access_secret: get_env("ACCESS_SECRET", None, true)?,
                refresh_secret: get_env("REFRESH_SECRET", None, true)?,
            },
            http: HttpConfig {
                cookie_domain: optional_env("COOKIE_DOMAIN"),
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            captcha: CaptchaConfig {
                secret: get_env("CAPTCHA_SECRET", None, true)?,
                url: get_env("CAPTCHA_URL", Some("https://hcaptcha.com/siteverify"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_name: get_env("EMAIL_FROM_NAME", Some("Org Service"), is_prod)?,
                from_email: get_env("EMAIL_FROM_EMAIL", Some("no-reply@localhost"), is_prod)?,
                reply_to: get_env("EMAIL_REPLY_TO", Some("no-reply@localhost"), is_prod)?,
            },
            policy_path: get_env("POLICY_PATH", Some("policy/keymatch_policy.csv"), is_prod)?,
            rate_limit_per_second: get_env("RATE_LIMIT_PER_SECOND", Some("30"), is_prod)?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
        };

        Ok(config)
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Reads `key`, falling back to `default` outside production. Required
/// variables (`is_required`) never fall back.
fn get_env(key: &str, default: Option<&str>, is_required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(value) => Ok(value),
        Err(_) => {
            if is_required {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required",
                    key
                )));
            }
            default.map(|d| d.to_string()).ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "{} is required (no default provided)",
                    key
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Dev));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn store_backend_parses() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("MongoDB".parse::<StoreBackend>(), Ok(StoreBackend::Mongo));
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn required_variable_has_no_fallback() {
        let err = get_env("ORG_SERVICE_TEST_UNSET_VARIABLE", Some("x"), true).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert_eq!(
            get_env("ORG_SERVICE_TEST_UNSET_VARIABLE", Some("x"), false).unwrap(),
            "x"
        );
    }
}
