use async_trait::async_trait;
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;

use crate::config::CaptchaConfig;

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Ok(()) when the token is accepted, `Forbidden` otherwise.
    async fn verify(&self, token: &str) -> Result<(), AppError>;
}

fn rejected() -> AppError {
    AppError::Forbidden(anyhow::anyhow!("Captcha validation failed"))
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// hCaptcha `siteverify` client.
#[derive(Clone)]
pub struct HCaptchaVerifier {
    client: reqwest::Client,
    secret: String,
    url: String,
}

impl HCaptchaVerifier {
    pub fn new(config: &CaptchaConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret: config.secret.clone(),
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl CaptchaVerifier for HCaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<(), AppError> {
        if token.is_empty() {
            return Err(rejected());
        }

        let response = self
            .client
            .post(&self.url)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Captcha provider unreachable");
                rejected()
            })?;

        let body: SiteVerifyResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Captcha provider returned an unreadable body");
            rejected()
        })?;

        if body.success {
            Ok(())
        } else {
            tracing::info!(errors = ?body.error_codes, "Captcha rejected");
            Err(rejected())
        }
    }
}

/// Accepts or rejects every token.
#[derive(Debug, Clone, Copy)]
pub struct MockCaptcha {
    pub accept: bool,
}

#[async_trait]
impl CaptchaVerifier for MockCaptcha {
    async fn verify(&self, _token: &str) -> Result<(), AppError> {
        if self.accept {
            Ok(())
        } else {
            Err(rejected())
        }
    }
}
