use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use service_core::error::{AppError, ErrorResponse};
use validator::{Validate, ValidationError};

use crate::models::ALLOWED_ROLES;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://|www\.|[a-z0-9-]+\.(com|net|org|io|co|info|biz|ru|xyz)\b)")
        .expect("URL pattern is a valid regex")
});

/// JSON body that has passed its `validator` rules.
///
/// Malformed JSON is a 400; rule violations are a 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            let body = ErrorResponse {
                error: format!("Json parse error: {}", e.body_text()),
                details: None,
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        })?;

        value
            .validate()
            .map_err(|e| AppError::from(e).into_response())?;

        Ok(ValidatedJson(value))
    }
}

/// Names must not carry links.
pub fn validate_no_url(value: &str) -> Result<(), ValidationError> {
    if URL_PATTERN.is_match(value) {
        let mut err = ValidationError::new("no_url");
        err.message = Some("URLs are not allowed".into());
        return Err(err);
    }
    Ok(())
}

pub fn validate_role(role: &str) -> Result<(), ValidationError> {
    if ALLOWED_ROLES.contains(&role) {
        Ok(())
    } else {
        let mut err = ValidationError::new("role");
        err.message = Some(format!("Role must be one of {}", ALLOWED_ROLES.join(", ")).into());
        Err(err)
    }
}

pub fn validate_roles(roles: &[String]) -> Result<(), ValidationError> {
    if roles.is_empty() {
        let mut err = ValidationError::new("roles");
        err.message = Some("At least one role is required".into());
        return Err(err);
    }
    roles.iter().try_for_each(|role| validate_role(role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pattern_compiles() {
        Lazy::force(&URL_PATTERN);
        assert!(URL_PATTERN.is_match("HTTP://EXAMPLE"));
    }

    #[test]
    fn names_with_links_are_rejected() {
        assert!(validate_no_url("Ada Lovelace").is_ok());
        assert!(validate_no_url("Jean-Luc O'Neil").is_ok());
        assert!(validate_no_url("visit https://spam.example").is_err());
        assert!(validate_no_url("www.spam").is_err());
        assert!(validate_no_url("cheap-pills.com").is_err());
    }

    #[test]
    fn only_invitable_roles_pass() {
        assert!(validate_role("baseUser").is_ok());
        assert!(validate_role("organizationAdmin").is_ok());
        assert!(validate_role("superUser").is_err());
        assert!(validate_roles(&[]).is_err());
        assert!(validate_roles(&["baseUser".to_string(), "root".to_string()]).is_err());
    }
}
