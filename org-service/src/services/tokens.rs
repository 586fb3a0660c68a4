use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::User;

pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;
pub const REFRESH_TOKEN_TTL_HOURS: i64 = 48;

/// Claims carried by the `accessToken` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub name: String,
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub organization_id: String,
    pub exp: i64,
}

/// Claims carried by the `refreshToken` cookie.
///
/// Unknown fields are refused so an access token can never pass as one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefreshClaims {
    pub user_id: String,
    pub exp: i64,
}

/// HS256 issuer and validator for both token kinds.
///
/// Access and refresh tokens are signed with separate secrets.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Result<Self, AppError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Token secrets must not be empty"
            )));
        }

        tracing::info!("Token service initialized with HS256 secrets");

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl: Duration::hours(ACCESS_TOKEN_TTL_HOURS),
            refresh_ttl: Duration::hours(REFRESH_TOKEN_TTL_HOURS),
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation
    }

    /// Returns the signed token and its expiry as a unix timestamp.
    pub fn create_access_token(&self, user: &User) -> Result<(String, i64), AppError> {
        let exp = (Utc::now() + self.access_ttl).timestamp();
        let claims = AccessClaims {
            name: user.name.clone(),
            user_id: user.id_hex(),
            roles: user.roles.clone(),
            organization_id: user.organization_id.clone(),
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok((token, exp))
    }

    pub fn create_refresh_token(&self, user: &User) -> Result<String, AppError> {
        let claims = RefreshClaims {
            user_id: user.id_hex(),
            exp: (Utc::now() + self.refresh_ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))?;

        Ok(token)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &Self::validation())?;
        Ok(data.claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &Self::validation())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ORGANIZATION_ADMIN;
    use bson::oid::ObjectId;

    fn user() -> User {
        let mut user = User::new(
            "Ada".to_string(),
            "ada@example.com".to_string(),
            ObjectId::new().to_hex(),
            vec![ORGANIZATION_ADMIN.to_string()],
        );
        user.id = Some(ObjectId::new());
        user
    }

    fn service() -> TokenService {
        TokenService::new("access-secret", "refresh-secret").unwrap()
    }

    #[test]
    fn access_token_round_trip_carries_identity() {
        let tokens = service();
        let user = user();
        let (token, exp) = tokens.create_access_token(&user).unwrap();

        let claims = tokens.validate_access_token(&token).unwrap();
        assert_eq!(claims.user_id, user.id_hex());
        assert_eq!(claims.organization_id, user.organization_id);
        assert_eq!(claims.roles, vec![ORGANIZATION_ADMIN.to_string()]);
        assert_eq!(claims.exp, exp);
        assert!(exp > Utc::now().timestamp() + 23 * 3600);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let user = user();
        let (token, _) = TokenService::new("other", "refresh-secret")
            .unwrap()
            .create_access_token(&user)
            .unwrap();

        let err = service().validate_access_token(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[test]
    fn expired_token_is_rejected_without_leeway() {
        let claims = AccessClaims {
            name: "Ada".to_string(),
            user_id: ObjectId::new().to_hex(),
            roles: vec![],
            organization_id: ObjectId::new().to_hex(),
            exp: Utc::now().timestamp() - 1,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        assert!(matches!(
            service().validate_access_token(&token),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let claims = RefreshClaims {
            user_id: ObjectId::new().to_hex(),
            exp: Utc::now().timestamp() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"refresh-secret"),
        )
        .unwrap();

        assert!(service().validate_refresh_token(&token).is_err());
    }

    #[test]
    fn token_kinds_do_not_cross_validate() {
        let shared = TokenService::new("same", "same").unwrap();
        let user = user();
        let (access, _) = shared.create_access_token(&user).unwrap();
        let refresh = shared.create_refresh_token(&user).unwrap();

        assert!(shared.validate_refresh_token(&access).is_err());
        assert!(shared.validate_access_token(&refresh).is_err());

        let tokens = service();
        let (access, _) = tokens.create_access_token(&user).unwrap();
        assert!(tokens.validate_refresh_token(&access).is_err());
        let refresh = tokens.create_refresh_token(&user).unwrap();
        assert_eq!(
            tokens.validate_refresh_token(&refresh).unwrap().user_id,
            user.id_hex()
        );
    }

    #[test]
    fn empty_secret_fails_startup() {
        assert!(matches!(
            TokenService::new("", "x"),
            Err(AppError::ConfigError(_))
        ));
    }
}
