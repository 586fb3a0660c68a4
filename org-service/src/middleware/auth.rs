use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::models::SUPER_USER;
use crate::services::{AccessClaims, Action, Authorizer, TokenService};
use crate::utils::cookies::ACCESS_COOKIE;
use crate::AppState;

/// The authenticated caller, placed in request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub name: String,
    pub organization_id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_super_user(&self) -> bool {
        self.has_role(SUPER_USER)
    }
}

impl From<AccessClaims> for Principal {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.user_id,
            name: claims.name,
            organization_id: claims.organization_id,
            roles: claims.roles,
        }
    }
}

/// Cookie token to principal, or the error the caller should see.
///
/// A bad or missing token is 401, a token without roles is 401, a policy
/// failure is 500 and no allowing role is 403.
pub fn authorize(
    tokens: &TokenService,
    authz: &dyn Authorizer,
    access_token: Option<&str>,
    method: &Method,
    path: &str,
) -> Result<Principal, AppError> {
    let token = access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing access token")))?;

    let claims = tokens.validate_access_token(token)?;
    if claims.roles.is_empty() {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "JWT token missing 'role' claim"
        )));
    }

    let action = Action::from_method(method);
    for role in &claims.roles {
        match authz.enforce(role, path, action) {
            Ok(true) => return Ok(Principal::from(claims)),
            Ok(false) => continue,
            Err(e) => {
                tracing::error!(error = %e, role = %role, path = %path, "Policy evaluation failed");
                return Err(AppError::InternalError(anyhow::anyhow!(
                    "Error authorizing user"
                )));
            }
        }
    }

    tracing::warn!(
        user_id = %claims.user_id,
        roles = ?claims.roles,
        method = %method,
        path = %path,
        "Access denied"
    );
    Err(AppError::Forbidden(anyhow::anyhow!("Access denied")))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar.get(ACCESS_COOKIE).map(|cookie| cookie.value().to_string());
    let principal = authorize(
        &state.tokens,
        state.authz.as_ref(),
        token.as_deref(),
        req.method(),
        req.uri().path(),
    )?;

    tracing::debug!(user_id = %principal.user_id, "Request authorized");
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth principal missing from request extensions"
            ))
        })
    }
}
