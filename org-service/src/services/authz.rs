use axum::http::Method;
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use service_core::error::AppError;
use std::path::Path;

/// Request/policy model: a role may perform an action on any path its
/// pattern key-matches.
const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && keyMatch(r.obj, p.obj) && r.act == p.act
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Write,
    Delete,
    /// Verbs without a policy action; never matches a rule.
    None,
}

impl Action {
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::POST => Action::Create,
            Method::GET => Action::Read,
            Method::PATCH | Method::PUT => Action::Write,
            Method::DELETE => Action::Delete,
            _ => Action::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::None => "",
        }
    }
}

/// Decides whether a role may perform an action on a resource path.
pub trait Authorizer: Send + Sync {
    fn enforce(&self, role: &str, resource: &str, action: Action) -> Result<bool, AppError>;
}

/// Casbin-backed enforcer, loaded once and read-only afterwards.
pub struct CasbinAuthorizer {
    enforcer: Enforcer,
}

impl CasbinAuthorizer {
    pub async fn from_policy_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read policy file {}: {}",
                path.display(),
                e
            ))
        })?;
        let authorizer = Self::from_policy_str(&text).await?;
        tracing::info!(path = %path.display(), "Authorization policy loaded");
        Ok(authorizer)
    }

    pub async fn from_policy_str(text: &str) -> Result<Self, AppError> {
        let rules = parse_policy(text)?;

        let model = DefaultModel::from_str(MODEL)
            .await
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid policy model: {}", e)))?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default())
            .await
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build enforcer: {}", e)))?;

        let count = rules.len();
        enforcer
            .add_policies(rules)
            .await
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to load policy: {}", e)))?;

        tracing::debug!(rules = count, "Policy rules registered");
        Ok(Self { enforcer })
    }
}

impl Authorizer for CasbinAuthorizer {
    fn enforce(&self, role: &str, resource: &str, action: Action) -> Result<bool, AppError> {
        self.enforcer
            .enforce((role, resource, action.as_str()))
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Policy evaluation failed: {}", e)))
    }
}

/// Parses `p, role, pattern, action` lines. Blank lines and `#` comments
/// are skipped; anything else is a startup error.
fn parse_policy(text: &str) -> Result<Vec<Vec<String>>, AppError> {
    let mut rules = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        match fields.as_slice() {
            ["p", role, pattern, action]
                if !role.is_empty() && !pattern.is_empty() && !action.is_empty() =>
            {
                rules.push(vec![role.to_string(), pattern.to_string(), action.to_string()]);
            }
            _ => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Malformed policy line {}: {}",
                    number + 1,
                    line
                )))
            }
        }
    }

    if rules.is_empty() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "Policy contains no rules"
        )));
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "
# roles
p, baseUser, /api/v1/posts*, read
p, organizationAdmin, /api/v1/posts*, delete
p, superUser, /api/v1/*, read
";

    #[test]
    fn verbs_map_to_actions() {
        assert_eq!(Action::from_method(&Method::POST), Action::Create);
        assert_eq!(Action::from_method(&Method::GET), Action::Read);
        assert_eq!(Action::from_method(&Method::PUT), Action::Write);
        assert_eq!(Action::from_method(&Method::PATCH), Action::Write);
        assert_eq!(Action::from_method(&Method::DELETE), Action::Delete);
        assert_eq!(Action::from_method(&Method::OPTIONS), Action::None);
    }

    #[tokio::test]
    async fn key_match_patterns_grant_by_prefix() {
        let authz = CasbinAuthorizer::from_policy_str(POLICY).await.unwrap();

        assert!(authz.enforce("baseUser", "/api/v1/posts", Action::Read).unwrap());
        assert!(authz.enforce("baseUser", "/api/v1/posts/abc", Action::Read).unwrap());
        assert!(!authz.enforce("baseUser", "/api/v1/posts/abc", Action::Delete).unwrap());
        assert!(!authz.enforce("baseUser", "/api/v1/users", Action::Read).unwrap());
        assert!(authz.enforce("superUser", "/api/v1/organizations", Action::Read).unwrap());
        assert!(!authz.enforce("stranger", "/api/v1/posts", Action::Read).unwrap());
    }

    #[tokio::test]
    async fn empty_action_never_matches() {
        let authz = CasbinAuthorizer::from_policy_str(POLICY).await.unwrap();
        assert!(!authz.enforce("superUser", "/api/v1/posts", Action::None).unwrap());
    }

    #[tokio::test]
    async fn malformed_policy_fails() {
        for text in ["p, baseUser, /x", "g, a, b", "p, , /x, read", "# only comments"] {
            assert!(matches!(
                CasbinAuthorizer::from_policy_str(text).await,
                Err(AppError::ConfigError(_))
            ));
        }
    }

    #[tokio::test]
    async fn missing_policy_file_fails() {
        let result = CasbinAuthorizer::from_policy_file("/nonexistent/policy.csv").await;
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
