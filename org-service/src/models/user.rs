//! Stored user accounts.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

pub const BASE_USER: &str = "baseUser";
pub const ORGANIZATION_ADMIN: &str = "organizationAdmin";
pub const SUPER_USER: &str = "superUser";

/// Roles an organization admin may hand out.
pub const ALLOWED_ROLES: [&str; 2] = [BASE_USER, ORGANIZATION_ADMIN];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Argon2 hash; absent for invited users until they set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_otp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_otp_at: Option<DateTime>,
    /// Argon2 hash of the invite login code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_otp: Option<String>,
    #[serde(default = "DateTime::now")]
    pub created_at: DateTime,
    #[serde(default = "DateTime::now")]
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by_id: Option<String>,
}

impl User {
    pub fn new(name: String, email: String, organization_id: String, roles: Vec<String>) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            organization_id,
            name,
            email,
            roles,
            permissions: Vec::new(),
            password: None,
            confirmed: false,
            confirm_otp: None,
            confirm_otp_at: None,
            login_otp: None,
            created_at: now,
            updated_at: now,
            created_by_id: None,
            updated_by_id: None,
        }
    }

    /// Hex form of `_id`, empty when the user has not been stored yet.
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn is_organization_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ORGANIZATION_ADMIN)
    }
}
