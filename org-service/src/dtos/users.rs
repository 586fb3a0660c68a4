use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::User;
use crate::utils::{validate_no_url, validate_role, validate_roles};

pub const MAX_BULK_USERS: usize = 50;

/// Public view of a user; credentials and codes never leave the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub confirmed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id_hex(),
            organization_id: user.organization_id,
            name: user.name,
            email: user.email,
            roles: user.roles,
            permissions: user.permissions,
            confirmed: user.confirmed,
            created_at: user.created_at.try_to_rfc3339_string().unwrap_or_default(),
            updated_at: user.updated_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "validate_no_url")
    )]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "validate_role"))]
    pub role: String,
}

/// The 50-user cap is checked by the handler so it can answer with a
/// dedicated message.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkCreateUsersRequest {
    #[validate(length(min = 1, message = "At least one user is required"), nested)]
    pub users: Vec<CreateUserRequest>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "validate_no_url")
    )]
    pub name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(custom(function = "validate_roles"))]
    pub roles: Option<Vec<String>>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.roles.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RolesResponse {
    pub roles: Vec<String>,
}
