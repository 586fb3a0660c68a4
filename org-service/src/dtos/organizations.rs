use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Organization;
use crate::utils::validate_no_url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(organization: Organization) -> Self {
        Self {
            id: organization.id_hex(),
            created_at: organization
                .created_at
                .try_to_rfc3339_string()
                .unwrap_or_default(),
            updated_at: organization
                .updated_at
                .try_to_rfc3339_string()
                .unwrap_or_default(),
            name: organization.name,
            email: organization.email,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "validate_no_url")
    )]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}
