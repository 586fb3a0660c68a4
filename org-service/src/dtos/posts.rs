use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Post;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub organization_id: String,
    pub created_by_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id.map(|id| id.to_hex()).unwrap_or_default(),
            created_at: post.created_at.try_to_rfc3339_string().unwrap_or_default(),
            updated_at: post.updated_at.try_to_rfc3339_string().unwrap_or_default(),
            name: post.name,
            organization_id: post.organization_id,
            created_by_id: post.created_by_id,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
}
