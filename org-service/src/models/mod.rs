pub mod organization;
pub mod post;
pub mod user;

pub use organization::Organization;
pub use post::Post;
pub use user::{User, ALLOWED_ROLES, BASE_USER, ORGANIZATION_ADMIN, SUPER_USER};
