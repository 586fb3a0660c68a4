pub mod auth;
pub mod authz;
pub mod captcha;
pub mod email;
pub mod organizations;
pub mod otp;
pub mod posts;
pub mod tokens;
pub mod users;

pub use auth::AuthService;
pub use authz::{Action, Authorizer, CasbinAuthorizer};
pub use captcha::{CaptchaVerifier, HCaptchaVerifier, MockCaptcha};
pub use email::{EmailKind, EmailProvider, EmailService, Invite, MockEmailService, SentEmail};
pub use organizations::OrganizationsService;
pub use posts::PostsService;
pub use tokens::{AccessClaims, RefreshClaims, TokenService};
pub use users::{UserChanges, UsersService};

use bson::{doc, Document};

/// Adds a case-insensitive, literal `name` match when a search term is given.
pub(crate) fn with_search(mut filter: Document, search: Option<&str>) -> Document {
    if let Some(term) = search {
        filter.insert(
            "name",
            doc! { "$regex": regex::escape(term), "$options": "i" },
        );
    }
    filter
}
