pub mod auth;
pub mod common;
pub mod organizations;
pub mod posts;
pub mod users;

pub use common::{GetManyResponse, InfoResponse, ListParams, LogLevelResponse, MessageResponse, PatchLogLevel};
