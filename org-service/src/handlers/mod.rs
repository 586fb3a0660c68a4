pub mod auth;
pub mod meta;
pub mod organizations;
pub mod posts;
pub mod register;
pub mod users;
