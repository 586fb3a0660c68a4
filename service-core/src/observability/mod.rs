pub mod logging;

pub use logging::{LogLevelHandle, init_tracing};
