//! One-time codes for email confirmation and invite logins.

use rand::{
    distributions::Slice,
    rngs::{OsRng, StdRng},
    Rng, RngCore, SeedableRng,
};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CONFIRM_CODE_LENGTH: usize = 4;
pub const CONFIRM_ALPHABET: &str = "1234567890";

pub const LOGIN_CODE_LENGTH: usize = 8;
pub const LOGIN_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz1234567890";

pub fn generate_confirm_code() -> String {
    generate(CONFIRM_CODE_LENGTH, CONFIRM_ALPHABET, &mut OsRng)
}

pub fn generate_login_code() -> String {
    generate(LOGIN_CODE_LENGTH, LOGIN_ALPHABET, &mut OsRng)
}

/// Draws `length` characters uniformly from `alphabet`.
///
/// The sampler is seeded from `rng`; when that fails the low digits of the
/// current nanosecond clock are used instead.
pub fn generate(length: usize, alphabet: &str, rng: &mut impl RngCore) -> String {
    let Ok(symbols) = Slice::new(alphabet.as_bytes()) else {
        return String::new();
    };

    match StdRng::from_rng(rng) {
        Ok(sampler) => sampler
            .sample_iter(symbols)
            .take(length)
            .map(|byte| char::from(*byte))
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "Random source unavailable, falling back to clock");
            clock_fallback(length)
        }
    }
}

fn clock_fallback(length: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default()
        .to_string();
    let start = nanos.len().saturating_sub(length);
    nanos[start..].to_string()
}
