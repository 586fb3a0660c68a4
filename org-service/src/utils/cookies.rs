use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use crate::services::tokens::{ACCESS_TOKEN_TTL_HOURS, REFRESH_TOKEN_TTL_HOURS};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

pub const ACCESS_COOKIE_PATH: &str = "/api/";
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth/";

fn build(
    name: &'static str,
    value: String,
    path: &'static str,
    expires: OffsetDateTime,
    domain: Option<&str>,
) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .path(path)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .expires(expires)
        .build();
    if let Some(domain) = domain {
        cookie.set_domain(domain.to_string());
    }
    cookie
}

/// Adds both token cookies to the jar.
pub fn with_token_cookies(
    jar: CookieJar,
    access_token: String,
    refresh_token: String,
    domain: Option<&str>,
) -> CookieJar {
    let now = OffsetDateTime::now_utc();
    jar.add(build(
        ACCESS_COOKIE,
        access_token,
        ACCESS_COOKIE_PATH,
        now + Duration::hours(ACCESS_TOKEN_TTL_HOURS),
        domain,
    ))
    .add(build(
        REFRESH_COOKIE,
        refresh_token,
        REFRESH_COOKIE_PATH,
        now + Duration::hours(REFRESH_TOKEN_TTL_HOURS),
        domain,
    ))
}

/// Overwrites both token cookies with empty values that expire immediately.
pub fn with_cleared_cookies(jar: CookieJar, domain: Option<&str>) -> CookieJar {
    let expires = OffsetDateTime::now_utc() + Duration::seconds(1);
    jar.add(build(ACCESS_COOKIE, String::new(), ACCESS_COOKIE_PATH, expires, domain))
        .add(build(REFRESH_COOKIE, String::new(), REFRESH_COOKIE_PATH, expires, domain))
}
