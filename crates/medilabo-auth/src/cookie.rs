//! `ACCESS_TOKEN` cookie transport

use axum::http::{HeaderMap, header::COOKIE};
use cookie::Cookie;
use cookie::time::Duration;

use crate::token::TOKEN_LIFETIME_SECS;

/// Name of the cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "ACCESS_TOKEN";

/// `Set-Cookie` value handing a freshly issued token to the client
pub fn access_token_cookie(token: &str) -> String {
    Cookie::build((ACCESS_TOKEN_COOKIE, token.to_string()))
        .http_only(true)
        .path("/")
        .max_age(Duration::seconds(TOKEN_LIFETIME_SECS))
        .build()
        .to_string()
}

/// `Set-Cookie` value that makes the client drop its token immediately
pub fn cleared_access_token_cookie() -> String {
    Cookie::build((ACCESS_TOKEN_COOKIE, ""))
        .http_only(true)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
        .to_string()
}

/// First value of the named cookie across all `Cookie` headers
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_access_token_cookie_attributes() {
        let cookie = access_token_cookie("abc.def.ghi");
        assert!(cookie.starts_with("ACCESS_TOKEN=abc.def.ghi"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[test]
    fn test_cleared_cookie_expires_immediately() {
        let cookie = cleared_access_token_cookie();
        assert!(cookie.starts_with("ACCESS_TOKEN=;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_get_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; ACCESS_TOKEN=tok1"));
        headers.append(COOKIE, HeaderValue::from_static("ACCESS_TOKEN=tok2"));

        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE).as_deref(), Some("tok1"));
        assert_eq!(get_cookie(&headers, "theme").as_deref(), Some("dark"));
        assert_eq!(get_cookie(&headers, "missing"), None);
        assert_eq!(get_cookie(&HeaderMap::new(), ACCESS_TOKEN_COOKIE), None);
    }
}
