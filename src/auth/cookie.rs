//! Refresh-token cookie handling

use axum::http::{header, HeaderMap};

pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Set-Cookie value carrying a refresh token
pub fn refresh_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=None; Max-Age={}",
        REFRESH_COOKIE_NAME, token, max_age_secs
    )
}

/// Set-Cookie value that clears the refresh cookie with matching attributes
pub fn clear_refresh_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; Secure; SameSite=None; Max-Age=0",
        REFRESH_COOKIE_NAME
    )
}

/// Find a cookie value across all Cookie headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie("abc123", 604800);
        assert!(cookie.starts_with("refreshToken=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.ends_with("Max-Age=604800"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie();
        assert!(cookie.starts_with("refreshToken=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("SameSite=None"));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("session=1; refreshToken=deadbeef"),
        );

        assert_eq!(read_cookie(&headers, REFRESH_COOKIE_NAME), Some("deadbeef"));
        assert_eq!(read_cookie(&headers, "theme"), Some("dark"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_cookie_value_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("refreshToken="));
        assert_eq!(read_cookie(&headers, REFRESH_COOKIE_NAME), None);
    }
}
