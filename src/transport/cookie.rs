//! Session cookie jar.
//!
//! RETS servers identify the session with a cookie (usually
//! `RETS-Session-ID`). Every cookie seen in a `Set-Cookie` header is replayed
//! on later requests until a newer value for the same name supersedes it.

use cookie::Cookie;
use time::{Duration, OffsetDateTime};

/// `Max-Age` wins over `Expires` when both are present.
fn is_expired(cookie: &Cookie<'_>) -> bool {
    match cookie.max_age() {
        Some(max_age) => max_age <= Duration::ZERO,
        None => cookie
            .expires_datetime()
            .is_some_and(|expires| expires <= OffsetDateTime::now_utc()),
    }
}

/// Name/value cookies in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one `Set-Cookie` value. Attributes (`path`, `HttpOnly`, ...) are dropped.
    ///
    /// A cookie that is already expired (`Max-Age` <= 0, or `Expires` in the
    /// past) removes any stored cookie of the same name. Returns the stored
    /// name, or `None` if nothing was stored.
    pub fn store(&mut self, set_cookie: &str) -> Option<&str> {
        let cookie = match Cookie::parse(set_cookie) {
            Ok(cookie) => cookie,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed Set-Cookie header");
                return None;
            },
        };
        let name = cookie.name();
        let value = cookie.value_trimmed();

        let position = self
            .cookies
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name));

        match (position, is_expired(&cookie)) {
            (Some(index), true) => {
                self.cookies.remove(index);
                None
            },
            (None, true) => None,
            (Some(index), false) => {
                self.cookies[index].1 = value.to_string();
                Some(self.cookies[index].0.as_str())
            },
            (None, false) => {
                self.cookies.push((name.to_string(), value.to_string()));
                self.cookies.last().map(|(n, _)| n.as_str())
            },
        }
    }

    /// Store every value of a `Set-Cookie` sequence.
    pub fn absorb<'a>(&mut self, set_cookies: impl IntoIterator<Item = &'a str>) {
        for value in set_cookies {
            self.store(value);
        }
    }

    /// Value of the cookie named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Cookie` request header value, or `None` when empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Forget every cookie.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Number of cookies held.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_are_stripped() {
        let mut jar = CookieJar::new();
        jar.absorb([
            "RETS-Session-ID=nhwbkuszwg2eck0evrhq5wsu; path=/",
            "ASP.NET_SessionId=abc; path=/; HttpOnly",
        ]);
        assert_eq!(jar.get("rets-session-id"), Some("nhwbkuszwg2eck0evrhq5wsu"));
        assert_eq!(
            jar.header_value().as_deref(),
            Some("RETS-Session-ID=nhwbkuszwg2eck0evrhq5wsu; ASP.NET_SessionId=abc")
        );
    }

    #[test]
    fn test_newer_value_supersedes() {
        let mut jar = CookieJar::new();
        jar.store("RETS-Session-ID=first; path=/");
        jar.store("RETS-Session-ID= second ; path=/");
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("RETS-Session-ID"), Some("second"));
    }

    #[test]
    fn test_max_age_zero_removes() {
        let mut jar = CookieJar::new();
        jar.store("a=1");
        jar.store("b=2");
        assert_eq!(jar.store("a=; Max-Age=0"), None);
        assert_eq!(jar.header_value().as_deref(), Some("b=2"));
    }

    #[test]
    fn test_quoted_value_is_unquoted() {
        let mut jar = CookieJar::new();
        jar.store(r#"RETS-Session-ID="abc123"; Path=/"#);
        assert_eq!(jar.get("RETS-Session-ID"), Some("abc123"));
        assert_eq!(jar.header_value().as_deref(), Some("RETS-Session-ID=abc123"));
    }

    #[test]
    fn test_past_expires_is_not_sent() {
        let mut jar = CookieJar::new();
        jar.store("RETS-Session-ID=s1; path=/");
        jar.store("OLD=x; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(jar.get("OLD"), None);
        assert_eq!(jar.header_value().as_deref(), Some("RETS-Session-ID=s1"));

        jar.store("LATER=y; Expires=Fri, 01 Jan 2100 00:00:00 GMT");
        assert_eq!(jar.get("LATER"), Some("y"));

        // Expiry on an existing name deletes it
        jar.store("RETS-Session-ID=; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(jar.header_value().as_deref(), Some("LATER=y"));
    }

    #[test]
    fn test_garbage_is_ignored() {
        let mut jar = CookieJar::new();
        assert_eq!(jar.store("no-equals-sign"), None);
        assert_eq!(jar.store("=value"), None);
        assert!(jar.is_empty());
        assert_eq!(jar.header_value(), None);
        jar.store("x=1");
        jar.clear();
        assert!(jar.is_empty());
    }
}
