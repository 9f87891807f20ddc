//! Canonical request keys.
//!
//! A key is the plain concatenation of method, path and query with no
//! delimiter. A request without a query string uses the literal `NULL` in its
//! place, so `GET /a/` becomes `GET/a/NULL`.

use std::fmt;

/// Query placeholder for requests without a `?`.
pub const NO_QUERY: &str = "NULL";

/// A key that could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The concatenation would exceed the configured limit.
    #[error("request key would be {len} bytes, limit is {max}")]
    TooLong {
        /// Length the key would have had.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// The canonical signature of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    /// Concatenate `method`, `path` and `query` into a key of at most
    /// `max_len` bytes.
    ///
    /// `query` is taken without its leading `?`; `None` stands for "no query"
    /// and is written as [`NO_QUERY`].
    pub fn from_parts(
        method: &str,
        path: &str,
        query: Option<&str>,
        max_len: usize,
    ) -> Result<Self, KeyError> {
        let query = query.unwrap_or(NO_QUERY);
        let len = method.len() + path.len() + query.len();
        if len > max_len {
            return Err(KeyError::TooLong { len, max: max_len });
        }

        let mut key = String::with_capacity(len);
        key.push_str(method);
        key.push_str(path);
        key.push_str(query);
        Ok(Self(key))
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the key text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a request URI into path and query at the first `?`.
pub fn split_uri(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}

/// Bring a query as written in the whitelist file to the form used in keys.
///
/// Empty fields and the `NULL` placeholder mean "no query"; a leading `?` is
/// dropped.
pub fn normalize_query(raw: &str) -> Option<&str> {
    if raw.is_empty() || raw == NO_QUERY {
        return None;
    }
    Some(raw.strip_prefix('?').unwrap_or(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_query_uses_placeholder() {
        let key = RequestKey::from_parts("GET", "/a/", None, 64).unwrap();
        assert_eq!(key.as_str(), "GET/a/NULL");
    }

    #[test]
    fn query_is_appended_without_delimiter() {
        let (path, query) = split_uri("/search?q=rust&page=2");
        assert_eq!(path, "/search");
        let key = RequestKey::from_parts("POST", path, query, 64).unwrap();
        assert_eq!(key.as_str(), "POST/searchq=rust&page=2");
    }

    #[test]
    fn splits_at_first_question_mark_only() {
        assert_eq!(split_uri("/a?b?c"), ("/a", Some("b?c")));
        assert_eq!(split_uri("/a?"), ("/a", Some("")));
        assert_eq!(split_uri("/a"), ("/a", None));
    }

    #[test]
    fn overlong_key_is_rejected_not_truncated() {
        let err = RequestKey::from_parts("GET", "/abcdef", None, 10).unwrap_err();
        assert_eq!(err, KeyError::TooLong { len: 14, max: 10 });

        assert!(RequestKey::from_parts("GET", "/abc", None, 11).is_ok());
    }

    #[test]
    fn file_queries_normalize_to_request_form() {
        assert_eq!(normalize_query("NULL"), None);
        assert_eq!(normalize_query(""), None);
        assert_eq!(normalize_query("?id=4"), Some("id=4"));
        assert_eq!(normalize_query("id=4"), Some("id=4"));
    }
}
