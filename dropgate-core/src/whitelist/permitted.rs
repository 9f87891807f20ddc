//! Compact sets of server tokens.

use std::fmt;
use std::sync::Arc;

use crate::domain::candidate::ServerToken;

/// The token meaning "no server may serve this request".
pub const BLOCK_ALL: ServerToken = '0';

/// The servers allowed to handle one request key, stored as a string of
/// distinct tokens in the order they were first written.
///
/// Cloning is a reference-count bump, so lookups can hand out owned values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermittedServers(Arc<str>);

impl PermittedServers {
    /// Parse a compact token string such as `"12"`.
    ///
    /// Whitespace and commas are ignored and repeated tokens are kept once.
    /// Returns `None` when no token remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut tokens = String::with_capacity(raw.len());
        for token in raw.chars() {
            if token.is_whitespace() || token == ',' || tokens.contains(token) {
                continue;
            }
            tokens.push(token);
        }

        if tokens.is_empty() {
            None
        } else {
            Some(Self(tokens.into()))
        }
    }

    /// Whether `token` is in the set.
    pub fn contains(&self, token: ServerToken) -> bool {
        self.0.contains(token)
    }

    /// Whether the set carries the block-all sentinel.
    pub fn blocks_all(&self) -> bool {
        self.contains(BLOCK_ALL)
    }

    /// Iterate the tokens.
    pub fn tokens(&self) -> impl Iterator<Item = ServerToken> + '_ {
        self.0.chars()
    }

    /// The compact token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermittedServers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_and_separated_forms() {
        let compact = PermittedServers::parse("12").unwrap();
        let separated = PermittedServers::parse("1, 2").unwrap();
        assert_eq!(compact, separated);
        assert!(compact.contains('1'));
        assert!(compact.contains('2'));
        assert!(!compact.contains('3'));
    }

    #[test]
    fn repeated_tokens_collapse() {
        let servers = PermittedServers::parse("3113").unwrap();
        assert_eq!(servers.as_str(), "31");
        assert_eq!(servers.tokens().collect::<Vec<_>>(), vec!['3', '1']);
    }

    #[test]
    fn empty_input_is_not_a_set() {
        assert!(PermittedServers::parse("").is_none());
        assert!(PermittedServers::parse(" , ").is_none());
    }

    #[test]
    fn zero_blocks_everything() {
        assert!(PermittedServers::parse("0").unwrap().blocks_all());
        assert!(!PermittedServers::parse("12").unwrap().blocks_all());
    }
}
