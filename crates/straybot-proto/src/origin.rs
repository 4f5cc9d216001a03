//! Message origin parsing.
//!
//! The origin of a server line is either a server name or a user mask in
//! `nick!user@host` form. This is a lenient parser: whatever shape the
//! server sends is classified, never rejected.

use std::fmt;

/// Who produced a protocol line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A server name (contains a dot, no user parts).
    Server(String),
    /// A user origin.
    User {
        /// Nickname.
        nick: String,
        /// Username (ident); may be empty.
        user: String,
        /// Hostname; may be empty.
        host: String,
    },
}

impl Origin {
    /// Parse an origin string.
    pub fn parse(s: &str) -> Self {
        if let Some(at_pos) = s.find('@') {
            let before = &s[..at_pos];
            let host = &s[at_pos + 1..];

            let (nick, user) = match before.find('!') {
                Some(bang) => (&before[..bang], &before[bang + 1..]),
                None => (before, ""),
            };

            Origin::User {
                nick: nick.to_string(),
                user: user.to_string(),
                host: host.to_string(),
            }
        } else if let Some(bang) = s.find('!') {
            Origin::User {
                nick: s[..bang].to_string(),
                user: s[bang + 1..].to_string(),
                host: String::new(),
            }
        } else if s.contains('.') {
            Origin::Server(s.to_string())
        } else {
            Origin::User {
                nick: s.to_string(),
                user: String::new(),
                host: String::new(),
            }
        }
    }

    /// The nickname, if this is a user origin.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Origin::User { nick, .. } if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// The hostname, for either origin kind.
    pub fn host(&self) -> Option<&str> {
        match self {
            Origin::Server(name) => Some(name),
            Origin::User { host, .. } if !host.is_empty() => Some(host),
            _ => None,
        }
    }

    /// The identity to address replies to: the nick for users, the server
    /// name otherwise.
    pub fn name(&self) -> &str {
        match self {
            Origin::Server(name) => name,
            Origin::User { nick, .. } => nick,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Server(name) => f.write_str(name),
            Origin::User { nick, user, host } => {
                f.write_str(nick)?;
                if !user.is_empty() {
                    write!(f, "!{user}")?;
                }
                if !host.is_empty() {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_mask() {
        let o = Origin::parse("alice!user@host.example.com");
        assert_eq!(o.nick(), Some("alice"));
        assert_eq!(o.host(), Some("host.example.com"));
        assert_eq!(o.name(), "alice");
    }

    #[test]
    fn test_parse_server_name() {
        let o = Origin::parse("irc.example.com");
        assert_eq!(o, Origin::Server("irc.example.com".to_string()));
        assert_eq!(o.nick(), None);
        assert_eq!(o.name(), "irc.example.com");
    }

    #[test]
    fn test_parse_bare_nick() {
        let o = Origin::parse("alice");
        assert_eq!(o.nick(), Some("alice"));
        assert_eq!(o.host(), None);
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["alice!user@host.com", "irc.example.com", "alice"] {
            assert_eq!(Origin::parse(raw).to_string(), raw);
        }
    }
}
