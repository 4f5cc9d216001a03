//! CTCP (Client-to-Client Protocol) quoting and framing.
//!
//! CTCP messages ride inside PRIVMSG/NOTICE bodies between `\x01`
//! delimiters. Two quoting layers apply, in order: a low-level escape for
//! the bytes that cannot appear in an IRC line (NUL, LF, CR and the escape
//! character itself), then the `\x01` frame wrap. Dequoting reverses them
//! in reverse order.
//!
//! # Reference
//! - CTCP specification: <https://modern.ircdocs.horse/ctcp.html>
//!
//! # Example
//!
//! ```
//! use straybot_proto::ctcp::{dequote, quote, CtcpFrame, Dequoted};
//!
//! let wire = quote("ACTION waves hello");
//! assert_eq!(wire, "\x01ACTION waves hello\x01");
//!
//! let frames = match dequote(&wire) {
//!     Dequoted::Frames(frames) => frames,
//!     Dequoted::Plain(_) => unreachable!(),
//! };
//! assert_eq!(
//!     frames,
//!     vec![CtcpFrame::Tagged {
//!         verb: "ACTION".to_string(),
//!         arg: "waves hello".to_string(),
//!     }]
//! );
//! ```

/// The CTCP frame delimiter (`\x01`).
pub const CTCP_DELIM: char = '\x01';

/// The low-level quote (escape) character (`\x10`).
pub const LOW_LEVEL_QUOTE: char = '\x10';

/// One parsed CTCP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CtcpFrame {
    /// A `VERB argument` frame; the argument may be empty.
    Tagged {
        /// The CTCP verb, as it appeared on the wire.
        verb: String,
        /// Everything after the first whitespace.
        arg: String,
    },
    /// An unterminated trailing fragment, kept raw with its leading
    /// delimiter re-attached.
    Raw(String),
}

/// Result of dequoting a message payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dequoted {
    /// No CTCP framing present; the low-level-dequoted text.
    Plain(String),
    /// One or more CTCP frames.
    Frames(Vec<CtcpFrame>),
}

/// Returns true iff the delimiter occurs anywhere in `text`.
pub fn is_ctcp(text: &str) -> bool {
    text.contains(CTCP_DELIM)
}

/// Apply low-level quoting to `text`.
fn low_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\0' => {
                out.push(LOW_LEVEL_QUOTE);
                out.push('0');
            }
            '\n' => {
                out.push(LOW_LEVEL_QUOTE);
                out.push('n');
            }
            '\r' => {
                out.push(LOW_LEVEL_QUOTE);
                out.push('r');
            }
            LOW_LEVEL_QUOTE => {
                out.push(LOW_LEVEL_QUOTE);
                out.push(LOW_LEVEL_QUOTE);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Reverse low-level quoting.
///
/// An escape character followed by an unrecognized code is passed through
/// unchanged, so unknown pairs survive a dequote losslessly.
fn low_dequote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != LOW_LEVEL_QUOTE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(LOW_LEVEL_QUOTE) => out.push(LOW_LEVEL_QUOTE),
            Some(other) => {
                out.push(LOW_LEVEL_QUOTE);
                out.push(other);
            }
            None => out.push(LOW_LEVEL_QUOTE),
        }
    }
    out
}

/// Quote `message` into a wire-ready CTCP payload: low-level quoting first,
/// then the delimiter wrap.
pub fn quote(message: &str) -> String {
    format!("\x01{}\x01", low_quote(message))
}

/// Dequote a message payload.
///
/// Low-level quoting is reversed first. If the delimiter is present the
/// text is split on it, empty fragments are discarded, and each surviving
/// fragment becomes a `(verb, argument)` frame split on the first
/// whitespace. An odd number of delimiters means the final frame never
/// closed; that fragment is retained raw, re-prefixed with the delimiter.
pub fn dequote(message: &str) -> Dequoted {
    let text = low_dequote(message);

    if !text.contains(CTCP_DELIM) {
        return Dequoted::Plain(text);
    }

    let unterminated = text.matches(CTCP_DELIM).count() % 2 == 1;
    let parts: Vec<&str> = text
        .split(CTCP_DELIM)
        .filter(|part| !part.is_empty())
        .collect();

    let mut frames = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        if unterminated && i == parts.len() - 1 {
            frames.push(CtcpFrame::Raw(format!("\x01{part}")));
        } else {
            let (verb, arg) = match part.split_once(char::is_whitespace) {
                Some((verb, arg)) => (verb, arg),
                None => (*part, ""),
            };
            frames.push(CtcpFrame::Tagged {
                verb: verb.to_string(),
                arg: arg.to_string(),
            });
        }
    }

    Dequoted::Frames(frames)
}
