//! Raw line → structured event parsing.
//!
//! One server line becomes one [`Event`]. Classification is best-effort
//! and never fails: malformed lines fall back to an event with an empty
//! payload, and numerics without a table entry keep their raw digit
//! string as the kind.

use crate::chan;
use crate::ctcp::{self, CtcpFrame, Dequoted};
use crate::numerics;
use crate::origin::Origin;

/// One parsed protocol occurrence, or a synthetic bus message.
///
/// Events are immutable after construction; the event bus hands them to
/// handlers by reference.
#[derive(Clone, Debug)]
pub struct Event {
    /// Event kind: a lowercased command name, a numeric-table name, a
    /// lowercased CTCP verb, or the raw numeric string for unknown codes.
    pub kind: String,
    /// Who produced the line, when the line carried an origin.
    pub origin: Option<Origin>,
    /// Channel the event applies to, when one could be determined.
    pub channel: Option<String>,
    /// Trailing free-text payload.
    pub text: String,
    /// Word tokens of the non-trailing portion, origin included.
    pub tokens: Vec<String>,
    /// The raw line as received, without the trailing newline.
    pub raw: String,
}

/// Characters that form a word token. The user part of a `nick!user@host`
/// origin starts a fresh token because `!` is not included, which is what
/// the positional classification below relies on.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '#' | '@' | '+' | '&')
}

fn tokenize(head: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in head.chars() {
        if is_token_char(c) {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

impl Event {
    /// Parse one raw server line.
    pub fn parse(line: &str) -> Event {
        let raw = line.trim_end_matches(['\r', '\n']).to_string();

        let had_origin = raw.starts_with(':');
        let rest = raw.strip_prefix(':').unwrap_or(&raw);

        let (head, trailing) = match rest.split_once(':') {
            Some((head, trailing)) => (head, trailing.to_string()),
            None => (rest, String::new()),
        };

        let tokens = tokenize(head);
        let mut text = trailing;
        let mut channel: Option<String> = None;

        let numeric = tokens
            .get(1)
            .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|t| t.parse::<u16>().ok());

        let mut kind = if tokens.first().is_some_and(|t| t.starts_with("PING")) {
            "ping".to_string()
        } else if let Some(code) = numeric {
            channel = tokens.get(3).cloned();
            match numerics::name_of(code) {
                Some(name) => name.to_string(),
                None => tokens[1].clone(),
            }
        } else {
            tokens
                .get(2)
                .or_else(|| tokens.get(1))
                .map(|t| t.to_ascii_lowercase())
                .unwrap_or_default()
        };

        let origin = if kind != "ping" && had_origin {
            head.split_whitespace().next().map(Origin::parse)
        } else {
            None
        };

        match kind.as_str() {
            // The joined channel arrives as the trailing payload rather
            // than a positional token; some servers send it bare.
            "join" => {
                if text.is_empty() {
                    channel = tokens.get(3).cloned();
                } else {
                    channel = Some(text.clone());
                }
            }
            "privmsg" | "notice" => {
                let target = tokens.get(3).map(String::as_str).unwrap_or("");
                if chan::is_channel(target) {
                    channel = Some(target.to_string());
                    if kind == "privmsg" {
                        kind = "pubmsg".to_string();
                    }
                }
            }
            _ if numeric.is_none() => {
                channel = tokens.get(3).filter(|t| chan::is_channel(t)).cloned();
            }
            _ => {}
        }

        // A CTCP payload reclassifies the event to its verb. Only the
        // first frame of a line is surfaced.
        if matches!(kind.as_str(), "privmsg" | "pubmsg") && ctcp::is_ctcp(&text) {
            match ctcp::dequote(&text) {
                Dequoted::Plain(plain) => text = plain,
                Dequoted::Frames(frames) => match frames.into_iter().next() {
                    Some(CtcpFrame::Tagged { verb, arg }) => {
                        kind = verb.to_ascii_lowercase();
                        text = arg;
                    }
                    Some(CtcpFrame::Raw(fragment)) => text = fragment,
                    None => {}
                },
            }
        }

        Event {
            kind,
            origin,
            channel,
            text,
            tokens,
            raw,
        }
    }

    /// Build a synthetic event for bus-internal notifications.
    pub fn synthetic(kind: impl Into<String>, text: impl Into<String>) -> Event {
        let kind = kind.into();
        let text = text.into();
        Event {
            raw: String::new(),
            origin: None,
            channel: None,
            tokens: Vec::new(),
            kind,
            text,
        }
    }

    /// Nick (or server name) that produced this event.
    pub fn from(&self) -> Option<&str> {
        self.origin.as_ref().map(|o| o.name())
    }

    /// On a nick-change event, the identity being given up.
    pub fn old_nick(&self) -> Option<&str> {
        if self.kind != "nick" {
            return None;
        }
        self.origin.as_ref().and_then(|o| o.nick())
    }

    /// On a nick-change event, the identity being claimed.
    pub fn new_nick(&self) -> Option<&str> {
        if self.kind != "nick" {
            return None;
        }
        Some(self.text.as_str())
    }
}
