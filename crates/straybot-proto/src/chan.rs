//! Channel name helpers.

use std::borrow::Cow;

/// Channel name sigils recognized by the protocol.
pub const CHANNEL_SIGILS: [char; 4] = ['#', '&', '+', '!'];

/// Returns true if `name` begins with a channel sigil.
pub fn is_channel(name: &str) -> bool {
    name.chars().next().is_some_and(|c| CHANNEL_SIGILS.contains(&c))
}

/// Prepend `#` when `name` carries no channel sigil.
pub fn with_sigil(name: &str) -> Cow<'_, str> {
    if is_channel(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("#{name}"))
    }
}
