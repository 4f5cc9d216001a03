//! Owner authentication and joined-channel state.
//!
//! Both tables are mutated exclusively from the connection loop via bus
//! handlers, so they carry no locking.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::error;

/// Hex-encoded SHA-256 of `input`.
pub fn hex_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// An authenticated controller identity. The nick is the table key and
/// tracks the user across nick changes; rights are never persisted.
#[derive(Clone, Debug)]
pub struct Owner {
    pub nick: String,
    digest: String,
    logged_in: bool,
}

impl Owner {
    pub fn new(nick: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            digest: digest.into(),
            logged_in: false,
        }
    }

    /// Compare `password` against the stored digest; marks the owner
    /// logged in on a match.
    pub fn try_login(&mut self, password: &str) -> bool {
        if hex_digest(password) == self.digest {
            self.logged_in = true;
        }
        self.logged_in
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }
}

/// Owner table keyed by current nick.
#[derive(Debug, Default)]
pub struct OwnerTable {
    owners: HashMap<String, Owner>,
}

impl OwnerTable {
    /// Build the table from `nick:hexdigest` entries. Entries whose digest
    /// is not 64 hex chars are skipped with a logged error; deciding
    /// whether an empty table is fatal is the caller's job.
    pub fn from_entries(entries: &[String]) -> Self {
        let mut owners = HashMap::new();
        for entry in entries {
            let Some((nick, digest)) = entry.split_once(':') else {
                error!(entry = %entry, "owner entry is not nick:digest");
                continue;
            };
            if !is_hex_digest(digest) {
                error!(nick = %nick, "owner password is not a sha256 hex digest; not added");
                continue;
            }
            owners.insert(nick.to_string(), Owner::new(nick, digest));
        }
        Self { owners }
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.owners.contains_key(nick)
    }

    /// True iff `nick` is a known owner who is currently logged in.
    pub fn is_owner(&self, nick: &str) -> bool {
        self.owners.get(nick).is_some_and(Owner::is_logged_in)
    }

    pub fn get_mut(&mut self, nick: &str) -> Option<&mut Owner> {
        self.owners.get_mut(nick)
    }

    /// Move an owner entry to a new nick. The login state travels with
    /// the entry; a later claimant of the old nick inherits nothing.
    pub fn rekey(&mut self, old: &str, new: &str) {
        if let Some(mut owner) = self.owners.remove(old) {
            owner.nick = new.to_string();
            self.owners.insert(new.to_string(), owner);
        }
    }

    /// Sorted nicks of currently logged-in owners.
    pub fn logged_in_nicks(&self) -> Vec<String> {
        let mut nicks: Vec<String> = self
            .owners
            .values()
            .filter(|o| o.is_logged_in())
            .map(|o| o.nick.clone())
            .collect();
        nicks.sort();
        nicks
    }
}

/// A joined room.
#[derive(Clone, Debug)]
pub struct Channel {
    pub name: String,
    pub topic: Option<String>,
    pub members: Vec<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: None,
            members: Vec::new(),
        }
    }

    pub fn add_member(&mut self, nick: &str) {
        if !self.members.iter().any(|m| m == nick) {
            self.members.push(nick.to_string());
        }
    }

    pub fn remove_member(&mut self, nick: &str) {
        self.members.retain(|m| m != nick);
    }
}

/// The bot's joined channels, created on join and destroyed on part.
#[derive(Debug, Default)]
pub struct ChannelList {
    channels: Vec<Channel>,
}

impl ChannelList {
    pub fn join(&mut self, name: &str) {
        if self.get(name).is_none() {
            self.channels.push(Channel::new(name));
        }
    }

    pub fn part(&mut self, name: &str) {
        self.channels.retain(|c| c.name != name);
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn remove_member_everywhere(&mut self, nick: &str) {
        for channel in &mut self.channels {
            channel.remove_member(nick);
        }
    }

    pub fn rename_member(&mut self, old: &str, new: &str) {
        for channel in &mut self.channels {
            if channel.members.iter().any(|m| m == old) {
                channel.remove_member(old);
                channel.add_member(new);
            }
        }
    }
}
