//! The !command router.
//!
//! Sits on top of the event bus: a core handler feeds message events in,
//! the router detects the command sigil, applies owner/private gating and
//! dispatches. A faulting command is contained here; the invoker only
//! ever sees a generic failure notice.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::error;

use straybot_proto::Event;

use crate::bot::Bot;
use crate::events::panic_message;

/// A command handler callback.
pub type CommandFn = dyn Fn(&mut Bot, &Event) -> anyhow::Result<()>;

/// A named, invokable action.
#[derive(Clone)]
pub struct Command {
    pub owner_only: bool,
    pub private_only: bool,
    help: String,
    alias_for: Option<String>,
    handler: Rc<CommandFn>,
}

impl Command {
    pub fn new(
        owner_only: bool,
        private_only: bool,
        help: impl Into<String>,
        handler: Rc<CommandFn>,
    ) -> Self {
        Self {
            owner_only,
            private_only,
            help: help.into(),
            alias_for: None,
            handler,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.alias_for.is_some()
    }

    pub fn alias_target(&self) -> Option<&str> {
        self.alias_for.as_deref()
    }

    /// Render help text, substituting the bot's name for `{bot}` and the
    /// first configured sigil for `{cmd}`.
    pub fn help(&self, bot_name: &str, sigil: char) -> String {
        self.help
            .replace("{bot}", bot_name)
            .replace("{cmd}", &sigil.to_string())
    }

    fn handler(&self) -> Rc<CommandFn> {
        Rc::clone(&self.handler)
    }
}

/// Outcome of an alias-removal request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AliasRemoval {
    Removed,
    /// The name exists but is an original, which this path never removes.
    NotAlias,
    Unknown,
}

/// Command name → command table. Names are case-folded; inserting an
/// existing name overwrites it.
#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<String, Command>,
}

impl CommandTable {
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(&name.to_ascii_lowercase())
    }

    pub fn insert(&mut self, name: &str, command: Command) {
        self.commands.insert(name.to_ascii_lowercase(), command);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.commands.remove(&name.to_ascii_lowercase()).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_ascii_lowercase())
    }

    /// Sorted command names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Duplicate `old` under `new`, marked as an alias pointing at `old`.
    /// Aliasing an alias produces a copy of the alias. False when `old`
    /// is unknown.
    pub fn alias(&mut self, old: &str, new: &str) -> bool {
        let old = old.to_ascii_lowercase();
        let Some(command) = self.commands.get(&old) else {
            return false;
        };
        let mut copy = command.clone();
        copy.alias_for = Some(old);
        self.commands.insert(new.to_ascii_lowercase(), copy);
        true
    }

    /// Remove `name` only if it is currently an alias.
    pub fn remove_alias(&mut self, name: &str) -> AliasRemoval {
        let name = name.to_ascii_lowercase();
        match self.commands.get(&name) {
            Some(command) if command.is_alias() => {
                self.commands.remove(&name);
                AliasRemoval::Removed
            }
            Some(_) => AliasRemoval::NotAlias,
            None => AliasRemoval::Unknown,
        }
    }
}

/// Strip the command word off an event's text, leaving the argument
/// string. For command handlers, not event handlers.
pub fn command_args(event: &Event) -> String {
    match event.text.trim().split_once(char::is_whitespace) {
        Some((_cmd, args)) => args.trim().to_string(),
        None => String::new(),
    }
}

impl Bot {
    /// Entry point for message events: detect a leading sigil and route
    /// the command. Non-command messages are ignored.
    pub(crate) fn on_message(&mut self, event: &Event) {
        let text = event.text.trim();
        let Some(first) = text.chars().next() else {
            return;
        };
        if !self.sigils.contains(&first) {
            return;
        }
        let rest = &text[first.len_utf8()..];
        let name = rest
            .split_once(char::is_whitespace)
            .map_or(rest, |(name, _)| name);
        if name.is_empty() {
            return;
        }
        self.handle_command(&name.to_ascii_lowercase(), event);
    }

    /// Gate and dispatch one command invocation. Returns false only on a
    /// lookup miss, which is deliberately silent.
    pub(crate) fn handle_command(&mut self, name: &str, event: &Event) -> bool {
        let Some(command) = self.commands.get(name).cloned() else {
            return false;
        };

        if command.owner_only && !self.is_owner(event.from().unwrap_or("")) {
            let who = event.from().unwrap_or("stranger");
            self.reply(event, &format!("Sorry, {who}, but you are not my owner."));
            return true;
        }

        if command.private_only && event.kind == "pubmsg" {
            self.reply(
                event,
                &format!("{name} is a private-message only command!"),
            );
            return true;
        }

        let handler = command.handler();
        match catch_unwind(AssertUnwindSafe(|| handler(self, event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(command = %name, error = ?err, "command failed");
                self.reply(
                    event,
                    &format!("There was an error running the {name} command. Check the logs."),
                );
            }
            Err(payload) => {
                error!(
                    command = %name,
                    panic = %panic_message(payload.as_ref()),
                    "command panicked"
                );
                self.reply(
                    event,
                    &format!("There was an error running the {name} command. Check the logs."),
                );
            }
        }
        true
    }
}
