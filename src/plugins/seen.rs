//! "Last seen" tracker.
//!
//! Records the last message or action per nick in watched channels and
//! answers `seen <nick>` with where, when and what. The record survives
//! restarts through a JSON storage file, flushed on every update and
//! again from the stop hook.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::commands::command_args;
use crate::plugin::Plugin;

const HELP: &str =
    "{cmd}seen <nick> -- Displays the last time 'nick' was seen in watched channels.";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SeenEntry {
    nick: String,
    channel: String,
    timestamp: DateTime<Utc>,
    text: String,
    action: bool,
}

impl SeenEntry {
    fn describe(&self) -> String {
        let local = self.timestamp.with_timezone(&Local);
        let date = local.format("%b, %d %Y");
        let time = local.format("%I:%M%P");
        if self.action {
            format!(
                "{} last seen in {} on {} at {} doing: {} {}",
                self.nick, self.channel, date, time, self.nick, self.text
            )
        } else {
            format!(
                "{} last seen in {} on {} at {} saying: {}",
                self.nick, self.channel, date, time, self.text
            )
        }
    }
}

struct SeenStore {
    file: PathBuf,
    users: RefCell<HashMap<String, SeenEntry>>,
    ignore: Vec<String>,
}

impl SeenStore {
    fn load(file: PathBuf, ignore: Vec<String>) -> Self {
        let users = std::fs::read_to_string(&file)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            file,
            users: RefCell::new(users),
            ignore,
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(&*self.users.borrow())?;
        std::fs::write(&self.file, content)
            .with_context(|| format!("writing {}", self.file.display()))
    }

    fn record(&self, nick: &str, channel: &str, text: &str, action: bool) -> anyhow::Result<()> {
        // channels are stored without their sigil, matching the ignore list
        let channel = channel.trim_start_matches(['#', '&']);
        if self.ignore.iter().any(|ignored| ignored == channel) {
            return Ok(());
        }
        self.users.borrow_mut().insert(
            nick.to_string(),
            SeenEntry {
                nick: nick.to_string(),
                channel: channel.to_string(),
                timestamp: Utc::now(),
                text: text.to_string(),
                action,
            },
        );
        self.save()
    }

    fn lookup(&self, nick: &str) -> Option<SeenEntry> {
        self.users.borrow().get(nick).cloned()
    }
}

pub fn plugin() -> Plugin {
    // shared between the start and stop hooks so stop can flush
    let slot: Rc<RefCell<Option<Rc<SeenStore>>>> = Rc::new(RefCell::new(None));
    let started = Rc::clone(&slot);

    Plugin::new("seen")
        .author("Randy")
        .version("0.3")
        .on_start(move |bot, conf| {
            let file = bot.storage_path(&conf.get_str("file", "seendata.json"));
            let ignore: Vec<String> = conf
                .get_list("ignore")
                .into_iter()
                .map(|ch| ch.trim_start_matches(['#', '&']).to_string())
                .collect();
            let store = Rc::new(SeenStore::load(file, ignore));
            *started.borrow_mut() = Some(Rc::clone(&store));

            let watcher = Rc::clone(&store);
            bot.add_handler(Some("seen"), &["pubmsg", "action"], move |_bot, event| {
                let (Some(nick), Some(channel)) = (event.from(), event.channel.as_deref())
                else {
                    return Ok(());
                };
                watcher.record(nick, channel, &event.text, event.kind == "action")
            });

            let reader = Rc::clone(&store);
            bot.add_command(Some("seen"), "seen", false, false, HELP, move |bot, event| {
                let nick = command_args(event);
                let nick = nick.trim();
                let message = if nick.is_empty() {
                    "I need a name to look up.".to_string()
                } else {
                    match reader.lookup(nick) {
                        Some(entry) => entry.describe(),
                        None => format!("Unknown user: {nick}"),
                    }
                };
                bot.reply(event, &message);
                Ok(())
            });

            Ok(())
        })
        .on_stop(move |_bot| {
            if let Some(store) = slot.borrow().as_ref() {
                store.save()?;
            }
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testutil::{drain, pubmsg, test_bot_in};

    fn seen_bot() -> (
        crate::bot::Bot,
        tokio::sync::mpsc::UnboundedReceiver<String>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let (bot, rx) = test_bot_in(dir.path());
        (bot, rx, dir)
    }

    #[test]
    fn test_record_and_lookup() {
        let (mut bot, mut rx, _dir) = seen_bot();
        bot.load_plugin("seen").unwrap();

        bot.dispatch(&pubmsg("alice", "#lab", "anyone around?"));
        bot.on_message(&pubmsg("bob", "#lab", "!seen alice"));
        let line = drain(&mut rx).pop().unwrap();
        assert!(line.contains("alice last seen in lab"));
        assert!(line.contains("saying: anyone around?"));
    }

    #[test]
    fn test_action_phrasing() {
        let (mut bot, mut rx, _dir) = seen_bot();
        bot.load_plugin("seen").unwrap();

        bot.dispatch(&pubmsg("alice", "#lab", "\x01ACTION waves\x01"));
        bot.on_message(&pubmsg("bob", "#lab", "!seen alice"));
        let line = drain(&mut rx).pop().unwrap();
        assert!(line.contains("doing: alice waves"));
    }

    #[test]
    fn test_unknown_nick() {
        let (mut bot, mut rx, _dir) = seen_bot();
        bot.load_plugin("seen").unwrap();

        bot.on_message(&pubmsg("bob", "#lab", "!seen ghost"));
        assert!(drain(&mut rx)[0].contains("Unknown user: ghost"));
    }

    #[test]
    fn test_storage_survives_reload() {
        let (mut bot, mut rx, _dir) = seen_bot();
        bot.load_plugin("seen").unwrap();

        bot.dispatch(&pubmsg("alice", "#lab", "remember me"));
        bot.reload_plugin("seen").unwrap();

        bot.on_message(&pubmsg("bob", "#lab", "!seen alice"));
        assert!(drain(&mut rx).pop().unwrap().contains("remember me"));
    }

    #[test]
    fn test_ignored_channels_are_not_recorded() {
        let (mut bot, mut rx, _dir) = seen_bot();
        std::fs::write(
            bot.config_dir().join("seen.toml"),
            "ignore = [\"#void\"]\n",
        )
        .unwrap();
        bot.load_plugin("seen").unwrap();

        bot.dispatch(&pubmsg("alice", "#void", "into the void"));
        bot.on_message(&pubmsg("bob", "#lab", "!seen alice"));
        assert!(drain(&mut rx)[0].contains("Unknown user: alice"));
    }
}
