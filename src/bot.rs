//! The bot runtime context.
//!
//! One `Bot` owns every mutable table: the command table, the plugin
//! runtime, the owner table, the channel list and the event bus. All of
//! it is threaded explicitly through handlers; nothing lives in globals.
//! This file wires the built-in handlers and commands; the mechanics
//! live in the sibling modules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use straybot_proto::{chan, Event};

use crate::client::{Outbound, RECONNECT_BACKOFF};
use crate::commands::{command_args, AliasRemoval, Command, CommandTable};
use crate::config::Config;
use crate::events::{EventBus, HandlerFn, HandlerId};
use crate::plugin::PluginRuntime;
use crate::state::{ChannelList, OwnerTable};

/// Bot version, reported by the version command.
pub const BOT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Callback invoked for each line arriving on a plugin-registered stream.
pub type StreamFn = dyn Fn(&mut Bot, &str) -> anyhow::Result<()>;

/// Handle plugins use to feed lines into the connection loop's multiplex.
#[derive(Clone)]
pub struct LineSource {
    name: String,
    tx: mpsc::UnboundedSender<(String, String)>,
}

impl LineSource {
    /// Queue one line; it is handed to the stream's callback on the loop.
    pub fn push(&self, line: impl Into<String>) {
        let _ = self.tx.send((self.name.clone(), line.into()));
    }
}

/// The runtime context threaded through every handler and command.
pub struct Bot {
    pub config: Config,
    pub nick: String,
    pub realname: String,
    pub server: String,
    pub port: u16,
    /// Leading characters that mark a message as a command invocation.
    pub sigils: Vec<char>,
    pub out: Outbound,
    pub bus: EventBus,
    pub commands: CommandTable,
    pub plugins: PluginRuntime,
    pub owners: OwnerTable,
    pub channels: ChannelList,
    pub(crate) backoff: Duration,
    config_dir: PathBuf,
    store_dir: PathBuf,
    quit: bool,
    aux_tx: mpsc::UnboundedSender<(String, String)>,
    aux_rx: Option<mpsc::UnboundedReceiver<(String, String)>>,
    streams: HashMap<String, Rc<StreamFn>>,
}

impl Bot {
    /// Build the bot from its main config scope. Fatal when the config
    /// names no server or yields zero valid owners.
    pub fn new(config: Config, config_dir: PathBuf, out: Outbound) -> anyhow::Result<Bot> {
        let owners = OwnerTable::from_entries(&config.get_list("owner"));
        if owners.is_empty() {
            anyhow::bail!(
                "there are no usable owners in {} - refusing to start",
                config.path().display()
            );
        }

        let server = config.get_str("server", "");
        if server.is_empty() {
            anyhow::bail!("no server configured in {}", config.path().display());
        }

        let nick = config.get_str("nick", "straybot");
        let realname = config.get_str("realname", &nick);
        let port = config.get_u16("port", 6667);
        let sigils: Vec<char> = config
            .get_str("command", "!")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let store_dir = PathBuf::from(config.get_str("store", "store"));

        let (aux_tx, aux_rx) = mpsc::unbounded_channel();
        let mut bot = Bot {
            config,
            nick,
            realname,
            server,
            port,
            sigils,
            out,
            bus: EventBus::new(),
            commands: CommandTable::default(),
            plugins: PluginRuntime::default(),
            owners,
            channels: ChannelList::default(),
            backoff: RECONNECT_BACKOFF,
            config_dir,
            store_dir,
            quit: false,
            aux_tx,
            aux_rx: Some(aux_rx),
            streams: HashMap::new(),
        };

        bot.install_handlers();
        bot.install_commands();
        crate::plugins::register_all(&mut bot);
        Ok(bot)
    }

    // ------------------------------------------------------------------
    // Registration API (consumed by the core and by plugins)
    // ------------------------------------------------------------------

    /// Register a command. `owner` names the owning plugin, or `None` for
    /// the core. Plugin-owned registrations are recorded for cleanup on
    /// stop; names shorter than two characters are rejected.
    pub fn add_command(
        &mut self,
        owner: Option<&str>,
        name: &str,
        owner_only: bool,
        private_only: bool,
        help: &str,
        handler: impl Fn(&mut Bot, &Event) -> anyhow::Result<()> + 'static,
    ) -> bool {
        let name = name.to_ascii_lowercase();
        if name.len() < 2 {
            error!(command = %name, "command names must be at least 2 characters");
            return false;
        }
        if let Some(owner) = owner {
            let owner = owner.to_ascii_lowercase();
            let Some(entry) = self.plugins.entry_mut(&owner) else {
                error!(plugin = %owner, "add_command from unknown plugin");
                return false;
            };
            entry.commands.push(name.clone());
        }
        self.commands.insert(
            &name,
            Command::new(owner_only, private_only, help, Rc::new(handler)),
        );
        true
    }

    /// Remove a command by name.
    pub fn remove_command(&mut self, name: &str) -> bool {
        self.commands.remove(name)
    }

    /// Subscribe a handler to one or more topics, auto-creating them.
    /// Plugin-owned handlers are recorded for cleanup on stop.
    pub fn add_handler(
        &mut self,
        owner: Option<&str>,
        topics: &[&str],
        handler: impl Fn(&mut Bot, &Event) -> anyhow::Result<()> + 'static,
    ) -> Vec<HandlerId> {
        let handler: Rc<HandlerFn> = Rc::new(handler);
        let mut ids = Vec::with_capacity(topics.len());
        for topic in topics {
            let id = self.bus.observe(topic, Rc::clone(&handler));
            if let Some(owner) = owner {
                if let Some(entry) = self.plugins.entry_mut(&owner.to_ascii_lowercase()) {
                    entry.handlers.push(((*topic).to_string(), id));
                } else {
                    error!(plugin = %owner, "add_handler from unknown plugin");
                }
            }
            ids.push(id);
        }
        ids
    }

    /// Remove one event handler.
    pub fn remove_handler(&mut self, topic: &str, id: HandlerId) -> bool {
        self.bus.unobserve(topic, id)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Parse one raw server line and dispatch the resulting event.
    pub fn handle_line(&mut self, line: &str) {
        let event = Event::parse(line);
        debug!(kind = %event.kind, raw = %event.raw, "inbound");
        self.dispatch(&event);
    }

    /// Route an event to the bus under its kind.
    pub fn dispatch(&mut self, event: &Event) {
        if event.kind.is_empty() {
            return;
        }
        self.bus.create(&event.kind);
        if let Err(err) = self.emit(&event.kind, event) {
            error!(kind = %event.kind, error = %err, "dispatch failed");
        }
    }

    /// Hand a plugin-stream line to its registered callback.
    pub(crate) fn handle_aux_line(&mut self, source: &str, line: &str) {
        let Some(callback) = self.streams.get(source).cloned() else {
            debug!(source = %source, "line from unregistered stream");
            return;
        };
        if let Err(err) = callback(self, line) {
            error!(source = %source, error = ?err, "stream callback failed");
        }
    }

    /// Register an auxiliary line source multiplexed into the connection
    /// loop alongside the server socket.
    pub fn register_stream(
        &mut self,
        name: &str,
        callback: impl Fn(&mut Bot, &str) -> anyhow::Result<()> + 'static,
    ) -> LineSource {
        self.streams.insert(name.to_string(), Rc::new(callback));
        LineSource {
            name: name.to_string(),
            tx: self.aux_tx.clone(),
        }
    }

    /// Deregister an auxiliary line source; queued lines are dropped.
    pub fn deregister_stream(&mut self, name: &str) -> bool {
        self.streams.remove(name).is_some()
    }

    pub(crate) fn take_aux_rx(&mut self) -> mpsc::UnboundedReceiver<(String, String)> {
        self.aux_rx
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1)
    }

    // ------------------------------------------------------------------
    // Replies, storage, shutdown
    // ------------------------------------------------------------------

    /// Answer the event where it came from: the channel for channel
    /// messages, the sender otherwise. Replies go out as notices.
    pub fn reply(&self, event: &Event, message: &str) {
        if event.kind == "pubmsg" {
            if let Some(channel) = &event.channel {
                self.out.notice(channel, message);
                return;
            }
        }
        if let Some(from) = event.from() {
            self.out.notice(from, message);
        }
    }

    /// Like [`Bot::reply`], for actions.
    pub fn action(&self, event: &Event, message: &str) {
        if event.kind == "pubmsg" {
            if let Some(channel) = &event.channel {
                self.out.action(channel, message);
                return;
            }
        }
        if let Some(from) = event.from() {
            self.out.action(from, message);
        }
    }

    /// True iff `nick` is a currently-authenticated owner.
    pub fn is_owner(&self, nick: &str) -> bool {
        self.owners.is_owner(nick)
    }

    /// Directory plugin config scopes are resolved against.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Absolute path of a named storage file under the bot's storage root.
    pub fn storage_path(&self, name: &str) -> PathBuf {
        self.store_dir.join(name)
    }

    /// Open a storage file, `None` (not a fault) when the open fails.
    /// The handle closes on drop, whatever the exit path.
    pub fn storage_file(&self, name: &str, writable: bool) -> Option<std::fs::File> {
        let path = self.storage_path(name);
        let result = if writable {
            std::fs::File::create(&path)
        } else {
            std::fs::File::open(&path)
        };
        match result {
            Ok(file) => Some(file),
            Err(err) => {
                error!(file = %path.display(), error = %err, "storage file error");
                None
            }
        }
    }

    /// Graceful shutdown: stop hooks flush, the farewell goes out, and
    /// the connection loop stops at its next iteration.
    pub fn shutdown(&mut self, farewell: &str) {
        self.unload_all_plugins();
        self.out.quit(farewell);
        self.quit = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    // ------------------------------------------------------------------
    // Built-in handlers
    // ------------------------------------------------------------------

    fn install_handlers(&mut self) {
        // keep-alive probes are answered before anything else sees them
        self.add_handler(None, &["ping"], |bot, event| {
            bot.out.send_line(format!("PONG :{}", event.text));
            Ok(())
        });

        self.add_handler(None, &["pubmsg", "privmsg"], |bot, event| {
            bot.on_message(event);
            Ok(())
        });

        self.add_handler(None, &["nick"], |bot, event| {
            if let (Some(old), Some(new)) = (event.old_nick(), event.new_nick()) {
                let (old, new) = (old.to_string(), new.to_string());
                bot.owners.rekey(&old, &new);
                bot.channels.rename_member(&old, &new);
                if old == bot.nick {
                    bot.nick = new;
                }
            }
            Ok(())
        });

        // covers both the TOPIC command and numeric 332
        self.add_handler(None, &["topic"], |bot, event| {
            if let Some(name) = &event.channel {
                if let Some(channel) = bot.channels.get_mut(name) {
                    channel.topic = Some(event.text.clone());
                }
            }
            Ok(())
        });

        self.add_handler(None, &["join"], |bot, event| {
            let Some(name) = event.channel.clone() else {
                return Ok(());
            };
            match event.from() {
                Some(nick) if nick == bot.nick => bot.channels.join(&name),
                Some(nick) => {
                    let nick = nick.to_string();
                    if let Some(channel) = bot.channels.get_mut(&name) {
                        channel.add_member(&nick);
                    }
                }
                None => {}
            }
            Ok(())
        });

        self.add_handler(None, &["part"], |bot, event| {
            let Some(name) = event.channel.clone() else {
                return Ok(());
            };
            match event.from() {
                Some(nick) if nick == bot.nick => bot.channels.part(&name),
                Some(nick) => {
                    let nick = nick.to_string();
                    if let Some(channel) = bot.channels.get_mut(&name) {
                        channel.remove_member(&nick);
                    }
                }
                None => {}
            }
            Ok(())
        });

        self.add_handler(None, &["quit"], |bot, event| {
            if let Some(nick) = event.from() {
                let nick = nick.to_string();
                bot.channels.remove_member_everywhere(&nick);
            }
            Ok(())
        });

        self.add_handler(None, &["namreply"], |bot, event| {
            let Some(name) = event.channel.clone() else {
                return Ok(());
            };
            let names: Vec<String> = event
                .text
                .split_whitespace()
                .map(|n| n.trim_start_matches(['@', '+', '%', '~', '&']).to_string())
                .collect();
            if let Some(channel) = bot.channels.get_mut(&name) {
                for nick in &names {
                    channel.add_member(nick);
                }
            }
            Ok(())
        });

        // joining before the MOTD finishes gets rejected by most servers
        self.add_handler(None, &["endofmotd", "nomotd"], |bot, _event| {
            bot.auto_join();
            Ok(())
        });
    }

    fn auto_join(&mut self) {
        for channel in self.config.get_list("channel") {
            debug!(channel = %channel, "auto-joining");
            self.out.join(&channel);
        }
    }

    // ------------------------------------------------------------------
    // Built-in commands
    // ------------------------------------------------------------------

    fn install_commands(&mut self) {
        // Owner-only commands.
        self.add_command(None, "quit", true, false, "Makes the bot quit.", |bot, event| {
            bot.do_quit(event);
            Ok(())
        });

        self.add_command(
            None,
            "join",
            true,
            false,
            "{cmd}join <channel> -- Makes the bot join a channel.",
            |bot, event| {
                bot.do_join(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "part",
            true,
            false,
            "{cmd}part <channel> -- Makes the bot leave a channel.",
            |bot, event| {
                bot.do_part(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "alias",
            true,
            false,
            "{cmd}alias <add|remove> <old> [<new>] -- Adds or removes a command \
             alias. Do not put the command sigil on the old or new command strings.",
            |bot, event| {
                bot.do_alias(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "load",
            true,
            false,
            "{cmd}load <plugin> -- Loads a plugin.",
            |bot, event| {
                bot.do_load(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "unload",
            true,
            false,
            "{cmd}unload <plugin> -- Unloads a plugin.",
            |bot, event| {
                bot.do_unload(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "reload",
            true,
            false,
            "{cmd}reload <plugin> -- Reloads a plugin.",
            |bot, event| {
                bot.do_reload(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "plugins",
            true,
            false,
            "{cmd}plugins [brief] -- Lists loaded plugins. With an argument, a brief list is given.",
            |bot, event| {
                bot.do_list_plugins(event);
                Ok(())
            },
        );

        // Public commands.
        self.add_command(None, "list", false, false, "Lists commands.", |bot, event| {
            bot.do_command_list(event);
            Ok(())
        });

        self.add_command(
            None,
            "owner",
            false,
            true,
            "Owner commands, private message only. {cmd}owner login <password>",
            |bot, event| {
                bot.do_owner_cmd(event);
                Ok(())
            },
        );

        self.add_command(None, "owners", false, false, "Lists owners.", |bot, event| {
            bot.do_owner_list(event);
            Ok(())
        });

        self.add_command(
            None,
            "help",
            false,
            false,
            "{cmd}help <command> -- Shows help for command",
            |bot, event| {
                bot.do_help(event);
                Ok(())
            },
        );

        self.add_command(
            None,
            "version",
            false,
            false,
            "{cmd}version -- Shows the bot's version.",
            |bot, event| {
                bot.do_version(event);
                Ok(())
            },
        );
    }

    fn do_quit(&mut self, event: &Event) {
        let message = command_args(event);
        let message = if message.is_empty() {
            format!(
                "A straybot named {} is quitting. Version: {}",
                self.nick, BOT_VERSION
            )
        } else {
            message
        };
        self.shutdown(&message);
    }

    fn do_join(&mut self, event: &Event) {
        let name = command_args(event);
        let name = name.trim();
        if name.is_empty() {
            self.reply(event, "I need a channel to join!");
            return;
        }
        self.out.join(&chan::with_sigil(name));
    }

    fn do_part(&mut self, event: &Event) {
        let name = command_args(event);
        let name = name.trim();
        if name.is_empty() {
            self.reply(event, "I need a channel to leave!");
            return;
        }
        self.out.part(&chan::with_sigil(name));
    }

    fn do_alias(&mut self, event: &Event) {
        let sigil = self.sigils.first().copied().unwrap_or('!');
        let args = command_args(event);
        let parts: Vec<&str> = args.split_whitespace().collect();

        let message = match parts.as_slice() {
            ["add", old, new] => {
                if self.commands.alias(old, new) {
                    format!("Notice: {sigil}{old} has been aliased to {sigil}{new}")
                } else {
                    format!("No command known as: {sigil}{old}")
                }
            }
            ["remove", name] => match self.commands.remove_alias(name) {
                AliasRemoval::Removed => format!("Notice: {sigil}{name} has been removed."),
                AliasRemoval::NotAlias => format!("Notice: {sigil}{name} is not an alias."),
                AliasRemoval::Unknown => format!("No command known as: {sigil}{name}"),
            },
            _ => format!("Unknown alias command. For help, use {sigil}help alias"),
        };
        self.reply(event, &message);
    }

    fn do_load(&mut self, event: &Event) {
        let name = command_args(event);
        let name = name.trim();
        let message = if name.is_empty() {
            "I need a plugin name to load!".to_string()
        } else if self.load_plugin(name).is_ok() {
            format!("Plugin {name} loaded.")
        } else {
            format!("Unable to load {name} plugin! Check logs.")
        };
        self.reply(event, &message);
    }

    fn do_unload(&mut self, event: &Event) {
        let name = command_args(event);
        let name = name.trim();
        let message = if name.is_empty() {
            "I need a plugin name to unload!".to_string()
        } else if self.unload_plugin(name).is_ok() {
            format!("Plugin {name} unloaded.")
        } else {
            format!("Unable to unload {name} plugin. Check logs.")
        };
        self.reply(event, &message);
    }

    fn do_reload(&mut self, event: &Event) {
        let name = command_args(event);
        let name = name.trim();
        let message = if name.is_empty() {
            "I need a plugin name to reload!".to_string()
        } else if self.reload_plugin(name).is_ok() {
            format!("Plugin {name} reloaded.")
        } else {
            format!("Unable to reload {name} plugin. Check logs.")
        };
        self.reply(event, &message);
    }

    fn do_list_plugins(&mut self, event: &Event) {
        let brief = !command_args(event).trim().is_empty();
        let separator = if brief { ", " } else { "\n" };
        let listing = self.plugins.describe_loaded(brief).join(separator);
        let message = if listing.is_empty() {
            "No plugins loaded.".to_string()
        } else {
            listing
        };
        self.reply(event, &message);
    }

    fn do_command_list(&mut self, event: &Event) {
        let listing: Vec<String> = self
            .commands
            .names()
            .into_iter()
            .map(|name| match self.commands.get(&name).and_then(Command::alias_target) {
                Some(target) => format!("{name} (alias for: {target})"),
                None => name,
            })
            .collect();
        self.reply(event, &format!("Commands:  {}", listing.join(", ")));
    }

    fn do_owner_cmd(&mut self, event: &Event) {
        let text = command_args(event);
        let text = text.trim();
        if text.is_empty() {
            self.reply(event, "I need a command for owner.");
            return;
        }

        let (subcommand, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let message = match subcommand {
            "login" => {
                let Some(from) = event.from().map(str::to_string) else {
                    return;
                };
                match self.owners.get_mut(&from) {
                    Some(owner) => {
                        if owner.try_login(rest.trim()) {
                            format!("{from} logged in as owner.")
                        } else {
                            "Password does not match.".to_string()
                        }
                    }
                    None => format!("No owner known as {from}"),
                }
            }
            other => format!("Unknown owner command: {other}"),
        };
        self.reply(event, &message);
    }

    fn do_owner_list(&mut self, event: &Event) {
        let logged_in = self.owners.logged_in_nicks();
        let message = if logged_in.is_empty() {
            "None logged in.".to_string()
        } else {
            logged_in.join(", ")
        };
        self.reply(event, &message);
    }

    fn do_help(&mut self, event: &Event) {
        let topic = command_args(event);
        let topic = topic.trim();
        let topic = if topic.is_empty() { "help" } else { topic };

        let sigil = self.sigils.first().copied().unwrap_or('!');
        let message = match self.commands.get(topic) {
            Some(command) => {
                let mut message = command.help(&self.nick, sigil);
                if let Some(target) = command.alias_target() {
                    message.push_str(&format!(" (Alias for {target})"));
                }
                if command.owner_only {
                    message.push_str(" (Owner Command Only)");
                }
                message
            }
            None => format!("No help found for: {topic}."),
        };
        self.reply(event, &message);
    }

    fn do_version(&mut self, event: &Event) {
        let possessive = if self.nick.ends_with('s') {
            format!("{}'", self.nick)
        } else {
            format!("{}'s", self.nick)
        };
        self.reply(event, &format!("{possessive} version is {BOT_VERSION}"));
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{drain, privmsg, pubmsg, test_bot};
    use super::*;

    #[test]
    fn test_rejects_config_without_owners() {
        let config = Config::parse_str(
            "straybot.toml",
            r#"
nick = "testbot"
server = "irc.test.example"
owner = ["syn:tooshort"]
"#,
        )
        .unwrap();
        let (out, _rx) = Outbound::pair();
        assert!(Bot::new(config, std::env::temp_dir(), out).is_err());
    }

    #[test]
    fn test_ping_gets_exactly_one_pong() {
        let (mut bot, mut rx) = test_bot();
        bot.handle_line("PING :irc.test.example");
        let lines = drain(&mut rx);
        assert_eq!(lines, vec!["PONG :irc.test.example".to_string()]);
    }

    #[test]
    fn test_motd_end_triggers_auto_join() {
        let (mut bot, mut rx) = test_bot();
        bot.handle_line(":server 376 testbot :End of /MOTD command.");
        assert_eq!(drain(&mut rx), vec!["JOIN #lab".to_string()]);
    }

    #[test]
    fn test_join_and_topic_tracking() {
        let (mut bot, _rx) = test_bot();
        bot.handle_line(":testbot!bot@host JOIN :#lab");
        assert_eq!(bot.channels.names(), vec!["#lab"]);

        bot.handle_line(":server 332 testbot #lab :All things Straylight");
        assert_eq!(
            bot.channels.get("#lab").unwrap().topic.as_deref(),
            Some("All things Straylight")
        );

        bot.handle_line(":server 353 testbot = #lab :@alice +bob carol");
        assert_eq!(
            bot.channels.get("#lab").unwrap().members,
            vec!["alice", "bob", "carol"]
        );

        bot.handle_line(":alice!user@host PART #lab");
        assert_eq!(bot.channels.get("#lab").unwrap().members, vec!["bob", "carol"]);

        bot.handle_line(":testbot!bot@host PART #lab");
        assert!(bot.channels.get("#lab").is_none());
    }

    #[test]
    fn test_nick_change_rekeys_owner() {
        let (mut bot, _rx) = test_bot();
        bot.owners.get_mut("syn").unwrap().try_login("hunter2");

        bot.handle_line(":syn!user@host NICK :syn_away");
        assert!(bot.is_owner("syn_away"));
        assert!(!bot.is_owner("syn"));

        // change back keeps rights without re-authentication
        bot.handle_line(":syn_away!user@host NICK :syn");
        assert!(bot.is_owner("syn"));
    }

    #[test]
    fn test_owner_login_flow() {
        let (mut bot, mut rx) = test_bot();

        // owner commands are rejected in public
        bot.on_message(&pubmsg("syn", "#lab", "!owner login hunter2"));
        assert!(drain(&mut rx)[0].contains("private-message only"));
        assert!(!bot.is_owner("syn"));

        bot.on_message(&privmsg("syn", "!owner login wrong"));
        assert!(drain(&mut rx)[0].contains("does not match"));

        bot.on_message(&privmsg("syn", "!owner login hunter2"));
        assert!(drain(&mut rx)[0].contains("logged in as owner"));
        assert!(bot.is_owner("syn"));

        bot.on_message(&privmsg("mallory", "!owner login hunter2"));
        assert!(drain(&mut rx)[0].contains("No owner known as mallory"));
    }

    #[test]
    fn test_owners_listing() {
        let (mut bot, mut rx) = test_bot();
        bot.on_message(&pubmsg("alice", "#lab", "!owners"));
        assert!(drain(&mut rx)[0].contains("None logged in."));

        bot.owners.get_mut("syn").unwrap().try_login("hunter2");
        bot.on_message(&pubmsg("alice", "#lab", "!owners"));
        assert!(drain(&mut rx)[0].contains("syn"));
    }

    #[test]
    fn test_help_decorations() {
        let (mut bot, mut rx) = test_bot();
        bot.on_message(&pubmsg("alice", "#lab", "!help join"));
        let line = drain(&mut rx).remove(0);
        assert!(line.contains("!join <channel>"));
        assert!(line.contains("(Owner Command Only)"));

        bot.commands.alias("version", "ver");
        bot.on_message(&pubmsg("alice", "#lab", "!help ver"));
        assert!(drain(&mut rx)[0].contains("(Alias for version)"));

        bot.on_message(&pubmsg("alice", "#lab", "!help nothere"));
        assert!(drain(&mut rx)[0].contains("No help found for: nothere."));
    }

    #[test]
    fn test_version_reply() {
        let (mut bot, mut rx) = test_bot();
        bot.on_message(&pubmsg("alice", "#lab", "!version"));
        let line = drain(&mut rx).remove(0);
        assert!(line.contains("testbot's version is"));
        assert!(line.contains(BOT_VERSION));
    }

    #[test]
    fn test_reply_targets() {
        let (bot, mut rx) = test_bot();
        bot.reply(&pubmsg("alice", "#lab", "hi"), "hello");
        assert_eq!(drain(&mut rx), vec!["NOTICE #lab :hello".to_string()]);

        bot.reply(&privmsg("alice", "hi"), "hello");
        assert_eq!(drain(&mut rx), vec!["NOTICE alice :hello".to_string()]);
    }

    #[test]
    fn test_multiline_reply_splits() {
        let (bot, mut rx) = test_bot();
        bot.reply(&pubmsg("alice", "#lab", "hi"), "one\ntwo");
        assert_eq!(
            drain(&mut rx),
            vec![
                "NOTICE #lab :one".to_string(),
                "NOTICE #lab :two".to_string()
            ]
        );
    }

    #[test]
    fn test_quit_command_unloads_plugins_and_sends_farewell() {
        use std::cell::Cell;

        let (mut bot, mut rx) = test_bot();
        let stopped = Rc::new(Cell::new(false));
        {
            let stopped = Rc::clone(&stopped);
            let plugin = crate::plugin::Plugin::new("flusher").on_stop(move |_bot| {
                stopped.set(true);
                Ok(())
            });
            bot.start_plugin(plugin).unwrap();
        }
        bot.owners.get_mut("syn").unwrap().try_login("hunter2");

        bot.on_message(&privmsg("syn", "!quit so long"));
        assert!(bot.quit_requested());
        assert!(stopped.get());
        let lines = drain(&mut rx);
        assert_eq!(lines, vec!["QUIT :so long".to_string()]);
    }

    #[test]
    fn test_join_command_adds_missing_sigil() {
        let (mut bot, mut rx) = test_bot();
        bot.owners.get_mut("syn").unwrap().try_login("hunter2");
        bot.on_message(&privmsg("syn", "!join lab"));
        assert_eq!(drain(&mut rx), vec!["JOIN #lab".to_string()]);
    }

    #[test]
    fn test_stream_registration_and_dispatch() {
        use std::cell::RefCell;

        let (mut bot, _rx) = test_bot();
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let source = bot.register_stream("timerfeed", move |_bot, line| {
            sink.borrow_mut().push(line.to_string());
            Ok(())
        });

        source.push("tick");
        let mut aux_rx = bot.take_aux_rx();
        let (name, line) = aux_rx.try_recv().unwrap();
        bot.handle_aux_line(&name, &line);
        assert_eq!(*seen.borrow(), vec!["tick".to_string()]);

        assert!(bot.deregister_stream("timerfeed"));
        assert!(!bot.deregister_stream("timerfeed"));
    }
}
