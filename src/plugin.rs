//! Plugin descriptors, registry and lifecycle.
//!
//! A plugin is a static descriptor: identity metadata plus optional start
//! and stop closures. Command and handler registrations made while the
//! start hook runs are attributed to the plugin, so stopping it can tear
//! down exactly its own set and nothing else. Per-instance lifecycle:
//! unregistered → declared → started → (stopped → removed); a start
//! fault returns the instance to unregistered with nothing left behind.

use std::collections::HashMap;

use tracing::{error, info};

use crate::bot::Bot;
use crate::config::Config;
use crate::error::PluginError;
use crate::events::HandlerId;

/// Start hook: receives the bot and the plugin's private config scope.
pub type StartFn = dyn FnMut(&mut Bot, &Config) -> anyhow::Result<()>;
/// Stop hook: flush state before the plugin's registrations are removed.
pub type StopFn = dyn FnMut(&mut Bot) -> anyhow::Result<()>;

/// A declared extension unit.
pub struct Plugin {
    pub name: String,
    pub author: String,
    pub version: String,
    config_file: Option<String>,
    start: Option<Box<StartFn>>,
    stop: Option<Box<StopFn>>,
}

impl Plugin {
    /// Declare a plugin. Names are case-folded.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            author: String::new(),
            version: String::new(),
            config_file: None,
            start: None,
            stop: None,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Override the config scope name; defaults to the plugin name.
    pub fn config_file(mut self, name: impl Into<String>) -> Self {
        self.config_file = Some(name.into());
        self
    }

    pub fn on_start(
        mut self,
        hook: impl FnMut(&mut Bot, &Config) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.start = Some(Box::new(hook));
        self
    }

    pub fn on_stop(mut self, hook: impl FnMut(&mut Bot) -> anyhow::Result<()> + 'static) -> Self {
        self.stop = Some(Box::new(hook));
        self
    }

    /// Name of the config scope, without extension.
    pub fn config_name(&self) -> &str {
        self.config_file.as_deref().unwrap_or(&self.name)
    }

    /// One-line description; the long form carries author and version.
    pub fn describe(&self, brief: bool) -> String {
        if brief {
            self.name.clone()
        } else {
            format!(
                "{} -- Author: {} Version: {}",
                self.name, self.author, self.version
            )
        }
    }
}

/// Factory producing a fresh descriptor each load.
pub type PluginFactory = fn() -> Plugin;

/// One loaded plugin instance and the registrations it owns.
pub struct LoadedPlugin {
    pub plugin: Plugin,
    pub commands: Vec<String>,
    pub handlers: Vec<(String, HandlerId)>,
}

/// The plugin runtime: available factories plus loaded instances.
#[derive(Default)]
pub struct PluginRuntime {
    available: HashMap<String, PluginFactory>,
    loaded: HashMap<String, LoadedPlugin>,
}

impl PluginRuntime {
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.available.contains_key(&name.to_ascii_lowercase())
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.keys().cloned().collect();
        names.sort();
        names
    }

    /// Descriptions of loaded plugins, sorted by name.
    pub fn describe_loaded(&self, brief: bool) -> Vec<String> {
        self.loaded_names()
            .iter()
            .filter_map(|name| self.loaded.get(name))
            .map(|entry| entry.plugin.describe(brief))
            .collect()
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Option<&mut LoadedPlugin> {
        self.loaded.get_mut(name)
    }
}

impl Bot {
    /// Register a plugin factory under `name`. Redeclaring an active name
    /// unloads the old instance first; the factory is replaced either way.
    pub fn register_plugin(&mut self, name: &str, factory: PluginFactory) {
        let name = name.to_ascii_lowercase();
        if self.plugins.is_loaded(&name) {
            if let Err(err) = self.unload_plugin(&name) {
                error!(plugin = %name, error = %err, "failed to unload redeclared plugin");
            }
        }
        self.plugins.available.insert(name, factory);
    }

    /// Build a fresh instance from the registered factory and start it.
    pub fn load_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let name = name.to_ascii_lowercase();
        let Some(factory) = self.plugins.available.get(&name).copied() else {
            error!(plugin = %name, "no such plugin");
            return Err(PluginError::Unknown(name));
        };
        self.start_plugin(factory())
    }

    /// Resolve the plugin's config scope, run its start hook, and record
    /// it as loaded. On any fault every registration the hook made is
    /// removed again; no partial registration survives.
    pub fn start_plugin(&mut self, mut plugin: Plugin) -> Result<(), PluginError> {
        let name = plugin.name.clone();
        if self.plugins.is_loaded(&name) {
            self.unload_plugin(&name)?;
        }

        let scope_path = self.config_dir().join(format!("{}.toml", plugin.config_name()));
        let scope = match Config::load_or_empty(&scope_path) {
            Ok(scope) => scope,
            Err(err) => {
                error!(plugin = %name, error = %err, "plugin config unreadable");
                return Err(PluginError::Start {
                    name,
                    cause: err.into(),
                });
            }
        };

        // Provisional record so registrations made inside the start hook
        // are attributed to this plugin.
        let mut start = plugin.start.take();
        self.plugins.loaded.insert(
            name.clone(),
            LoadedPlugin {
                plugin,
                commands: Vec::new(),
                handlers: Vec::new(),
            },
        );

        let result = match start.as_mut() {
            Some(hook) => hook(self, &scope),
            None => Ok(()),
        };
        if let Some(entry) = self.plugins.loaded.get_mut(&name) {
            entry.plugin.start = start;
        }

        match result {
            Ok(()) => {
                info!(plugin = %name, "plugin started");
                Ok(())
            }
            Err(cause) => {
                self.remove_plugin_registrations(&name);
                self.plugins.loaded.remove(&name);
                error!(plugin = %name, error = ?cause, "plugin failed to start");
                Err(PluginError::Start { name, cause })
            }
        }
    }

    /// Run the stop hook, then remove exactly this plugin's commands and
    /// handlers, using the owned set recorded at registration time.
    pub fn stop_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let name = name.to_ascii_lowercase();
        let Some(entry) = self.plugins.loaded.get_mut(&name) else {
            return Err(PluginError::NotLoaded(name));
        };

        let mut stop = entry.plugin.stop.take();
        if let Some(hook) = stop.as_mut() {
            if let Err(err) = hook(self) {
                error!(plugin = %name, error = ?err, "plugin stop hook failed");
            }
        }
        if let Some(entry) = self.plugins.loaded.get_mut(&name) {
            entry.plugin.stop = stop;
        }

        self.remove_plugin_registrations(&name);
        Ok(())
    }

    /// Stop a plugin and forget the instance.
    pub fn unload_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let name = name.to_ascii_lowercase();
        self.stop_plugin(&name)?;
        self.plugins.loaded.remove(&name);
        info!(plugin = %name, "plugin unloaded");
        Ok(())
    }

    /// Unload-then-load. Succeeds as a fresh load when the plugin was not
    /// previously loaded.
    pub fn reload_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let name = name.to_ascii_lowercase();
        if self.plugins.is_loaded(&name) {
            self.unload_plugin(&name)?;
        }
        self.load_plugin(&name)
    }

    /// Unload every loaded plugin; used on shutdown so stop hooks can
    /// flush state first.
    pub fn unload_all_plugins(&mut self) {
        for name in self.plugins.loaded_names() {
            if let Err(err) = self.unload_plugin(&name) {
                error!(plugin = %name, error = %err, "failed to unload plugin");
            }
        }
    }

    /// Remove every command and handler owned by `name`. The owned sets
    /// are snapshotted before mutation so this is safe to call from one of
    /// the plugin's own handlers.
    fn remove_plugin_registrations(&mut self, name: &str) {
        let Some(entry) = self.plugins.loaded.get_mut(name) else {
            return;
        };
        let commands = std::mem::take(&mut entry.commands);
        let handlers = std::mem::take(&mut entry.handlers);
        for command in commands {
            self.commands.remove(&command);
        }
        for (topic, id) in handlers {
            self.bus.unobserve(&topic, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testutil::{drain, pubmsg, test_bot};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tracked_plugin(log: Rc<RefCell<Vec<&'static str>>>) -> Plugin {
        let start_log = Rc::clone(&log);
        let stop_log = Rc::clone(&log);
        Plugin::new("tracker")
            .author("Straylight Team")
            .version("1.0")
            .on_start(move |bot, _conf| {
                start_log.borrow_mut().push("started");
                bot.add_command(Some("tracker"), "track", false, false, "", |bot, event| {
                    bot.reply(event, "tracked");
                    Ok(())
                });
                bot.add_handler(Some("tracker"), &["seen_topic"], |_bot, _event| Ok(()));
                Ok(())
            })
            .on_stop(move |_bot| {
                stop_log.borrow_mut().push("stopped");
                Ok(())
            })
    }

    #[test]
    fn test_start_registers_and_unload_removes_everything() {
        let (mut bot, _rx) = test_bot();
        let log = Rc::new(RefCell::new(Vec::new()));

        bot.start_plugin(tracked_plugin(Rc::clone(&log))).unwrap();
        assert!(bot.plugins.is_loaded("tracker"));
        assert!(bot.commands.contains("track"));
        assert_eq!(bot.bus.subscriber_count("seen_topic"), 1);

        bot.unload_plugin("tracker").unwrap();
        assert_eq!(*log.borrow(), vec!["started", "stopped"]);
        assert!(!bot.plugins.is_loaded("tracker"));

        // no remaining trace: command lookup misses, topic emits clean
        assert!(!bot.handle_command("track", &pubmsg("alice", "#lab", "!track")));
        let event = straybot_proto::Event::synthetic("seen_topic", "");
        assert!(!bot.emit("seen_topic", &event).unwrap());
    }

    #[test]
    fn test_failed_start_leaves_no_partial_registration() {
        let (mut bot, _rx) = test_bot();
        let plugin = Plugin::new("halfway").on_start(|bot, _conf| {
            bot.add_command(Some("halfway"), "early", false, false, "", |_bot, _event| {
                Ok(())
            });
            anyhow::bail!("start hook exploded after registering")
        });

        assert!(matches!(
            bot.start_plugin(plugin),
            Err(PluginError::Start { .. })
        ));
        assert!(!bot.plugins.is_loaded("halfway"));
        assert!(!bot.commands.contains("early"));
    }

    #[test]
    fn test_missing_config_scope_is_not_a_fault() {
        let (mut bot, _rx) = test_bot();
        let plugin = Plugin::new("scopeless").on_start(|_bot, conf| {
            assert!(!conf.on_disk());
            assert!(conf.path().to_string_lossy().contains("scopeless.toml"));
            assert_eq!(conf.get_str("anything", "fallback"), "fallback");
            Ok(())
        });
        bot.start_plugin(plugin).unwrap();
        assert!(bot.plugins.is_loaded("scopeless"));
    }

    #[test]
    fn test_reload_restarts_a_loaded_plugin() {
        let (mut bot, _rx) = test_bot();
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        {
            let log = Rc::clone(&log);
            // registry holds factories, so use a static-friendly closure shape
            fn counting(log: Rc<RefCell<Vec<&'static str>>>) -> Plugin {
                Plugin::new("pulse")
                    .on_start({
                        let log = Rc::clone(&log);
                        move |_bot, _conf| {
                            log.borrow_mut().push("start");
                            Ok(())
                        }
                    })
                    .on_stop(move |_bot| {
                        log.borrow_mut().push("stop");
                        Ok(())
                    })
            }
            bot.start_plugin(counting(log)).unwrap();
        }

        // reload of a plugin without a registered factory fails cleanly
        assert!(matches!(
            bot.reload_plugin("pulse"),
            Err(PluginError::Unknown(_))
        ));
        assert_eq!(*log.borrow(), vec!["start", "stop"]);
    }

    #[test]
    fn test_reload_of_unloaded_plugin_is_a_fresh_load() {
        let (mut bot, _rx) = test_bot();
        fn simple() -> Plugin {
            Plugin::new("fresh")
        }
        bot.register_plugin("fresh", simple);
        assert!(!bot.plugins.is_loaded("fresh"));

        bot.reload_plugin("fresh").unwrap();
        assert!(bot.plugins.is_loaded("fresh"));
    }

    #[test]
    fn test_redeclaring_replaces_and_unloads() {
        let (mut bot, _rx) = test_bot();
        fn first() -> Plugin {
            Plugin::new("dual").on_start(|bot, _conf| {
                bot.add_command(Some("dual"), "one", false, false, "", |_b, _e| Ok(()));
                Ok(())
            })
        }
        fn second() -> Plugin {
            Plugin::new("dual").on_start(|bot, _conf| {
                bot.add_command(Some("dual"), "two", false, false, "", |_b, _e| Ok(()));
                Ok(())
            })
        }

        bot.register_plugin("dual", first);
        bot.load_plugin("dual").unwrap();
        assert!(bot.commands.contains("one"));

        bot.register_plugin("dual", second);
        // the old definition is gone entirely, not merged
        assert!(!bot.plugins.is_loaded("dual"));
        assert!(!bot.commands.contains("one"));

        bot.load_plugin("dual").unwrap();
        assert!(bot.commands.contains("two"));
        assert!(!bot.commands.contains("one"));
    }

    #[test]
    fn test_command_can_unload_its_own_plugin() {
        let (mut bot, mut rx) = test_bot();
        let plugin = Plugin::new("ouroboros").on_start(|bot, _conf| {
            bot.add_command(
                Some("ouroboros"),
                "vanish",
                false,
                false,
                "",
                |bot, event| {
                    bot.unload_plugin("ouroboros")?;
                    bot.reply(event, "gone");
                    Ok(())
                },
            );
            Ok(())
        });
        bot.start_plugin(plugin).unwrap();

        assert!(bot.handle_command("vanish", &pubmsg("alice", "#lab", "!vanish")));
        assert!(drain(&mut rx)[0].contains("gone"));
        assert!(!bot.plugins.is_loaded("ouroboros"));
        assert!(!bot.commands.contains("vanish"));
    }
}
