//! Built-in extension units.
//!
//! Each plugin here consumes the public plugin API only: command and
//! handler registration, storage files, and its own config scope passed
//! into the start hook. Nothing in this tree reaches into the core's
//! tables directly, so every one of them can be loaded, unloaded and
//! reloaded at runtime like any external unit.

mod calc;
mod choice;
mod karma;
mod seen;

use crate::bot::Bot;

/// Register every built-in plugin factory with the runtime. Which of
/// them actually load at startup is decided by the `plugin` config list.
pub fn register_all(bot: &mut Bot) {
    bot.register_plugin("calc", calc::plugin);
    bot.register_plugin("choice", choice::plugin);
    bot.register_plugin("karma", karma::plugin);
    bot.register_plugin("seen", seen::plugin);
}
