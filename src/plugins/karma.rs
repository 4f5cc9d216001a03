//! Karma tracking.
//!
//! Watches channel chatter for `subject++` / `subject--`, keeps a tally
//! in a `subject: score` storage file, and answers `karma <subject>`
//! queries. Karma is only grantable in public, and never to yourself.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;

use crate::commands::command_args;
use crate::plugin::Plugin;

const HELP: &str = "{cmd}karma <subject> -- returns the karma for subject. You can give a \
     subject karma by simply giving the subject followed by either ++ for good karma, or -- \
     for bad karma. Subjects must not have spaces. For example: coffee++ or Syn--";

fn karma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9]+?)(\+\+|--)\s*").expect("karma pattern"))
}

/// Extract `(subject, delta)` from the start of a message, if any.
fn parse_karma(line: &str) -> Option<(String, i64)> {
    let captures = karma_re().captures(line)?;
    let subject = captures.get(1)?.as_str().to_ascii_lowercase();
    let delta = if captures.get(2)?.as_str() == "++" { 1 } else { -1 };
    Some((subject, delta))
}

struct Store {
    file: PathBuf,
    verbose: bool,
}

impl Store {
    /// Read the whole tally. Lines that are not `subject: score` are
    /// skipped, so a hand-edited file cannot wedge the plugin.
    fn load(&self) -> BTreeMap<String, i64> {
        let mut karmas = BTreeMap::new();
        let Ok(content) = std::fs::read_to_string(&self.file) else {
            return karmas;
        };
        for line in content.lines() {
            let Some((subject, score)) = line.split_once(':') else {
                continue;
            };
            let Ok(score) = score.trim().parse::<i64>() else {
                continue;
            };
            karmas.insert(subject.trim().to_string(), score);
        }
        karmas
    }

    fn save(&self, karmas: &BTreeMap<String, i64>) -> anyhow::Result<()> {
        let mut file = std::fs::File::create(&self.file)
            .with_context(|| format!("opening {}", self.file.display()))?;
        for (subject, score) in karmas {
            writeln!(file, "{subject}: {score}")?;
        }
        Ok(())
    }

    fn bump(&self, subject: &str, delta: i64) -> anyhow::Result<i64> {
        let mut karmas = self.load();
        let score = karmas.entry(subject.to_string()).or_insert(0);
        *score += delta;
        let score = *score;
        self.save(&karmas)?;
        Ok(score)
    }
}

pub fn plugin() -> Plugin {
    Plugin::new("karma")
        .author("Syn")
        .version("0.2")
        .on_start(|bot, conf| {
            let file_name = conf.get_str("file", "karma.dat");
            let store = Rc::new(Store {
                file: bot.storage_path(&file_name),
                verbose: conf.get_bool("verbose", false),
            });

            // touch the tally file so first reads see an empty ledger
            if !store.file.exists() && bot.storage_file(&file_name, true).is_none() {
                anyhow::bail!("cannot create karma storage {file_name}");
            }

            let watcher = Rc::clone(&store);
            bot.add_handler(Some("karma"), &["pubmsg"], move |bot, event| {
                let Some((subject, delta)) = parse_karma(&event.text) else {
                    return Ok(());
                };
                let from = event.from().unwrap_or("").to_ascii_lowercase();
                let message = if subject == from {
                    "Change must come from within, but you cannot change your karma.".to_string()
                } else {
                    let score = watcher.bump(&subject, delta)?;
                    format!("The karma for {subject} is: {score}.")
                };
                if watcher.verbose {
                    bot.reply(event, &message);
                }
                Ok(())
            });

            bot.add_handler(Some("karma"), &["privmsg"], move |bot, event| {
                if parse_karma(&event.text).is_some() {
                    bot.reply(event, "Karma can only be given in a public channel.");
                }
                Ok(())
            });

            let reader = Rc::clone(&store);
            bot.add_command(Some("karma"), "karma", false, false, HELP, move |bot, event| {
                let subject = command_args(event).trim().to_ascii_lowercase();
                let message = if subject.is_empty() {
                    "Looking for nothing is zen, but wasteful. Perhaps a subject, please?"
                        .to_string()
                } else {
                    match reader.load().get(&subject) {
                        Some(score) => format!("The karma for {subject} is: {score}."),
                        None => {
                            format!("I could not find a karma for {subject}. I do apologize.")
                        }
                    }
                };
                bot.reply(event, &message);
                Ok(())
            });

            Ok(())
        })
}
