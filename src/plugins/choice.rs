//! Random-choice responder.
//!
//! Registers one command per question word (`are`, `does`, `is`,
//! `should`, `will`). A question with comma- or "or"-separated options
//! gets one of them back; a question with no options gets one of the
//! configured sayings, defaulting to Yes/No.

use std::rc::Rc;
use std::sync::OnceLock;

use rand::seq::SliceRandom;
use regex::Regex;

use crate::commands::command_args;
use crate::plugin::Plugin;

const QUESTION_WORDS: [&str; 5] = ["are", "does", "is", "should", "will"];

const HELP: &str = "{cmd}[are|does|is|should|will] <subject> <question>? -- Ask a question. \
     Multiple choice questions are separated by commas or \" or \". Example: {cmd}should I \
     eat cake or go jogging? ...or... {cmd}will I get lucky?";

fn option_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",?\s+or\s+|,\s*").expect("option pattern"))
}

/// Split a question into its offered options, dropping the subject word
/// and any trailing question mark.
fn parse_options(text: &str) -> Vec<String> {
    let text = text.trim().trim_end_matches('?');
    let text = match text.split_once(char::is_whitespace) {
        Some((_subject, rest)) => rest,
        None => return Vec::new(),
    };
    option_splitter()
        .split(text)
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn plugin() -> Plugin {
    Plugin::new("choice")
        .author("Syn")
        .version("1.0")
        .on_start(|bot, conf| {
            let sayings = conf.get_list("saying");
            let sayings = Rc::new(if sayings.is_empty() {
                vec!["Yes".to_string(), "No".to_string()]
            } else {
                sayings
            });

            for word in QUESTION_WORDS {
                let sayings = Rc::clone(&sayings);
                bot.add_command(Some("choice"), word, false, false, HELP, move |bot, event| {
                    let text = command_args(event);
                    let message = if text.trim().is_empty() {
                        "Maybe you should ask a question?".to_string()
                    } else {
                        let options = parse_options(&text);
                        let mut rng = rand::thread_rng();
                        let picked = if options.len() > 1 {
                            options.choose(&mut rng).cloned()
                        } else {
                            sayings.choose(&mut rng).cloned()
                        };
                        picked.unwrap_or_else(|| "No idea.".to_string())
                    };
                    bot.reply(event, &message);
                    Ok(())
                });
            }
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testutil::{drain, pubmsg, test_bot_in};

    fn choice_bot() -> (
        crate::bot::Bot,
        tokio::sync::mpsc::UnboundedReceiver<String>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let (bot, rx) = test_bot_in(dir.path());
        (bot, rx, dir)
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(
            parse_options("I eat cake or go jogging?"),
            vec!["eat cake", "go jogging"]
        );
        assert_eq!(
            parse_options("we tea, coffee or mate?"),
            vec!["tea", "coffee", "mate"]
        );
        // a bare question offers nothing to pick from
        assert_eq!(parse_options("I get lucky?"), vec!["get lucky"]);
        assert!(parse_options("luck?").is_empty());
    }

    #[test]
    fn test_multiple_options_picks_one_of_them() {
        let (mut bot, mut rx, _dir) = choice_bot();
        bot.load_plugin("choice").unwrap();

        bot.on_message(&pubmsg("alice", "#lab", "!should I eat cake or go jogging?"));
        let line = drain(&mut rx).remove(0);
        assert!(line.contains("eat cake") || line.contains("go jogging"));
    }

    #[test]
    fn test_yes_no_question_uses_sayings() {
        let (mut bot, mut rx, _dir) = choice_bot();
        bot.load_plugin("choice").unwrap();

        bot.on_message(&pubmsg("alice", "#lab", "!will I get lucky?"));
        let line = drain(&mut rx).remove(0);
        assert!(line.contains("Yes") || line.contains("No"));
    }

    #[test]
    fn test_empty_question_is_prompted() {
        let (mut bot, mut rx, _dir) = choice_bot();
        bot.load_plugin("choice").unwrap();

        bot.on_message(&pubmsg("alice", "#lab", "!is"));
        assert!(drain(&mut rx)[0].contains("Maybe you should ask a question?"));
    }

    #[test]
    fn test_every_question_word_registers() {
        let (mut bot, _rx, _dir) = choice_bot();
        bot.load_plugin("choice").unwrap();
        for word in QUESTION_WORDS {
            assert!(bot.commands.contains(word), "missing {word}");
        }

        bot.unload_plugin("choice").unwrap();
        for word in QUESTION_WORDS {
            assert!(!bot.commands.contains(word), "leftover {word}");
        }
    }
}
