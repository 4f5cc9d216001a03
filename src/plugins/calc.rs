//! Arithmetic calculator command.
//!
//! Evaluates integer expressions over a restricted character set:
//! decimal and `0x` hex literals, `+ - * / %`, parentheses, and the
//! bitwise family `& | << >>`. Anything outside the set is reported back
//! to the invoker rather than evaluated.

use anyhow::{anyhow, bail};

use crate::commands::command_args;
use crate::plugin::Plugin;

const ALLOWED: &str = "0123456789abcdefx+-/*().%<>&|";

const HELP: &str =
    "{cmd}calc <expression> -- Calculates expression. Allowed characters: 0123456789abcdefx+-/*().%<>&|";

pub fn plugin() -> Plugin {
    Plugin::new("calc")
        .author("Straylight Team")
        .version("1.0")
        .on_start(|bot, _conf| {
            bot.add_command(Some("calc"), "calc", false, false, HELP, |bot, event| {
                let text = command_args(event);
                let who = event.from().unwrap_or("friend");
                let message = match check_charset(&text) {
                    Err(bad) => format!(
                        "{who}: There are unallowed characters. Bad characters: {bad}"
                    ),
                    Ok(cleaned) => match eval(&cleaned) {
                        Ok(value) => format!("{who}, the answer is: {value}"),
                        Err(err) => format!("Error in calculation: {err}"),
                    },
                };
                bot.reply(event, &message);
                Ok(())
            });
            Ok(())
        })
}

/// Lowercase, strip whitespace, and reject anything outside the allowed
/// set, returning the offending characters.
fn check_charset(text: &str) -> Result<String, String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bad: String = cleaned.chars().filter(|c| !ALLOWED.contains(*c)).collect();
    if bad.is_empty() {
        Ok(cleaned)
    } else {
        Err(bad)
    }
}

/// Evaluate a cleaned expression.
///
/// Recursive descent, loosest-binding first:
/// `|` < `&` < `<< >>` < `+ -` < `* / %` < unary minus < atoms.
fn eval(text: &str) -> anyhow::Result<i64> {
    let mut parser = Parser {
        bytes: text.as_bytes(),
        pos: 0,
    };
    if parser.bytes.is_empty() {
        bail!("empty expression");
    }
    let value = parser.bit_or()?;
    if parser.pos != parser.bytes.len() {
        bail!("unexpected character at position {}", parser.pos + 1);
    }
    Ok(value)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_pair(&mut self, pair: &[u8; 2]) -> bool {
        if self.bytes[self.pos..].starts_with(pair) {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn bit_or(&mut self) -> anyhow::Result<i64> {
        let mut value = self.bit_and()?;
        while self.eat(b'|') {
            value |= self.bit_and()?;
        }
        Ok(value)
    }

    fn bit_and(&mut self) -> anyhow::Result<i64> {
        let mut value = self.shift()?;
        while self.eat(b'&') {
            value &= self.shift()?;
        }
        Ok(value)
    }

    fn shift(&mut self) -> anyhow::Result<i64> {
        let mut value = self.additive()?;
        loop {
            if self.eat_pair(b"<<") {
                let by = u32::try_from(self.additive()?)
                    .map_err(|_| anyhow!("bad shift amount"))?;
                value = value.checked_shl(by).ok_or_else(|| anyhow!("shift overflow"))?;
            } else if self.eat_pair(b">>") {
                let by = u32::try_from(self.additive()?)
                    .map_err(|_| anyhow!("bad shift amount"))?;
                value = value.checked_shr(by).ok_or_else(|| anyhow!("shift overflow"))?;
            } else {
                return Ok(value);
            }
        }
    }

    fn additive(&mut self) -> anyhow::Result<i64> {
        let mut value = self.multiplicative()?;
        loop {
            if self.eat(b'+') {
                value = value
                    .checked_add(self.multiplicative()?)
                    .ok_or_else(|| anyhow!("overflow"))?;
            } else if self.eat(b'-') {
                value = value
                    .checked_sub(self.multiplicative()?)
                    .ok_or_else(|| anyhow!("overflow"))?;
            } else {
                return Ok(value);
            }
        }
    }

    fn multiplicative(&mut self) -> anyhow::Result<i64> {
        let mut value = self.unary()?;
        loop {
            if self.eat(b'*') {
                value = value
                    .checked_mul(self.unary()?)
                    .ok_or_else(|| anyhow!("overflow"))?;
            } else if self.eat(b'/') {
                let divisor = self.unary()?;
                value = value
                    .checked_div(divisor)
                    .ok_or_else(|| anyhow!("division by zero"))?;
            } else if self.eat(b'%') {
                let divisor = self.unary()?;
                value = value
                    .checked_rem(divisor)
                    .ok_or_else(|| anyhow!("division by zero"))?;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> anyhow::Result<i64> {
        if self.eat(b'-') {
            return Ok(self.unary()?.checked_neg().ok_or_else(|| anyhow!("overflow"))?);
        }
        self.atom()
    }

    fn atom(&mut self) -> anyhow::Result<i64> {
        if self.eat(b'(') {
            let value = self.bit_or()?;
            if !self.eat(b')') {
                bail!("missing closing parenthesis");
            }
            return Ok(value);
        }
        self.number()
    }

    fn number(&mut self) -> anyhow::Result<i64> {
        let start = self.pos;
        if self.bytes[self.pos..].starts_with(b"0x") {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == digits_start {
                bail!("bad hex literal");
            }
            let digits = std::str::from_utf8(&self.bytes[digits_start..self.pos])?;
            return i64::from_str_radix(digits, 16).map_err(|_| anyhow!("bad hex literal"));
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            bail!("expected a number at position {}", start + 1);
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos])?;
        digits.parse::<i64>().map_err(|_| anyhow!("number too large"))
    }
}
