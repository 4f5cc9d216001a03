//! IRC server connection management.
//!
//! One logical task drives everything: a `tokio::select!` multiplex over
//! the framed socket, the outbound write queue, auxiliary line sources
//! plugins may register, and the interrupt signal. Exactly one inbound
//! line is parsed and dispatched per iteration, so handlers never
//! interleave. A dropped connection sleeps a fixed backoff and
//! reconnects with the same parameters, forever; any retry ceiling has
//! to be layered on top by a supervisor.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use straybot_proto::ctcp;
use straybot_proto::LineCodec;

use crate::bot::Bot;

/// Fixed delay between reconnect attempts. Deliberately not exponential.
pub(crate) const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Handle for queueing outbound lines; cheap to clone. There is no write
/// queue limit and no backpressure: a slow peer stalls the select loop at
/// the write, not the callers.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Create the handle and the receiver half the connection loop drains.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue one raw protocol line.
    pub fn send_line(&self, line: impl Into<String>) {
        let line = line.into();
        debug!(line = %line, "outbound");
        let _ = self.tx.send(line);
    }

    /// Send a channel or private message. Multi-line text becomes one
    /// message per line.
    pub fn privmsg(&self, target: &str, text: &str) {
        for line in text.split('\n') {
            self.send_line(format!("PRIVMSG {target} :{line}"));
        }
    }

    /// Send a notice. Bot replies go out as notices so two bots cannot
    /// trap each other in a reply loop.
    pub fn notice(&self, target: &str, text: &str) {
        for line in text.split('\n') {
            self.send_line(format!("NOTICE {target} :{line}"));
        }
    }

    /// Send a CTCP-framed message.
    pub fn ctcp(&self, target: &str, verb: &str, text: &str) {
        let payload = ctcp::quote(&format!("{verb} {text}"));
        self.send_line(format!("PRIVMSG {target} :{payload}"));
    }

    /// Perform an action ("/me").
    pub fn action(&self, target: &str, text: &str) {
        self.ctcp(target, "ACTION", text);
    }

    pub fn join(&self, channel: &str) {
        self.send_line(format!("JOIN {channel}"));
    }

    pub fn part(&self, channel: &str) {
        self.send_line(format!("PART {channel}"));
    }

    pub fn quit(&self, message: &str) {
        self.send_line(format!("QUIT :{message}"));
    }

    pub fn mode(&self, channel: &str, mode: &str, nick: &str) {
        self.send_line(format!("MODE {channel} {mode} {nick}"));
    }

    pub fn whois(&self, nick: &str) {
        self.send_line(format!("WHOIS {nick}"));
    }

    pub fn nick(&self, nick: &str) {
        self.send_line(format!("NICK {nick}"));
    }
}

/// Connect and drive the bot until shutdown. The reconnect loop treats a
/// failed connect, a read error and EOF identically: log, sleep the
/// backoff, try again with the original host/port/identity.
pub async fn run(
    bot: &mut Bot,
    mut out_rx: mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
    let mut aux_rx = bot.take_aux_rx();

    'reconnect: loop {
        if bot.quit_requested() {
            break;
        }

        let addr = format!("{}:{}", bot.server, bot.port);
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(server = %addr, error = %err, "connect failed; retrying");
                tokio::time::sleep(bot.backoff).await;
                continue;
            }
        };
        info!(server = %addr, nick = %bot.nick, "connected");

        let mut framed = Framed::new(stream, LineCodec::new());
        let registration = [
            format!("NICK {}", bot.nick),
            format!("USER {} 8 * :{}", bot.nick, bot.realname),
        ];
        for line in registration {
            if let Err(err) = framed.send(line).await {
                warn!(error = %err, "write failed during registration; retrying");
                tokio::time::sleep(bot.backoff).await;
                continue 'reconnect;
            }
        }

        // one line in, or one line out, per iteration
        loop {
            if bot.quit_requested() {
                // flush the farewell before dropping the stream
                while let Ok(line) = out_rx.try_recv() {
                    let _ = framed.send(line).await;
                }
                break 'reconnect;
            }

            tokio::select! {
                inbound = framed.next() => match inbound {
                    Some(Ok(line)) => bot.handle_line(&line),
                    Some(Err(err)) => {
                        warn!(error = %err, "read error; reconnecting");
                        break;
                    }
                    None => {
                        warn!("server closed the connection; reconnecting");
                        break;
                    }
                },
                Some(line) = out_rx.recv() => {
                    if let Err(err) = framed.send(line).await {
                        warn!(error = %err, "write error; reconnecting");
                        break;
                    }
                }
                Some((source, line)) = aux_rx.recv() => {
                    bot.handle_aux_line(&source, &line);
                }
                Ok(()) = tokio::signal::ctrl_c() => {
                    info!("interrupt received; shutting down");
                    bot.shutdown("SIG caught!");
                }
            }
        }

        tokio::time::sleep(bot.backoff).await;
    }

    info!("connection loop finished");
    Ok(())
}
