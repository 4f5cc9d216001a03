//! Client-side IRC protocol support for straybot.
//!
//! This crate holds the wire-level pieces of the bot: a newline-framed
//! line codec, the raw-line-to-event parser, the CTCP quoting sub-format,
//! the numeric-reply name table and origin (prefix) parsing. It contains
//! no I/O beyond the tokio codec traits and no bot policy; everything
//! here is pure classification of bytes into structure.

pub mod chan;
pub mod ctcp;
pub mod error;
pub mod event;
pub mod line;
pub mod numerics;
pub mod origin;

pub use error::ProtocolError;
pub use event::Event;
pub use line::LineCodec;
pub use origin::Origin;
