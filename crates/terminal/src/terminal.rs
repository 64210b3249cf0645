//! Terminal capture core.
//!
//! PTY management, escape-sequence normalization, line segmentation and
//! keyboard decoding. Nothing in this crate knows about navigation or speech;
//! it turns raw bytes into lines and keys.

pub mod ansi;
pub mod input;
mod pty_handler;
pub mod segmenter;
pub mod types;

pub use input::{parse_key_chord, Decoded, DecodedKey, KeyDecoder};
pub use pty_handler::{PtyEvent, PtyHandler, SpawnOptions};
pub use segmenter::{LineClass, LineSegmenter, PromptKind};
pub use types::TerminalDimensions;
