//! Reading mode model: history, cursor, overlay and output classification.
//!
//! Everything here is synchronous and free of I/O. The session crate feeds
//! it lines and keys and decides what to speak and write.

pub mod classifier;
pub mod history;
pub mod navigator;
pub mod overlay;
pub mod words;

pub use classifier::{classify, Classification, IssueCategory};
pub use history::{BufferEntry, EntryKind, History};
pub use navigator::{Boundary, Cursor, Granularity, Movement, Navigator};
pub use overlay::{render, visible_window, Frame, ReadingModeState};
pub use words::{word_ranges, WordRange};
