//! # Audio Module
//!
//! Per-guild playback for the radio bot.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Playback Session
//! - One actor task per guild, fed through a message channel
//! - Owns the voice connection, the current item and the queue
//! - Radio retry with bounded backoff, empty-channel auto-disconnect
//!
//! ### [`registry`] - Session Registry
//! - Explicit guild → session map owned by the bot
//! - Periodic reaping of dormant sessions, shutdown of all sessions
//!
//! ### [`transcoder`] - Transcoding Bridge
//! - One `ffmpeg` process per playback attempt, fed into songbird
//! - Stream end and errors reported back to the session as messages
//!
//! ### [`queue`] / [`policy`]
//! - FIFO queue of on-demand tracks with a size limit
//! - Retry and disconnect policy constants taken from [`crate::config::Config`]
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers
//! - **Channels**: Stereo (2 channels)

pub mod policy;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transcoder;
pub mod voice;

pub use queue::QueueItem;
pub use registry::SessionRegistry;
pub use session::{Announcement, Announcer, NowPlaying, PlaybackState, SessionDeps, SessionHandle};
