//! # Audio Module
//!
//! Per-guild playback core of the bot.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One [`session::GuildSession`] per guild, created on first use
//! - Removing a session is how a guild "leaves"
//!
//! ### [`session`] - Guild Session
//! - Owns the guild's queue, playback state and current track
//! - Serializes every command and sink callback behind one mutex
//! - Single advance path shared by natural end, skip and reconnection
//!
//! ### [`state`] - Playback State Machine
//! - Pure transition table, no side effects
//!
//! ### [`queue`] - Queue Management
//! - Strict FIFO of pending requests, 1-based listings and paging
//!
//! ### [`sink`] / [`voice`] - Audio Output
//! - `AudioSink` abstraction over a voice connection
//! - Songbird implementation with end/error/disconnect events
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # async fn example(registry: &SessionRegistry, sink: std::sync::Weak<dyn AudioSink>) -> anyhow::Result<()> {
//! let session = registry.get_or_create(GuildId::new(123456789));
//! session.attach(sink).await;
//!
//! session.enqueue(TrackRequest::new("lofi beats", UserId::new(1))).await?;
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sink;
pub mod state;
pub mod voice;

#[cfg(test)]
mod testing;
