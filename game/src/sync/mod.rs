//! Talking to the remote scoring service.
//!
//! [`ScoreClient`] does the HTTP; [`ScoreSync`] runs it off the frame loop and hands
//! results back through shared slots.

pub mod api;
mod client;
mod dispatch;

pub use api::LeaderboardEntry;
pub use client::{ScoreClient, SyncError};
pub use dispatch::{Registration, ScoreSync};
