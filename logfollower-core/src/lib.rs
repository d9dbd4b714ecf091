#![allow(dead_code)]

//! The continuous replication follower core: the marker codec,
//! collection filter, transaction tracker, event applier and follower
//! loop, wired together against the `Transport` and `Storage`
//! interfaces `logfollower-transport` and `logfollower-storage`
//! declare.
//!
//! Everything else in this workspace — `logfollower-cli` and the real
//! transport/storage implementations — is a thin shell around this
//! crate.

mod applier;
mod backoff;
mod codec;
mod config;
mod error;
mod filter;
mod follower;
mod tracker;

pub use codec::DecodeError;
pub use config::FollowerConfig;
pub use error::FollowError;
pub use filter::CollectionFilter;
pub use follower::{Follower, StopHandle};
pub use tracker::{TrackerError, TransactionTracker};
