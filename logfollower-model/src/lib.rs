#![allow(dead_code)]

//! Data model shared between the transport, storage and core crates.
//!
//! These types are the "on-the-wire-and-in-memory" vocabulary of the
//! replication follower: [`Tick`] orders every mutation the master ever
//! emits, [`Event`] is one decoded marker, and [`ApplierState`] is the
//! durable progress record the follower checkpoints.

mod collection;
mod event;
mod restrict;
mod state;
mod tick;
mod txid;

pub use collection::CollectionRef;
pub use event::{Event, EventKind};
pub use restrict::{RestrictMode, RestrictPolicy};
pub use state::{ApplierState, ErrorDescriptor, Phase};
pub use tick::Tick;
pub use txid::RemoteTxId;
