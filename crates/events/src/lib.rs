//! Event system for delegation runs
//!
//! This crate provides the event bus and event types that let front ends
//! follow a run as the coordinator moves it between stages.

mod bus;
mod types;

pub use bus::{EventBus, RunSubscription};
pub use types::*;
