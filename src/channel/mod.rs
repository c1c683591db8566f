//! Channel lifecycle: deployment states, the per-channel state machine and
//! the manager that owns every deployed channel.

pub mod controller;
pub mod manager;
pub mod state;

pub use controller::{ChannelStateMachine, StateTransition, WorkGuard};
pub use manager::{ChannelManager, ChannelSummary, DeployedChannel};
pub use state::DeployedState;
