//! Controller Event Loop - the adapter between the protocol stack and the
//! policy engine.
//!
//! The protocol stack delivers [`ControllerEvent`]s on a channel;
//! [`Controller`] runs them through the engine on per-switch workers. The
//! replay front end feeds the same loop from JSON lines.

mod controller;
mod replay;

pub use controller::{dispatch, Controller, ControllerEvent};
pub use replay::{run_replay, ReplayEvent, ReplayReport};
