//! Data models for positions and webhook signals.

mod position;
mod signal;

pub use position::{PositionSide, PositionState};
pub use signal::{Signal, SignalAction, WebhookRequest};
