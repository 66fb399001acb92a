//! Exposure limits, cooldowns, and staleness enforcement.
//!
//! The checking logic in [`state`] is synchronous and clock-explicit so
//! it can be tested directly; [`gate`] wraps it in a single-writer task
//! that serializes every mutation.

mod gate;
mod state;

pub use gate::{RiskGate, RiskGateHandle};
pub use state::{RiskLimits, RiskSnapshot, RiskState};
