//! Shared value types.

mod update_rate;

pub use update_rate::UpdateRate;
