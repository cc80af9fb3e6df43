//! Adaptive polling schedule.
//!
//! Articles are checked often while they are fresh and progressively less as
//! they age:
//!
//! | Tier | Age since first fetch | Re-check interval |
//! |------|-----------------------|-------------------|
//! | 1 | up to 3 hours | every cycle (15 minutes) |
//! | 2 | up to 24 hours | 1 hour |
//! | 3 | up to 48 hours | 8 hours |
//! | 4 | up to 1 week | 1 day |
//! | 5 | up to 4 weeks | 1 week |
//! | 6 | older | 4 weeks |
//!
//! [`tiers`] moves articles down this table, [`due`] decides which ones are
//! fetched in the current cycle.

pub mod due;
pub mod tiers;

pub use due::{DueSet, DueSetCalculator};
pub use tiers::{TierEvaluator, TierUpdate};
