//! Autotuner and tuning catalogue.
//!
//! The tuner enumerates every legal tuning-point configuration for a device
//! and an observation, compiles and times the generated kernels, and selects
//! the highest-throughput variant. Winners persist in a line-oriented text
//! catalogue keyed by (device name, DM count).

mod catalogue;
mod enumerate;
mod stats;
mod tuner;

pub use catalogue::{catalogue_key, TunedCatalogue};
pub use enumerate::{enumerate, TuningBounds};
pub use stats::RunStats;
pub use tuner::{operations, roles, select_best, tune, Measurement, TuneError, TuneOutcome};
