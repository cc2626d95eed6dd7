//! Shift tables and scalar reference dedispersion.
//!
//! The reference implementations are layout-exact: they index the packed
//! input and padded output buffers with the same arithmetic the generated
//! kernels bake in as literals, and they are the ground truth for both the
//! test drivers and the autotuner correctness gates.

pub mod compare;
pub mod pack;
pub mod reference;
pub mod shifts;

pub use compare::{approximately_equal, compare_output, ComparisonReport};
pub use pack::{PackedBuffer, SampleValue};
pub use reference::{dedispersion_direct, dedispersion_step_one, dedispersion_step_two};
pub use shifts::{derive_batches, shifts, shifts_step_two, DISPERSION_CONSTANT};
