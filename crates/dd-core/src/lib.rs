//! Core types for the dedispersion engine.
//!
//! Everything the other crates agree on lives here:
//! - the observation descriptor (frequency plan, DM grids, batch sizing,
//!   padding arithmetic),
//! - the type plan (input bit width and scalar types threaded through the
//!   reference implementations and the kernel generator),
//! - the tuning-point configuration (the knob vector driving code generation),
//! - buffer layout arithmetic shared by host and device paths,
//! - driver-side input readers (zapped channels, beam mapping).

pub mod config;
pub mod error;
pub mod io;
pub mod layout;
pub mod observation;
pub mod types;

pub use config::DedispersionConfig;
pub use error::{CoreError, CoreResult};
pub use observation::{pad, DmGrid, Observation};
pub use types::{Mode, ScalarType, TypePlan};
