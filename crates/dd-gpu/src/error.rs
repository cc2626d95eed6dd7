//! Device error classes.
//!
//! The autotuner treats these by class: compile failures and launch errors
//! skip the candidate, out-of-memory marks the session buffers for
//! reinitialisation, fatal errors abort the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("GPU initialization failed: {0}")]
    Init(String),

    #[error("Kernel compilation failed: {0}")]
    Compile(String),

    #[error("Device out of memory: {0}")]
    OutOfMemory(String),

    #[error("Kernel launch failed: {0}")]
    Launch(String),

    #[error("Fatal device error: {0}")]
    Fatal(String),
}

pub type GpuResult<T> = Result<T, GpuError>;
