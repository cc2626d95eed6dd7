//! WGSL kernel-source generator for dedispersion.
//!
//! Three sibling generators emit the accelerator kernels the engine runs:
//! direct, subband step one and subband step two, each with a tile-cache
//! (workgroup memory) and a global-memory mode. Generation is a pure
//! function of the tuning-point configuration, the type plan, the
//! observation and the shift table; every numeric constant is baked into the
//! emitted text as a literal, so the kernels take no shape arguments beyond
//! the device buffers.

mod assemble;
mod fragments;

mod direct;
mod step_one;
mod step_two;

pub use direct::generate_direct;
pub use step_one::generate_step_one;
pub use step_two::generate_step_two;

use dd_core::{CoreError, CoreResult, DedispersionConfig, Mode, Observation, TypePlan};

/// Generate the kernel for a pipeline mode. `shifts` is the channel table
/// for direct and step one, the subband table for step two.
pub fn generate(
    mode: Mode,
    conf: &DedispersionConfig,
    plan: &TypePlan,
    obs: &Observation,
    shifts: &[f32],
) -> CoreResult<String> {
    match mode {
        Mode::SingleStep => generate_direct(conf, plan, obs, shifts),
        Mode::StepOne => generate_step_one(conf, plan, obs, shifts),
        Mode::StepTwo => generate_step_two(conf, plan, obs, shifts),
    }
}

/// Shared configuration checks. `axis` is the summation axis length of the
/// mode: channels, channels per subband, or subbands.
pub(crate) fn validate(
    conf: &DedispersionConfig,
    axis: usize,
    nr_dms: usize,
) -> CoreResult<()> {
    if conf.split_batches {
        return Err(CoreError::Unsupported("split_batches"));
    }
    if conf.threads_d0 == 0
        || conf.threads_d1 == 0
        || conf.items_d0 == 0
        || conf.items_d1 == 0
        || conf.unroll == 0
    {
        return Err(CoreError::InvalidPlan(
            "configuration dimensions must be nonzero".into(),
        ));
    }
    if axis % conf.unroll != 0 {
        return Err(CoreError::InvalidPlan(format!(
            "unroll {} does not divide the summation axis {axis}",
            conf.unroll
        )));
    }
    if nr_dms % conf.block_dms() != 0 {
        return Err(CoreError::InvalidPlan(format!(
            "DM block of {} does not divide {nr_dms} DMs",
            conf.block_dms()
        )));
    }
    Ok(())
}
