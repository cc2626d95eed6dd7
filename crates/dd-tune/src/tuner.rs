//! The tuning session: compile, warm up, time, select.

use thiserror::Error;

use dd_core::io::nr_zapped_channels;
use dd_core::{layout, CoreError, Mode, Observation, TypePlan};
use dd_gpu::{work_sizes, BufferRole, DeviceBuffer, GpuContext, GpuError, Kernel};

use crate::enumerate::{enumerate, TuningBounds};
use crate::stats::RunStats;

#[derive(Error, Debug)]
pub enum TuneError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// One timed candidate.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub conf: dd_core::DedispersionConfig,
    pub gflops: f64,
    /// Mean launch time in seconds.
    pub mean: f64,
    pub std_dev: f64,
    pub cov: f64,
}

/// Everything a tuning run produced.
#[derive(Debug, Default)]
pub struct TuneOutcome {
    pub best: Option<Measurement>,
    pub measurements: Vec<Measurement>,
}

/// Positional argument layout of a mode's kernel.
pub fn roles(mode: Mode) -> &'static [BufferRole] {
    match mode {
        Mode::SingleStep => &[
            BufferRole::ReadOnly,
            BufferRole::WriteOnly,
            BufferRole::ReadOnly,
            BufferRole::ReadOnly,
            BufferRole::ReadOnly,
        ],
        Mode::StepOne => &[
            BufferRole::ReadOnly,
            BufferRole::WriteOnly,
            BufferRole::ReadOnly,
            BufferRole::ReadOnly,
        ],
        Mode::StepTwo => &[
            BufferRole::ReadOnly,
            BufferRole::WriteOnly,
            BufferRole::ReadOnly,
            BufferRole::ReadOnly,
        ],
    }
}

/// Accumulation count of one batch, the numerator of the throughput figure.
pub fn operations(obs: &Observation, mode: Mode, nr_zapped: usize) -> u64 {
    match mode {
        Mode::SingleStep => {
            obs.nr_synthesized_beams() as u64
                * obs.nr_dms(false) as u64
                * (obs.nr_channels() - nr_zapped) as u64
                * obs.nr_samples_per_batch(false) as u64
        }
        Mode::StepOne => {
            obs.nr_beams() as u64
                * obs.nr_dms(true) as u64
                * (obs.nr_channels() - nr_zapped) as u64
                * obs.nr_samples_per_batch(true) as u64
        }
        Mode::StepTwo => {
            obs.nr_synthesized_beams() as u64
                * obs.nr_dms(true) as u64
                * obs.nr_dms(false) as u64
                * obs.nr_subbands() as u64
                * obs.nr_samples_per_batch(false) as u64
        }
    }
}

/// Pick the winner: strictly higher GFLOP/s, ties broken by first-seen.
pub fn select_best(measurements: &[Measurement]) -> Option<Measurement> {
    let mut best: Option<Measurement> = None;
    for m in measurements {
        if best.map_or(true, |b| m.gflops > b.gflops) {
            best = Some(*m);
        }
    }
    best
}

fn session_buffers(
    ctx: &GpuContext,
    obs: &Observation,
    plan: &TypePlan,
    mode: Mode,
    shifts: &[f32],
    zapped: &[u32],
    beam_mapping: &[u32],
) -> Result<Vec<DeviceBuffer>, GpuError> {
    let r = roles(mode);
    let (input_bytes, output_bytes) = match mode {
        Mode::SingleStep => (
            layout::input_len_words(obs, plan, false) * 4,
            layout::dedispersed_len_elems(obs) * 4,
        ),
        Mode::StepOne => (
            layout::input_len_words(obs, plan, true) * 4,
            layout::subbanded_len_elems(obs) * 4,
        ),
        Mode::StepTwo => (
            layout::subbanded_len_elems(obs) * 4,
            layout::step_two_len_elems(obs) * 4,
        ),
    };

    let mut buffers = Vec::new();
    // Timing does not care about input content; a zeroed buffer is enough.
    buffers.push(ctx.create_buffer("dispersed", input_bytes as u64, r[0])?);
    buffers.push(ctx.create_buffer("dedispersed", output_bytes as u64, r[1])?);
    match mode {
        Mode::SingleStep => {
            let mapping = ctx.create_buffer("beam mapping", (beam_mapping.len() * 4) as u64, r[2])?;
            ctx.write_buffer_u32(&mapping, beam_mapping);
            buffers.push(mapping);
            let mask = ctx.create_buffer("zapped channels", (zapped.len() * 4) as u64, r[3])?;
            ctx.write_buffer_u32(&mask, zapped);
            buffers.push(mask);
            let table = ctx.create_buffer("shifts", (shifts.len() * 4) as u64, r[4])?;
            ctx.write_buffer_f32(&table, shifts);
            buffers.push(table);
        }
        Mode::StepOne => {
            let mask = ctx.create_buffer("zapped channels", (zapped.len() * 4) as u64, r[2])?;
            ctx.write_buffer_u32(&mask, zapped);
            buffers.push(mask);
            let table = ctx.create_buffer("shifts", (shifts.len() * 4) as u64, r[3])?;
            ctx.write_buffer_f32(&table, shifts);
            buffers.push(table);
        }
        Mode::StepTwo => {
            let mapping = ctx.create_buffer("beam mapping", (beam_mapping.len() * 4) as u64, r[2])?;
            ctx.write_buffer_u32(&mapping, beam_mapping);
            buffers.push(mapping);
            let table = ctx.create_buffer("shifts", (shifts.len() * 4) as u64, r[3])?;
            ctx.write_buffer_f32(&table, shifts);
            buffers.push(table);
        }
    }
    Ok(buffers)
}

/// Run the search.
///
/// `shifts` is the table of the mode (channel table for direct and step one,
/// subband table for step two); `zapped` and `beam_mapping` are the session's
/// masks. Device buffers are allocated once and reused across candidates;
/// an out-of-memory launch flags them for reinitialisation. Compile and
/// launch failures skip the candidate, fatal device errors abort.
#[allow(clippy::too_many_arguments)]
pub fn tune(
    ctx: &GpuContext,
    obs: &Observation,
    plan: &TypePlan,
    mode: Mode,
    shifts: &[f32],
    zapped: &[u32],
    beam_mapping: &[u32],
    bounds: &TuningBounds,
    nr_iterations: usize,
) -> Result<TuneOutcome, TuneError> {
    let candidates = enumerate(bounds, obs, mode, plan);
    log::info!(
        "tuning {} candidates on {}",
        candidates.len(),
        ctx.device_name()
    );
    let ops = operations(obs, mode, nr_zapped_channels(zapped, obs.nr_channels()));

    let mut buffers = session_buffers(ctx, obs, plan, mode, shifts, zapped, beam_mapping)?;
    let mut reinitialize = false;
    let mut outcome = TuneOutcome::default();

    'candidates: for conf in &candidates {
        if reinitialize {
            buffers = session_buffers(ctx, obs, plan, mode, shifts, zapped, beam_mapping)?;
            reinitialize = false;
        }

        let source = match dd_kernel::generate(mode, conf, plan, obs, shifts) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("generation failed ({conf}): {err}");
                continue;
            }
        };
        let kernel = match Kernel::compile(ctx, &source, mode.entry_point(), roles(mode)) {
            Ok(kernel) => kernel,
            Err(GpuError::Compile(log)) => {
                log::warn!("compilation failed ({conf}): {log}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let refs: Vec<&DeviceBuffer> = buffers.iter().collect();
        let bind = kernel.bind(ctx, &refs);
        let (global, local) = work_sizes(mode, obs, conf);

        let mut stats = RunStats::new();
        // Warm-up, then the timed launches.
        for iteration in 0..=nr_iterations {
            match kernel.run(ctx, &bind, global, local) {
                Ok(elapsed) => {
                    if iteration > 0 {
                        stats.add(elapsed.as_secs_f64());
                    }
                }
                Err(GpuError::OutOfMemory(err)) => {
                    log::warn!("device memory error ({conf}): {err}");
                    reinitialize = true;
                    continue 'candidates;
                }
                Err(GpuError::Launch(err)) => {
                    log::warn!("launch failed ({conf}): {err}");
                    reinitialize = true;
                    continue 'candidates;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let measurement = Measurement {
            conf: *conf,
            gflops: ops as f64 / stats.mean() / 1.0e9,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
            cov: stats.cov(),
        };
        outcome.measurements.push(measurement);
    }

    outcome.best = select_best(&outcome.measurements);
    Ok(outcome)
}
