//! Scalar reference dedispersion: direct, subband step one, subband step two.
//!
//! Each output cell is a left-to-right sum over channels (or subbands) in the
//! intermediate type; the work is parallelised over output rows with rayon,
//! which leaves every cell's summation order identical to a serial run.

use rayon::prelude::*;

use dd_core::layout;
use dd_core::{Observation, ScalarType, TypePlan};

use crate::pack::{word_to_sample, PackedBuffer, SampleValue};

/// Accumulator in the plan's intermediate domain.
#[derive(Debug, Clone, Copy)]
enum Accum {
    F32(f32),
    I32(i32),
    U32(u32),
}

impl Accum {
    fn zero(ty: ScalarType) -> Self {
        match ty {
            ScalarType::F32 => Accum::F32(0.0),
            ScalarType::I32 => Accum::I32(0),
            ScalarType::U32 => Accum::U32(0),
        }
    }

    fn add(&mut self, value: SampleValue) {
        match self {
            Accum::F32(acc) => *acc += value.to_f32(),
            Accum::I32(acc) => *acc = acc.wrapping_add(value.to_i32()),
            Accum::U32(acc) => *acc = acc.wrapping_add(value.to_u32()),
        }
    }

    /// Cast to the output type and return the raw device word. Float to
    /// integer truncates toward zero; integer to float widens.
    fn encode(self, output: ScalarType) -> u32 {
        match (self, output) {
            (Accum::F32(v), ScalarType::F32) => v.to_bits(),
            (Accum::F32(v), ScalarType::I32) => (v as i32) as u32,
            (Accum::F32(v), ScalarType::U32) => v as u32,
            (Accum::I32(v), ScalarType::F32) => (v as f32).to_bits(),
            (Accum::I32(v), _) => v as u32,
            (Accum::U32(v), ScalarType::F32) => (v as f32).to_bits(),
            (Accum::U32(v), _) => v,
        }
    }
}

/// Integer sample delay for one DM value and one delay coefficient.
#[inline]
fn delay(dm_value: f32, coefficient: f32) -> usize {
    (dm_value * coefficient) as usize
}

/// Direct dedispersion over the fine DM grid.
///
/// Output is indexed `[synthesized beam][dm][sample]` with padded rows; its
/// length must be `layout::dedispersed_len_elems`.
pub fn dedispersion_direct(
    obs: &Observation,
    plan: &TypePlan,
    zapped: &[u32],
    beam_mapping: &[u32],
    input: &PackedBuffer,
    shifts: &[f32],
    output: &mut [u32],
) {
    assert_eq!(output.len(), layout::dedispersed_len_elems(obs));
    let out_row = layout::output_row_elems(obs, false);
    let samples = obs.nr_samples_per_batch(false) / obs.downsampling();
    let grid = *obs.dms(false);
    let padded_channels = obs.padded_nr_channels();

    output
        .par_chunks_mut(out_row)
        .enumerate()
        .for_each(|(row, out)| {
            let sbeam = row / grid.count;
            let dm = row % grid.count;
            let dm_value = grid.value(dm);
            for (sample, cell) in out.iter_mut().enumerate().take(samples) {
                let mut sum = Accum::zero(plan.intermediate);
                for channel in 0..obs.nr_channels() {
                    if zapped[channel] != 0 {
                        continue;
                    }
                    let shift = delay(dm_value, shifts[channel]);
                    let beam = beam_mapping[(sbeam * padded_channels) + channel] as usize;
                    let in_row = (beam * obs.nr_channels()) + channel;
                    sum.add(input.sample_value(in_row, sample + shift, plan.input));
                }
                *cell = sum.encode(plan.output);
            }
        });
}

/// Subband dedispersion, step one: reduce channels to subbands on the coarse
/// DM grid. Output is indexed `[beam][coarse dm][subband][sample]`.
///
/// Shifts are relative to each channel's subband high edge, so a subband is
/// aligned internally while the residual inter-subband delay is left for step
/// two.
pub fn dedispersion_step_one(
    obs: &Observation,
    plan: &TypePlan,
    zapped: &[u32],
    input: &PackedBuffer,
    shifts: &[f32],
    output: &mut [u32],
) {
    assert_eq!(output.len(), layout::subbanded_len_elems(obs));
    let out_row = layout::subbanded_row_elems(obs);
    let samples = obs.nr_samples_per_batch(true) / obs.downsampling();
    let grid = *obs.dms(true);
    let cps = obs.nr_channels_per_subband();

    output
        .par_chunks_mut(out_row)
        .enumerate()
        .for_each(|(row, out)| {
            let beam = row / (grid.count * obs.nr_subbands());
            let dm = (row / obs.nr_subbands()) % grid.count;
            let subband = row % obs.nr_subbands();
            let dm_value = grid.value(dm);
            let edge = shifts[((subband + 1) * cps) - 1];
            for (sample, cell) in out.iter_mut().enumerate().take(samples) {
                let mut sum = Accum::zero(plan.intermediate);
                for channel in subband * cps..(subband + 1) * cps {
                    if zapped[channel] != 0 {
                        continue;
                    }
                    let shift = delay(dm_value, shifts[channel] - edge);
                    let in_row = (beam * obs.nr_channels()) + channel;
                    sum.add(input.sample_value(in_row, sample + shift, plan.input));
                }
                *cell = sum.encode(plan.output);
            }
        });
}

/// Subband dedispersion, step two: sweep the fine DM grid over the subbanded
/// series. Input and output both carry the plan's output type, with the
/// summation done in the intermediate type; output is indexed
/// `[synthesized beam][coarse dm * fine count + fine dm][sample]`.
pub fn dedispersion_step_two(
    obs: &Observation,
    plan: &TypePlan,
    beam_mapping: &[u32],
    subbanded: &[u32],
    shifts_step_two: &[f32],
    output: &mut [u32],
) {
    assert_eq!(subbanded.len(), layout::subbanded_len_elems(obs));
    assert_eq!(output.len(), layout::step_two_len_elems(obs));
    let out_row = layout::output_row_elems(obs, false);
    let in_row = layout::subbanded_row_elems(obs);
    let samples = obs.nr_samples_per_batch(false) / obs.downsampling();
    let fine = *obs.dms(false);
    let nr_coarse = obs.nr_dms(true);
    let padded_subbands = obs.padded_nr_subbands();

    output
        .par_chunks_mut(out_row)
        .enumerate()
        .for_each(|(row, out)| {
            let sbeam = row / (nr_coarse * fine.count);
            let coarse_dm = (row / fine.count) % nr_coarse;
            let dm = row % fine.count;
            let dm_value = fine.value(dm);
            for (sample, cell) in out.iter_mut().enumerate().take(samples) {
                let mut sum = Accum::zero(plan.intermediate);
                for subband in 0..obs.nr_subbands() {
                    let shift = delay(dm_value, shifts_step_two[subband]);
                    let beam = beam_mapping[(sbeam * padded_subbands) + subband] as usize;
                    let index = (beam * layout::subbanded_beam_elems(obs))
                        + (coarse_dm * obs.nr_subbands() * in_row)
                        + (subband * in_row)
                        + sample
                        + shift;
                    sum.add(word_to_sample(subbanded[index], plan.output));
                }
                *cell = sum.encode(plan.output);
            }
        });
}
