//! Buffer layout arithmetic shared by the reference implementations, the
//! kernel generator and the device drivers.
//!
//! All device buffers are 32-bit word granular. Input samples are packed into
//! little-endian `u32` words, MSB-first within each byte for sub-byte widths;
//! every row (one channel of one beam) is padded so its byte length is a
//! multiple of the observation padding. Keeping these formulas in one place
//! is what makes the generated kernels and the scalar references agree on
//! every index.

use crate::observation::{pad, Observation};
use crate::types::TypePlan;

/// Bytes per input row (one channel of one beam), padded.
/// `coarse` selects the subband pipeline's dispersed batch length.
pub fn input_row_bytes(obs: &Observation, plan: &TypePlan, coarse: bool) -> usize {
    let samples = obs.nr_samples_per_dispersed_batch(coarse);
    let bytes = (samples * plan.input_bits as usize).div_ceil(8);
    pad(bytes, obs.padding())
}

/// Words per input row.
pub fn input_row_words(obs: &Observation, plan: &TypePlan, coarse: bool) -> usize {
    input_row_bytes(obs, plan, coarse) / 4
}

/// Words per input beam (all channels of one physical beam).
pub fn input_beam_words(obs: &Observation, plan: &TypePlan, coarse: bool) -> usize {
    obs.nr_channels() * input_row_words(obs, plan, coarse)
}

/// Total dispersed-input length in words.
pub fn input_len_words(obs: &Observation, plan: &TypePlan, coarse: bool) -> usize {
    obs.nr_beams() * input_beam_words(obs, plan, coarse)
}

/// Elements per output row, padded; all output elements are 4 bytes.
pub fn output_row_elems(obs: &Observation, coarse: bool) -> usize {
    obs.padded(obs.nr_samples_per_batch(coarse) / obs.downsampling(), 4)
}

/// Total direct/step-two dedispersed output length in elements.
pub fn dedispersed_len_elems(obs: &Observation) -> usize {
    obs.nr_synthesized_beams() * obs.nr_dms(false) * output_row_elems(obs, false)
}

/// Elements per subbanded row (one subband, one coarse DM, one beam).
pub fn subbanded_row_elems(obs: &Observation) -> usize {
    output_row_elems(obs, true)
}

/// Elements per physical beam of the subbanded buffer.
pub fn subbanded_beam_elems(obs: &Observation) -> usize {
    obs.nr_dms(true) * obs.nr_subbands() * subbanded_row_elems(obs)
}

/// Total subbanded (step-one output, step-two input) length in elements.
pub fn subbanded_len_elems(obs: &Observation) -> usize {
    obs.nr_beams() * subbanded_beam_elems(obs)
}

/// Total step-two output length in elements; the DM axis is the cartesian
/// product `coarse x fine`.
pub fn step_two_len_elems(obs: &Observation) -> usize {
    obs.nr_synthesized_beams() * obs.nr_dms(true) * obs.nr_dms(false) * output_row_elems(obs, false)
}
