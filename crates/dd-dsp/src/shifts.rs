//! Time-delay coefficients from the cold-plasma dispersion law.

use dd_core::{Mode, Observation};

/// Dispersion constant, MHz^2 pc^-1 cm^3 s.
pub const DISPERSION_CONSTANT: f32 = 4148.808;

/// Per-channel delay coefficients, relative to the highest channel.
///
/// The integer sample delay at DM value `d` for channel `c` is
/// `floor(shifts[c] * d)`. The table has the padded channel length and the
/// top channel is exactly 0.
pub fn shifts(obs: &Observation) -> Vec<f32> {
    let inverse_high_freq = 1.0 / (obs.max_freq() * obs.max_freq());
    let mut table = vec![0.0f32; obs.padded_nr_channels()];
    for (channel, entry) in table.iter_mut().enumerate().take(obs.nr_channels() - 1) {
        let freq = obs.min_freq() + (channel as f32 * obs.channel_bandwidth());
        let inverse_freq = 1.0 / (freq * freq);
        *entry = DISPERSION_CONSTANT
            * (inverse_freq - inverse_high_freq)
            * obs.nr_samples_per_batch(false) as f32;
    }
    table
}

/// Per-subband delay coefficients for the second subbanding step, computed
/// from the subband centre frequencies.
pub fn shifts_step_two(obs: &Observation) -> Vec<f32> {
    let inverse_high_freq = 1.0 / (obs.subband_max_freq() * obs.subband_max_freq());
    let mut table = vec![0.0f32; obs.padded_nr_subbands()];
    for (subband, entry) in table.iter_mut().enumerate().take(obs.nr_subbands() - 1) {
        let freq = obs.subband_min_freq() + (subband as f32 * obs.subband_bandwidth());
        let inverse_freq = 1.0 / (freq * freq);
        *entry = DISPERSION_CONSTANT
            * (inverse_freq - inverse_high_freq)
            * obs.nr_samples_per_batch(false) as f32;
    }
    table
}

/// Derive the dispersed batch lengths from the shift tables and store them on
/// the observation; returns the channel and subband tables.
///
/// The largest shift in each table belongs to the lowest channel (index 0),
/// so the overlap needed by a batch is `floor(shifts[0] * last_dm)` of the
/// grid that drives the summation.
pub fn derive_batches(obs: &mut Observation, mode: Mode) -> (Vec<f32>, Vec<f32>) {
    let channel_table = shifts(obs);
    let subband_table = shifts_step_two(obs);
    match mode {
        Mode::SingleStep => {
            let overlap = (channel_table[0] * obs.dms(false).last()) as usize;
            obs.set_nr_samples_per_dispersed_batch(obs.nr_samples_per_batch(false) + overlap, false);
        }
        Mode::StepOne => {
            let residual = (subband_table[0] * obs.dms(false).last()) as usize;
            obs.set_nr_samples_per_batch_coarse(obs.nr_samples_per_batch(false) + residual);
            let overlap = (channel_table[0] * obs.dms(true).last()) as usize;
            obs.set_nr_samples_per_dispersed_batch(obs.nr_samples_per_batch(true) + overlap, true);
        }
        Mode::StepTwo => {
            let residual = (subband_table[0] * obs.dms(false).last()) as usize;
            obs.set_nr_samples_per_batch_coarse(obs.nr_samples_per_batch(false) + residual);
        }
    }
    (channel_table, subband_table)
}
