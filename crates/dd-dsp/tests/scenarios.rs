//! End-to-end scenarios for the reference implementations.

use approx::assert_relative_eq;
use dd_core::io::generate_beam_mapping;
use dd_core::{layout, Mode, Observation, ScalarType, TypePlan};
use dd_dsp::{
    compare_output, dedispersion_direct, dedispersion_step_one, dedispersion_step_two,
    derive_batches, PackedBuffer,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn observation(
    channels: usize,
    subbands: usize,
    samples: usize,
    min_freq: f32,
    channel_bw: f32,
) -> Observation {
    let mut obs = Observation::new(1, 1, samples, 1, 32).unwrap();
    obs.set_frequency_range(subbands, channels, min_freq, channel_bw)
        .unwrap();
    obs
}

fn out_cell(output: &[u32], obs: &Observation, dm: usize, sample: usize) -> f32 {
    let row = layout::output_row_elems(obs, false);
    f32::from_bits(output[dm * row + sample])
}

/// Ramp input `input[c][t] = t`: at DM index d every cell is the channel-wise
/// sum of `t + shift_c(d)`.
#[test]
fn ramp_input_matches_channel_sums() {
    let mut obs = observation(8, 8, 32, 1000.0, 1.0);
    obs.set_dm_range(4, 0.0, 0.5, false);
    let plan = TypePlan {
        input_bits: 16,
        input: ScalarType::U32,
        intermediate: ScalarType::F32,
        output: ScalarType::F32,
    };
    let (shifts, _) = derive_batches(&mut obs, Mode::SingleStep);
    let zapped = vec![0u32; obs.padded_nr_channels()];
    let mapping = generate_beam_mapping(&obs, false);
    let mut input = PackedBuffer::for_input(&obs, &plan, false);
    for channel in 0..8 {
        for t in 0..obs.nr_samples_per_dispersed_batch(false) {
            input.set(channel, t, t as u32);
        }
    }
    let mut output = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(&obs, &plan, &zapped, &mapping, &input, &shifts, &mut output);

    for dm in 0..4 {
        let dm_value = obs.dms(false).value(dm);
        for t in 0..32 {
            let expected: f32 = (0..8)
                .map(|c| (t + (dm_value * shifts[c]) as usize) as f32)
                .sum();
            assert_relative_eq!(out_cell(&output, &obs, dm, t), expected, max_relative = 1.0e-6);
        }
    }
    // DM 0 in particular is 8 * t.
    for t in 0..32 {
        assert_eq!(out_cell(&output, &obs, 0, t), 8.0 * t as f32);
    }
}

/// Zapping one channel subtracts exactly its contribution.
#[test]
fn zapping_removes_single_channel() {
    let mut obs = observation(8, 8, 32, 1000.0, 1.0);
    obs.set_dm_range(4, 0.0, 0.5, false);
    let plan = TypePlan {
        input_bits: 16,
        input: ScalarType::U32,
        intermediate: ScalarType::F32,
        output: ScalarType::F32,
    };
    let (shifts, _) = derive_batches(&mut obs, Mode::SingleStep);
    let mapping = generate_beam_mapping(&obs, false);
    let mut input = PackedBuffer::for_input(&obs, &plan, false);
    for channel in 0..8 {
        for t in 0..obs.nr_samples_per_dispersed_batch(false) {
            input.set(channel, t, t as u32);
        }
    }
    let zapped = vec![0u32; obs.padded_nr_channels()];
    let mut full = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(&obs, &plan, &zapped, &mapping, &input, &shifts, &mut full);

    let mut mask = zapped.clone();
    mask[3] = 1;
    let mut masked = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(&obs, &plan, &mask, &mapping, &input, &shifts, &mut masked);

    for dm in 0..4 {
        let dm_value = obs.dms(false).value(dm);
        for t in 0..32 {
            let channel3 = (t + (dm_value * shifts[3]) as usize) as f32;
            let difference = out_cell(&full, &obs, dm, t) - out_cell(&masked, &obs, dm, t);
            assert_eq!(difference, channel3);
        }
    }
}

/// A pulse injected at each channel's dispersion delay peaks at t = 0 for the
/// matching trial DM.
#[test]
fn aligned_pulse_peaks_at_matching_dm() {
    let mut obs = observation(16, 16, 512, 45.0, 0.25);
    obs.set_dm_range(4, 0.0, 1.0, false);
    let plan = TypePlan::unsigned_byte();
    let (shifts, _) = derive_batches(&mut obs, Mode::SingleStep);
    let zapped = vec![0u32; obs.padded_nr_channels()];
    let mapping = generate_beam_mapping(&obs, false);

    let trial = 2;
    let dm_value = obs.dms(false).value(trial);
    // Low band, real delays: the lowest channel lags by hundreds of samples.
    assert!((dm_value * shifts[0]) as usize > 100);

    let mut input = PackedBuffer::for_input(&obs, &plan, false);
    for channel in 0..16 {
        input.set(channel, (dm_value * shifts[channel]) as usize, 1);
    }
    let mut output = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(&obs, &plan, &zapped, &mapping, &input, &shifts, &mut output);

    assert_eq!(out_cell(&output, &obs, trial, 0), 16.0);
    // Off-DM trials smear the pulse; no other cell reaches the full sum.
    for dm in 0..4 {
        if dm == trial {
            continue;
        }
        for t in 0..obs.nr_samples_per_batch(false) {
            assert!(out_cell(&output, &obs, dm, t) < 16.0, "dm {dm} t {t}");
        }
    }
}

/// With a trivial coarse grid and negligible intra-band dispersion, the
/// two-step pipeline reproduces the direct answer.
#[test]
fn two_step_matches_direct_on_trivial_coarse_grid() {
    let samples = 64;
    let mut direct_obs = observation(32, 4, samples, 1400.0, 0.01);
    direct_obs.set_dm_range(8, 0.0, 0.25, false);
    direct_obs.set_dm_range(1, 0.0, 0.0, true);
    let plan = TypePlan::float();
    let (shifts, _) = derive_batches(&mut direct_obs, Mode::SingleStep);

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let dispersed = direct_obs.nr_samples_per_dispersed_batch(false);
    let data: Vec<f32> = (0..32 * (dispersed + samples))
        .map(|_| rng.random::<f32>())
        .collect();

    // Direct path.
    let zapped = vec![0u32; direct_obs.padded_nr_channels()];
    let mapping = generate_beam_mapping(&direct_obs, false);
    let mut input = PackedBuffer::for_input(&direct_obs, &plan, false);
    for channel in 0..32 {
        for t in 0..dispersed {
            input.set(channel, t, data[channel * (dispersed + samples) + t].to_bits());
        }
    }
    let mut direct = vec![0u32; layout::dedispersed_len_elems(&direct_obs)];
    dedispersion_direct(
        &direct_obs, &plan, &zapped, &mapping, &input, &shifts, &mut direct,
    );

    // Subband path over the same data.
    let mut sub_obs = observation(32, 4, samples, 1400.0, 0.01);
    sub_obs.set_dm_range(8, 0.0, 0.25, false);
    sub_obs.set_dm_range(1, 0.0, 0.0, true);
    let (shifts_one, shifts_two) = derive_batches(&mut sub_obs, Mode::StepOne);
    let dispersed_coarse = sub_obs.nr_samples_per_dispersed_batch(true);
    let mut sub_input = PackedBuffer::for_input(&sub_obs, &plan, true);
    for channel in 0..32 {
        for t in 0..dispersed_coarse {
            sub_input.set(channel, t, data[channel * (dispersed + samples) + t].to_bits());
        }
    }
    let mut subbanded = vec![0u32; layout::subbanded_len_elems(&sub_obs)];
    dedispersion_step_one(
        &sub_obs, &plan, &zapped, &sub_input, &shifts_one, &mut subbanded,
    );
    let sub_mapping = generate_beam_mapping(&sub_obs, true);
    let mut two_step = vec![0u32; layout::step_two_len_elems(&sub_obs)];
    dedispersion_step_two(
        &sub_obs, &plan, &sub_mapping, &subbanded, &shifts_two, &mut two_step,
    );

    let report = compare_output(
        &direct,
        &two_step,
        ScalarType::F32,
        8,
        samples,
        layout::output_row_elems(&direct_obs, false),
        1.0e-5,
    );
    assert!(report.passed(), "wrong samples: {}", report.wrong);
}

/// Packing byte-ranged data down to 4 bits must not change the result.
#[test]
fn sub_byte_packing_matches_byte_reference() {
    let mut obs = observation(16, 16, 64, 45.0, 0.25);
    obs.set_dm_range(2, 0.0, 1.0, false);
    let byte_plan = TypePlan::unsigned_byte();
    let nibble_plan = TypePlan::new(
        4,
        ScalarType::U32,
        ScalarType::F32,
        ScalarType::F32,
    )
    .unwrap();
    let (shifts, _) = derive_batches(&mut obs, Mode::SingleStep);
    let zapped = vec![0u32; obs.padded_nr_channels()];
    let mapping = generate_beam_mapping(&obs, false);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let dispersed = obs.nr_samples_per_dispersed_batch(false);
    let mut bytes = PackedBuffer::for_input(&obs, &byte_plan, false);
    let mut nibbles = PackedBuffer::for_input(&obs, &nibble_plan, false);
    for channel in 0..16 {
        for t in 0..dispersed {
            let value = rng.random_range(0..16u32);
            bytes.set(channel, t, value);
            nibbles.set(channel, t, value);
        }
    }

    let mut from_bytes = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(
        &obs, &byte_plan, &zapped, &mapping, &bytes, &shifts, &mut from_bytes,
    );
    let mut from_nibbles = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(
        &obs, &nibble_plan, &zapped, &mapping, &nibbles, &shifts, &mut from_nibbles,
    );
    assert_eq!(from_bytes, from_nibbles);
}

/// Signed sub-byte samples sign-extend before accumulation.
#[test]
fn signed_sub_byte_accumulates_negative_values() {
    let mut obs = observation(4, 4, 16, 1400.0, 0.1);
    obs.set_dm_range(1, 0.0, 0.0, false);
    let plan = TypePlan::new(2, ScalarType::I32, ScalarType::I32, ScalarType::I32).unwrap();
    let (shifts, _) = derive_batches(&mut obs, Mode::SingleStep);
    let zapped = vec![0u32; obs.padded_nr_channels()];
    let mapping = generate_beam_mapping(&obs, false);
    let mut input = PackedBuffer::for_input(&obs, &plan, false);
    for channel in 0..4 {
        for t in 0..obs.nr_samples_per_dispersed_batch(false) {
            input.set(channel, t, 0b11); // -1 in two's complement, 2 bits
        }
    }
    let mut output = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(&obs, &plan, &zapped, &mapping, &input, &shifts, &mut output);
    assert_eq!(output[0] as i32, -4);
}
