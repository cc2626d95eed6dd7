//! Shared argument structures and setup helpers for the driver binaries.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use dd_core::io::{generate_beam_mapping, read_zapped_channels};
use dd_core::{Mode, Observation, ScalarType, TypePlan};
use dd_dsp::{derive_batches, PackedBuffer};

/// Observation plan flags shared by all drivers.
#[derive(Args, Debug, Clone)]
pub struct ObservationArgs {
    /// Physical beams in the input
    #[arg(long, default_value_t = 1)]
    pub beams: usize,

    /// Synthesized beams in the output
    #[arg(long, default_value_t = 1)]
    pub synthesized_beams: usize,

    /// Output samples per batch
    #[arg(long)]
    pub samples: usize,

    /// Downsampling factor
    #[arg(long, default_value_t = 1)]
    pub downsampling: usize,

    /// Row padding in bytes
    #[arg(long, default_value_t = 128)]
    pub padding: usize,

    /// Frequency channels
    #[arg(long)]
    pub channels: usize,

    /// Subbands (must divide the channels)
    #[arg(long, default_value_t = 1)]
    pub subbands: usize,

    /// Centre frequency of the lowest channel, MHz
    #[arg(long)]
    pub min_freq: f32,

    /// Channel bandwidth, MHz
    #[arg(long)]
    pub channel_bandwidth: f32,

    /// Fine DM grid: count
    #[arg(long)]
    pub dms: usize,

    /// Fine DM grid: first value
    #[arg(long, default_value_t = 0.0)]
    pub dm_first: f32,

    /// Fine DM grid: step
    #[arg(long, default_value_t = 0.0)]
    pub dm_step: f32,

    /// Coarse (subbanding) DM grid: count
    #[arg(long, default_value_t = 1)]
    pub subbanding_dms: usize,

    /// Coarse DM grid: first value
    #[arg(long, default_value_t = 0.0)]
    pub subbanding_dm_first: f32,

    /// Coarse DM grid: step
    #[arg(long, default_value_t = 0.0)]
    pub subbanding_dm_step: f32,
}

impl ObservationArgs {
    pub fn build(&self) -> Result<Observation> {
        let mut obs = Observation::new(
            self.beams,
            self.synthesized_beams,
            self.samples,
            self.downsampling,
            self.padding,
        )?;
        obs.set_frequency_range(
            self.subbands,
            self.channels,
            self.min_freq,
            self.channel_bandwidth,
        )?;
        obs.set_dm_range(self.dms, self.dm_first, self.dm_step, false);
        obs.set_dm_range(
            self.subbanding_dms,
            self.subbanding_dm_first,
            self.subbanding_dm_step,
            true,
        );
        Ok(obs)
    }
}

/// Type plan flags.
#[derive(Args, Debug, Clone)]
pub struct TypePlanArgs {
    /// Input sample width in bits (1, 2, 4, 8, 16 or 32)
    #[arg(long, default_value_t = 8)]
    pub input_bits: u8,

    /// Input scalar type (f32, i32, u32)
    #[arg(long, default_value = "u32")]
    pub input_type: ScalarType,

    /// Accumulator scalar type
    #[arg(long, default_value = "f32")]
    pub intermediate_type: ScalarType,

    /// Output scalar type
    #[arg(long, default_value = "f32")]
    pub output_type: ScalarType,
}

impl TypePlanArgs {
    pub fn build(&self) -> Result<TypePlan> {
        Ok(TypePlan::new(
            self.input_bits,
            self.input_type,
            self.intermediate_type,
            self.output_type,
        )?)
    }
}

/// Mutually exclusive pipeline mode selectors.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ModeArgs {
    /// Direct dedispersion
    #[arg(long)]
    pub single_step: bool,

    /// Subband dedispersion, first step
    #[arg(long)]
    pub step_one: bool,

    /// Subband dedispersion, second step
    #[arg(long)]
    pub step_two: bool,
}

impl ModeArgs {
    pub fn mode(&self) -> Mode {
        if self.single_step {
            Mode::SingleStep
        } else if self.step_one {
            Mode::StepOne
        } else {
            Mode::StepTwo
        }
    }
}

/// Tuning-point configuration flags for the test driver.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, default_value_t = 32)]
    pub threads_d0: usize,

    #[arg(long, default_value_t = 1)]
    pub threads_d1: usize,

    #[arg(long, default_value_t = 1)]
    pub items_d0: usize,

    #[arg(long, default_value_t = 1)]
    pub items_d1: usize,

    #[arg(long, default_value_t = 1)]
    pub unroll: usize,

    /// Use the on-chip tile cache
    #[arg(long)]
    pub local: bool,
}

impl ConfigArgs {
    pub fn build(&self) -> dd_core::DedispersionConfig {
        dd_core::DedispersionConfig {
            threads_d0: self.threads_d0,
            threads_d1: self.threads_d1,
            items_d0: self.items_d0,
            items_d1: self.items_d1,
            unroll: self.unroll,
            local_mem: self.local,
            ..Default::default()
        }
    }
}

/// One prepared pipeline: observation with derived batch sizes, shift
/// tables, masks and mappings.
pub struct Pipeline {
    pub obs: Observation,
    pub plan: TypePlan,
    pub mode: Mode,
    pub shifts_channel: Vec<f32>,
    pub shifts_subband: Vec<f32>,
    pub zapped: Vec<u32>,
    pub beam_mapping: Vec<u32>,
}

impl Pipeline {
    pub fn prepare(
        observation: &ObservationArgs,
        plan: &TypePlanArgs,
        mode: Mode,
        zapped_channels: Option<&PathBuf>,
    ) -> Result<Self> {
        let mut obs = observation.build()?;
        let plan = plan.build()?;
        let (shifts_channel, shifts_subband) = derive_batches(&mut obs, mode);
        let zapped = match zapped_channels {
            Some(path) => read_zapped_channels(path, &obs)?,
            None => vec![0u32; obs.padded_nr_channels()],
        };
        let beam_mapping = generate_beam_mapping(&obs, mode == Mode::StepTwo);
        Ok(Self {
            obs,
            plan,
            mode,
            shifts_channel,
            shifts_subband,
            zapped,
            beam_mapping,
        })
    }

    /// The shift table driving this mode's kernel.
    pub fn shifts(&self) -> &[f32] {
        match self.mode {
            Mode::SingleStep | Mode::StepOne => &self.shifts_channel,
            Mode::StepTwo => &self.shifts_subband,
        }
    }
}

/// Fill a dispersed-input buffer: seeded random samples, or the sample index
/// modulo the representable range when no seed is given.
pub fn generate_input(
    obs: &Observation,
    plan: &TypePlan,
    coarse: bool,
    seed: Option<u64>,
) -> PackedBuffer {
    let mut rng = seed.map(ChaCha8Rng::seed_from_u64);
    let mut input = PackedBuffer::for_input(obs, plan, coarse);
    let range = 1u64 << plan.input_bits.min(8);
    for row in 0..obs.nr_beams() * obs.nr_channels() {
        for sample in 0..obs.nr_samples_per_dispersed_batch(coarse) {
            let raw = match (&mut rng, plan.input.is_float()) {
                (Some(rng), true) => rng.random::<f32>().to_bits(),
                (Some(rng), false) => rng.random_range(0..range) as u32,
                (None, true) => (sample as f32).to_bits(),
                (None, false) => (sample as u64 % range) as u32,
            };
            input.set(row, sample, raw);
        }
    }
    input
}

/// Random subbanded data for the step-two test path.
pub fn generate_subbanded(obs: &Observation, plan: &TypePlan, seed: u64) -> Vec<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..dd_core::layout::subbanded_len_elems(obs))
        .map(|_| match plan.output {
            ScalarType::F32 => (rng.random::<f32>() * 128.0).to_bits(),
            _ => rng.random_range(0..1024u32),
        })
        .collect()
}
