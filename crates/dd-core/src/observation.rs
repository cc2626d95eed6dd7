//! Observation descriptor: frequency plan, DM grids, batch sizing, padding.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Round `n` up to the next multiple of `unit`.
pub fn pad(n: usize, unit: usize) -> usize {
    debug_assert!(unit > 0);
    n.div_ceil(unit) * unit
}

/// A trial dispersion-measure grid: `count` values `first + i * step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DmGrid {
    pub count: usize,
    pub first: f32,
    pub step: f32,
}

impl DmGrid {
    pub fn new(count: usize, first: f32, step: f32) -> Self {
        Self { count, first, step }
    }

    /// DM value at grid index `i`.
    pub fn value(&self, i: usize) -> f32 {
        self.first + (i as f32 * self.step)
    }

    /// Highest DM value on the grid.
    pub fn last(&self) -> f32 {
        if self.count == 0 {
            self.first
        } else {
            self.value(self.count - 1)
        }
    }
}

/// Immutable-after-setup description of one observation.
///
/// Construction happens in two phases, mirroring the drivers: `new` fixes the
/// batching parameters, then `set_frequency_range` / `set_dm_range` fill in
/// the plan, and finally the dispersed batch lengths are derived from the
/// shift table. After that the descriptor is only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    nr_beams: usize,
    nr_synthesized_beams: usize,
    nr_samples_per_batch: usize,
    nr_samples_per_batch_coarse: usize,
    nr_samples_per_dispersed_batch: usize,
    nr_samples_per_dispersed_batch_coarse: usize,
    downsampling: usize,
    padding: usize,
    min_freq: f32,
    channel_bandwidth: f32,
    nr_channels: usize,
    nr_subbands: usize,
    dm_fine: DmGrid,
    dm_coarse: DmGrid,
}

impl Observation {
    /// Batching parameters; the frequency and DM plans are set separately.
    ///
    /// `padding` is in bytes and must be a positive multiple of 4 so that
    /// padded rows stay word-aligned in the packed device layout.
    pub fn new(
        nr_beams: usize,
        nr_synthesized_beams: usize,
        nr_samples_per_batch: usize,
        downsampling: usize,
        padding: usize,
    ) -> CoreResult<Self> {
        if nr_beams == 0 || nr_samples_per_batch == 0 {
            return Err(CoreError::InvalidPlan(
                "beams and samples per batch must be nonzero".into(),
            ));
        }
        if downsampling == 0 {
            return Err(CoreError::InvalidPlan("downsampling must be >= 1".into()));
        }
        if padding == 0 || padding % 4 != 0 {
            return Err(CoreError::InvalidPlan(format!(
                "padding must be a positive multiple of 4 bytes, got {padding}"
            )));
        }
        Ok(Self {
            nr_beams,
            nr_synthesized_beams,
            nr_samples_per_batch,
            nr_samples_per_batch_coarse: nr_samples_per_batch,
            nr_samples_per_dispersed_batch: nr_samples_per_batch,
            nr_samples_per_dispersed_batch_coarse: nr_samples_per_batch,
            downsampling,
            padding,
            min_freq: 0.0,
            channel_bandwidth: 0.0,
            nr_channels: 0,
            nr_subbands: 0,
            dm_fine: DmGrid::default(),
            dm_coarse: DmGrid::default(),
        })
    }

    /// Set the frequency plan. `nr_subbands` must divide `nr_channels`.
    pub fn set_frequency_range(
        &mut self,
        nr_subbands: usize,
        nr_channels: usize,
        min_freq: f32,
        channel_bandwidth: f32,
    ) -> CoreResult<()> {
        if nr_channels == 0 || nr_subbands == 0 {
            return Err(CoreError::InvalidPlan(
                "channels and subbands must be nonzero".into(),
            ));
        }
        if nr_channels % nr_subbands != 0 {
            return Err(CoreError::InvalidPlan(format!(
                "{nr_subbands} subbands do not divide {nr_channels} channels"
            )));
        }
        if channel_bandwidth <= 0.0 || min_freq <= 0.0 {
            return Err(CoreError::InvalidPlan(
                "frequencies and bandwidth must be positive".into(),
            ));
        }
        self.nr_subbands = nr_subbands;
        self.nr_channels = nr_channels;
        self.min_freq = min_freq;
        self.channel_bandwidth = channel_bandwidth;
        Ok(())
    }

    /// Set a DM grid; `coarse` selects the subbanding grid.
    pub fn set_dm_range(&mut self, count: usize, first: f32, step: f32, coarse: bool) {
        let grid = DmGrid::new(count, first, step);
        if coarse {
            self.dm_coarse = grid;
        } else {
            self.dm_fine = grid;
        }
    }

    /// Set the coarse (subbanded) batch length; used by the subband pipeline
    /// setup once the step-two shift range is known.
    pub fn set_nr_samples_per_batch_coarse(&mut self, n: usize) {
        self.nr_samples_per_batch_coarse = n;
    }

    /// Set a dispersed batch length, derived from the shift table maximum.
    pub fn set_nr_samples_per_dispersed_batch(&mut self, n: usize, coarse: bool) {
        if coarse {
            self.nr_samples_per_dispersed_batch_coarse = n;
        } else {
            self.nr_samples_per_dispersed_batch = n;
        }
    }

    pub fn nr_beams(&self) -> usize {
        self.nr_beams
    }

    pub fn nr_synthesized_beams(&self) -> usize {
        self.nr_synthesized_beams
    }

    pub fn nr_channels(&self) -> usize {
        self.nr_channels
    }

    pub fn nr_subbands(&self) -> usize {
        self.nr_subbands
    }

    pub fn nr_channels_per_subband(&self) -> usize {
        self.nr_channels / self.nr_subbands
    }

    pub fn min_freq(&self) -> f32 {
        self.min_freq
    }

    pub fn channel_bandwidth(&self) -> f32 {
        self.channel_bandwidth
    }

    /// Centre frequency of the highest channel.
    pub fn max_freq(&self) -> f32 {
        self.min_freq + self.channel_bandwidth * (self.nr_channels as f32 - 1.0)
    }

    /// Distance between consecutive subband centre frequencies.
    pub fn subband_bandwidth(&self) -> f32 {
        self.channel_bandwidth * self.nr_channels_per_subband() as f32
    }

    /// Centre frequency of the lowest subband.
    pub fn subband_min_freq(&self) -> f32 {
        self.min_freq + self.channel_bandwidth * ((self.nr_channels_per_subband() as f32 - 1.0) / 2.0)
    }

    /// Centre frequency of the highest subband.
    pub fn subband_max_freq(&self) -> f32 {
        self.subband_min_freq() + self.subband_bandwidth() * (self.nr_subbands as f32 - 1.0)
    }

    /// DM grid; `coarse` selects the subbanding grid.
    pub fn dms(&self, coarse: bool) -> &DmGrid {
        if coarse {
            &self.dm_coarse
        } else {
            &self.dm_fine
        }
    }

    pub fn nr_dms(&self, coarse: bool) -> usize {
        self.dms(coarse).count
    }

    /// Output samples per work unit; `coarse` selects the subbanded batch.
    pub fn nr_samples_per_batch(&self, coarse: bool) -> usize {
        if coarse {
            self.nr_samples_per_batch_coarse
        } else {
            self.nr_samples_per_batch
        }
    }

    /// Input samples per work unit, including the dispersion overlap.
    pub fn nr_samples_per_dispersed_batch(&self, coarse: bool) -> usize {
        if coarse {
            self.nr_samples_per_dispersed_batch_coarse
        } else {
            self.nr_samples_per_dispersed_batch
        }
    }

    pub fn downsampling(&self) -> usize {
        self.downsampling
    }

    /// Padding in bytes; every row stride is a multiple of this.
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Round an element count up so its byte length hits the padding boundary.
    pub fn padded(&self, n: usize, elem_size: usize) -> usize {
        pad(n, self.padding / elem_size)
    }

    /// Channel-axis length padded for 4-byte elements (shifts, masks, maps).
    pub fn padded_nr_channels(&self) -> usize {
        self.padded(self.nr_channels, 4)
    }

    /// Subband-axis length padded for 4-byte elements.
    pub fn padded_nr_subbands(&self) -> usize {
        self.padded(self.nr_subbands, 4)
    }
}
