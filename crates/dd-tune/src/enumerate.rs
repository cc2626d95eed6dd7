//! Candidate enumeration: every legal tuning-point configuration within the
//! search bounds.

use serde::{Deserialize, Serialize};

use dd_core::{DedispersionConfig, Mode, Observation, TypePlan};

/// Bounds of the tuning search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TuningBounds {
    /// Smallest threads_d0 tried; stepped by powers of two up to max_columns.
    pub min_threads: usize,
    /// Upper bound on threads per work-group.
    pub max_threads: usize,
    /// Upper bound on threads_d1.
    pub max_rows: usize,
    /// Upper bound on threads_d0.
    pub max_columns: usize,
    /// Register-pressure budget per work-item.
    pub max_items: usize,
    /// Upper bound on items_d0.
    pub max_sample_items: usize,
    /// Upper bound on items_d1.
    pub max_dm_items: usize,
    /// Upper bound on the channel-loop unroll factor.
    pub max_unroll: usize,
    /// threads_d0 * threads_d1 must be a multiple of this.
    pub vector_width: usize,
}

/// Estimated live registers of one work-item: the shift registers, the
/// accumulators, the mode's base liveness, the tile-cache bookkeeping and the
/// sub-byte unpack temporaries.
fn register_pressure(conf: &DedispersionConfig, mode: Mode, plan: &TypePlan) -> usize {
    let mut items = conf.items_d1 + conf.items_d0 * conf.items_d1;
    items += match mode {
        Mode::SingleStep => 4,
        Mode::StepOne | Mode::StepTwo => 5,
    };
    if conf.local_mem {
        items += 5;
    }
    if plan.sub_byte() {
        items += 4;
    }
    items
}

/// Enumerate all candidate configurations, in a deterministic order.
///
/// The divisibility rules are the mode's: the sample axis must divide by
/// items_d0, the mode's DM count by threads_d1 * items_d1, and the summation
/// axis (channels, channels per subband, or subbands) by the unroll factor.
/// Both memory variants are produced whenever both fit the register budget.
pub fn enumerate(
    bounds: &TuningBounds,
    obs: &Observation,
    mode: Mode,
    plan: &TypePlan,
) -> Vec<DedispersionConfig> {
    let samples = obs.nr_samples_per_batch(mode.coarse());
    let nr_dms = obs.nr_dms(mode.coarse());
    let unroll_axis = match mode {
        Mode::SingleStep => obs.nr_channels(),
        Mode::StepOne => obs.nr_channels_per_subband(),
        Mode::StepTwo => obs.nr_subbands(),
    };

    let mut candidates = Vec::new();
    let mut threads_d0 = bounds.min_threads.max(1);
    while threads_d0 <= bounds.max_columns {
        for threads_d1 in 1..=bounds.max_rows {
            if threads_d0 * threads_d1 > bounds.max_threads {
                break;
            }
            if (threads_d0 * threads_d1) % bounds.vector_width != 0 {
                continue;
            }
            for items_d0 in 1..=bounds.max_sample_items {
                if samples % items_d0 != 0 {
                    continue;
                }
                for items_d1 in 1..=bounds.max_dm_items {
                    if nr_dms % (threads_d1 * items_d1) != 0 {
                        continue;
                    }
                    for unroll in 1..=bounds.max_unroll {
                        if unroll_axis % unroll != 0 {
                            continue;
                        }
                        let conf = DedispersionConfig {
                            threads_d0,
                            threads_d1,
                            items_d0,
                            items_d1,
                            unroll,
                            ..Default::default()
                        };
                        let local = DedispersionConfig {
                            local_mem: true,
                            ..conf
                        };
                        if register_pressure(&conf, mode, plan) <= bounds.max_items {
                            candidates.push(conf);
                        }
                        if register_pressure(&local, mode, plan) <= bounds.max_items {
                            candidates.push(local);
                        }
                    }
                }
            }
        }
        threads_d0 *= 2;
    }
    candidates
}
