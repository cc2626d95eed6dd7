//! Tuning-point configuration: the knob vector driving kernel generation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One point in the tuning space.
///
/// Dimension 0 is the sample axis, dimension 1 the DM axis; dimension 2 is
/// carried for the catalogue format but always 1. `split_batches` is a
/// reserved streaming mode: it is stored, printed and parsed, but rejected
/// wherever a kernel would be generated or launched with it set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedispersionConfig {
    pub threads_d0: usize,
    pub threads_d1: usize,
    pub threads_d2: usize,
    pub items_d0: usize,
    pub items_d1: usize,
    pub items_d2: usize,
    pub unroll: usize,
    pub local_mem: bool,
    pub split_batches: bool,
}

impl Default for DedispersionConfig {
    fn default() -> Self {
        Self {
            threads_d0: 1,
            threads_d1: 1,
            threads_d2: 1,
            items_d0: 1,
            items_d1: 1,
            items_d2: 1,
            unroll: 1,
            local_mem: false,
            split_batches: false,
        }
    }
}

impl DedispersionConfig {
    /// Output samples covered by one work-group.
    pub fn block_samples(&self) -> usize {
        self.threads_d0 * self.items_d0
    }

    /// DM values covered by one work-group.
    pub fn block_dms(&self) -> usize {
        self.threads_d1 * self.items_d1
    }

    /// Work-items per work-group.
    pub fn total_threads(&self) -> usize {
        self.threads_d0 * self.threads_d1
    }
}

impl fmt::Display for DedispersionConfig {
    /// Catalogue order: `split local unroll t0 t1 t2 i0 i1 i2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.split_batches as u8,
            self.local_mem as u8,
            self.unroll,
            self.threads_d0,
            self.threads_d1,
            self.threads_d2,
            self.items_d0,
            self.items_d1,
            self.items_d2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_catalogue_order() {
        let conf = DedispersionConfig {
            threads_d0: 32,
            threads_d1: 4,
            items_d0: 2,
            items_d1: 8,
            unroll: 4,
            local_mem: true,
            ..Default::default()
        };
        assert_eq!(conf.to_string(), "0 1 4 32 4 1 2 8 1");
    }

    #[test]
    fn block_arithmetic() {
        let conf = DedispersionConfig {
            threads_d0: 64,
            threads_d1: 2,
            items_d0: 4,
            items_d1: 3,
            ..Default::default()
        };
        assert_eq!(conf.block_samples(), 256);
        assert_eq!(conf.block_dms(), 6);
        assert_eq!(conf.total_threads(), 128);
    }
}
