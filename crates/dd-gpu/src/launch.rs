//! Work-grid sizing per pipeline mode.

use dd_core::{pad, DedispersionConfig, Mode, Observation};

/// Global and local 3D ranges for one launch.
///
/// Dimension 0 covers the output samples (each work-item handles `items_d0`
/// of them), dimension 1 the DM grid of the mode, dimension 2 the beam axis:
/// synthesized beams for direct, `beam * nr_subbands + subband` for step one
/// and `synthesized beam * nr_dms_coarse + coarse DM` for step two.
pub fn work_sizes(
    mode: Mode,
    obs: &Observation,
    conf: &DedispersionConfig,
) -> ([u32; 3], [u32; 3]) {
    let samples = obs.nr_samples_per_batch(mode.coarse()) / obs.downsampling();
    let d0 = pad(samples.div_ceil(conf.items_d0), conf.threads_d0);
    let d1 = obs.nr_dms(mode.coarse()) / conf.items_d1;
    let d2 = match mode {
        Mode::SingleStep => obs.nr_synthesized_beams(),
        Mode::StepOne => obs.nr_beams() * obs.nr_subbands(),
        Mode::StepTwo => obs.nr_synthesized_beams() * obs.nr_dms(true),
    };
    (
        [d0 as u32, d1 as u32, d2 as u32],
        [conf.threads_d0 as u32, conf.threads_d1 as u32, 1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_the_output() {
        let mut obs = Observation::new(2, 3, 1000, 1, 128).unwrap();
        obs.set_frequency_range(8, 64, 1425.0, 0.195).unwrap();
        obs.set_dm_range(32, 0.0, 0.1, false);
        obs.set_dm_range(4, 0.0, 1.2, true);
        let conf = DedispersionConfig {
            threads_d0: 32,
            threads_d1: 2,
            items_d0: 4,
            items_d1: 2,
            ..Default::default()
        };
        let (global, local) = work_sizes(Mode::SingleStep, &obs, &conf);
        // 1000 / 4 = 250 threads, padded to the 32-thread block.
        assert_eq!(global, [256, 16, 3]);
        assert_eq!(local, [32, 2, 1]);
        // Every covered sample tile spans the batch.
        assert!(global[0] as usize * conf.items_d0 >= 1000);

        let (global, _) = work_sizes(Mode::StepOne, &obs, &conf);
        assert_eq!(global[1] as usize, 4 / conf.items_d1);
        assert_eq!(global[2], 2 * 8);

        let (global, _) = work_sizes(Mode::StepTwo, &obs, &conf);
        assert_eq!(global[2], 3 * 4);
    }
}
