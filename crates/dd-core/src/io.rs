//! Driver-side input readers: zapped-channel lists and beam mappings.

use std::fs;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::observation::Observation;

/// Read a zapped-channels file into a dense mask.
///
/// The file holds one channel index per line; blank lines are ignored. The
/// returned vector has the padded channel length, 0 for used channels and 1
/// for zapped ones.
pub fn read_zapped_channels(path: &Path, obs: &Observation) -> CoreResult<Vec<u32>> {
    let text = fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            CoreError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            CoreError::Io(err)
        }
    })?;
    let mut mask = vec![0u32; obs.padded_nr_channels()];
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let channel: usize = line
            .parse()
            .map_err(|_| CoreError::Parse(format!("invalid channel index {line:?}")))?;
        if channel >= obs.nr_channels() {
            return Err(CoreError::Parse(format!(
                "zapped channel {channel} out of range (channels: {})",
                obs.nr_channels()
            )));
        }
        mask[channel] = 1;
    }
    Ok(mask)
}

/// Number of zapped channels in a mask.
pub fn nr_zapped_channels(mask: &[u32], nr_channels: usize) -> usize {
    mask[..nr_channels].iter().filter(|&&z| z != 0).count()
}

/// Generate the beam mapping for synthesized beams.
///
/// Each synthesized beam draws every channel (or subband, for step two) from
/// physical beam `sb % nr_beams`; entries are invariantly in `[0, nr_beams)`.
pub fn generate_beam_mapping(obs: &Observation, subband_domain: bool) -> Vec<u32> {
    let stride = if subband_domain {
        obs.padded_nr_subbands()
    } else {
        obs.padded_nr_channels()
    };
    let mut mapping = vec![0u32; obs.nr_synthesized_beams() * stride];
    for sbeam in 0..obs.nr_synthesized_beams() {
        let beam = (sbeam % obs.nr_beams()) as u32;
        for entry in &mut mapping[sbeam * stride..(sbeam + 1) * stride] {
            *entry = beam;
        }
    }
    mapping
}
