//! The persisted tuning catalogue.
//!
//! A line-oriented text file mapping (device name, DM count) to the winning
//! configuration:
//!
//! ```text
//! device_name nr_dms split_batches local_mem unroll threads_d0 threads_d1 threads_d2 items_d0 items_d1 items_d2
//! ```
//!
//! Blank lines and lines whose first character is not alphabetic are
//! skipped; duplicate keys within a device overwrite the prior value. At
//! lookup, `nr_dms` is the coarse count for step one and the fine count
//! otherwise.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use dd_core::{CoreError, CoreResult, DedispersionConfig};

/// Sanitise an adapter name into a single-token catalogue key.
pub fn catalogue_key(device_name: &str) -> String {
    device_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// In-memory catalogue, append-only on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TunedCatalogue {
    entries: BTreeMap<String, BTreeMap<usize, DedispersionConfig>>,
}

impl TunedCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, device: &str, nr_dms: usize, conf: DedispersionConfig) {
        self.entries
            .entry(catalogue_key(device))
            .or_default()
            .insert(nr_dms, conf);
    }

    pub fn lookup(&self, device: &str, nr_dms: usize) -> Option<&DedispersionConfig> {
        self.entries.get(&catalogue_key(device))?.get(&nr_dms)
    }

    /// Read a catalogue file; a missing file is `FileNotFound`.
    pub fn read(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                CoreError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                CoreError::Io(err)
            }
        })?;

        let mut catalogue = Self::new();
        for line in text.lines() {
            if !line.starts_with(|c: char| c.is_ascii_alphabetic()) {
                continue;
            }
            let (device, nr_dms, conf) = parse_line(line)?;
            catalogue.insert(&device, nr_dms, conf);
        }
        Ok(catalogue)
    }

    /// Write the whole catalogue.
    pub fn write(&self, path: &Path) -> CoreResult<()> {
        let mut text = String::new();
        for (device, per_dms) in &self.entries {
            for (nr_dms, conf) in per_dms {
                text.push_str(&format!("{device} {nr_dms} {conf}\n"));
            }
        }
        fs::write(path, text)?;
        Ok(())
    }
}

fn parse_line(line: &str) -> CoreResult<(String, usize, DedispersionConfig)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 11 {
        return Err(CoreError::Parse(format!(
            "expected 11 catalogue fields, got {}: {line:?}",
            fields.len()
        )));
    }
    let number = |index: usize| -> CoreResult<usize> {
        fields[index]
            .parse()
            .map_err(|_| CoreError::Parse(format!("invalid catalogue field {:?}", fields[index])))
    };
    let device = fields[0].to_string();
    let nr_dms = number(1)?;
    let conf = DedispersionConfig {
        split_batches: number(2)? != 0,
        local_mem: number(3)? != 0,
        unroll: number(4)?,
        threads_d0: number(5)?,
        threads_d1: number(6)?,
        threads_d2: number(7)?,
        items_d0: number(8)?,
        items_d1: number(9)?,
        items_d2: number(10)?,
    };
    Ok((device, nr_dms, conf))
}
