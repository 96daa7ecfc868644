// THEORY:
// A `GlobalHistogram` summarises the overall colour makeup of an image as a fixed
// number of weights, one per bin of a quantised `(a, b)` gamut. Most bins are
// exactly zero, so the file stores only the nonzero ones.
//
// File layout, repeated until end of file:
//   [2 bytes, i16 LE] bin index
//   [4 bytes, f32 LE] bin value
//
// The reader needs to know `N` up front; the file itself carries no length.

use crate::core_modules::sparse_mask::read_full;
use crate::error::{HintError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Bin count of the standard quantised gamut.
pub const DEFAULT_BINS: usize = 313;
/// Largest histogram the encoder accepts.
pub const MAX_BINS: usize = 512;
const RECORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalHistogram {
    pub bins: Vec<f32>,
}

impl GlobalHistogram {
    /// All-zero histogram of `len` bins.
    pub fn zeros(len: usize) -> Self {
        Self { bins: vec![0.0; len] }
    }

    pub fn from_bins(bins: Vec<f32>) -> Self {
        Self { bins }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Indices and values of bins that are not exactly zero, ascending.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.bins.iter().copied().enumerate().filter(|&(_, v)| v != 0.0)
    }

    /// Writes the nonzero bins; returns the number of records written.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        if self.bins.len() > MAX_BINS {
            return Err(HintError::HistogramTooLong {
                len: self.bins.len(),
                max: MAX_BINS,
            });
        }
        let mut records = 0;
        for (index, value) in self.nonzero() {
            writer.write_all(&(index as i16).to_le_bytes())?;
            writer.write_all(&value.to_le_bytes())?;
            records += 1;
        }
        writer.flush()?;
        Ok(records)
    }

    /// Reads records into a fresh histogram of `len` bins. A short read on either
    /// field ends the stream; a repeated index keeps its last value.
    pub fn read_from<R: Read>(mut reader: R, len: usize) -> Result<Self> {
        let mut histogram = Self::zeros(len);
        let mut record = [0u8; RECORD_LEN];
        let mut skipped = 0usize;
        loop {
            let got = read_full(&mut reader, &mut record)?;
            if got < RECORD_LEN {
                if got > 0 {
                    debug!(bytes = got, "dropping trailing partial histogram record");
                }
                break;
            }
            let index = i16::from_le_bytes([record[0], record[1]]);
            let value = f32::from_le_bytes([record[2], record[3], record[4], record[5]]);
            match usize::try_from(index).ok().filter(|&i| i < len) {
                Some(i) => histogram.bins[i] = value,
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, bins = len, "histogram records with out-of-range index ignored");
        }
        Ok(histogram)
    }

    /// Validates, then writes to `path`.
    pub fn encode(&self, path: impl AsRef<Path>) -> Result<usize> {
        if self.bins.len() > MAX_BINS {
            return Err(HintError::HistogramTooLong {
                len: self.bins.len(),
                max: MAX_BINS,
            });
        }
        self.write_to(BufWriter::new(File::create(path)?))
    }

    pub fn decode(path: impl AsRef<Path>, len: usize) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?), len)
    }
}
