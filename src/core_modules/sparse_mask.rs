// THEORY:
// The `SparseColorMask` is the central data structure of the encoder. It is a fixed
// `size x size` square on which a small number of cells carry a 2-channel chrominance
// value (the "hints"); every other cell is inactive and carries nothing.
//
// Key architectural principles:
// 1.  **Dense in memory, sparse on disk**: the working state is two dense buffers
//     (colour and active flag) so that writes are O(1). Only active cells are
//     serialized.
// 2.  **Patch expansion at write time**: with a patch radius p > 0, `put_point`
//     paints the whole (2p+1)x(2p+1) square. Every painted cell is later written
//     as its own record; the format never deduplicates patches.
// 3.  **Bounds are explicit**: a centre outside the mask is an error, a patch that
//     spills over the border is clipped.
// 4.  **Byte-exact format**: the binary layout below is the interchange format and
//     must stay bit-exact. The `row;col;a;b` text form is an auxiliary transport.
//
// ```text
// [u16 LE] size
// [u8    ] patch_radius
// repeat until EOF:
//   [u8 | u16 LE] row      (u16 iff size > 256)
//   [u8 | u16 LE] col
//   [i8         ] a
//   [i8         ] b
// ```

use crate::error::{HintError, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Largest side length the 2-byte header can describe.
pub const MAX_MASK_SIZE: usize = u16::MAX as usize;
/// Largest patch radius the 1-byte header can describe.
pub const MAX_PATCH_RADIUS: usize = u8::MAX as usize;
/// Masks larger than this use 2-byte coordinates.
pub const WIDE_COORD_THRESHOLD: usize = 256;

const HEADER_LEN: usize = 3;

/// The chrominance pair carried by one mask cell.
///
/// The persisted format stores each channel as a signed byte, so only values in
/// `[-128, 127]` survive a save/load round trip unchanged; wider values saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AbValue {
    pub a: i16,
    pub b: i16,
}

impl AbValue {
    pub fn new(a: i16, b: i16) -> Self {
        Self { a, b }
    }

    /// Truncates floating point Lab chrominance towards zero.
    pub fn from_lab(a: f32, b: f32) -> Self {
        Self {
            a: a.trunc().clamp(i16::MIN as f32, i16::MAX as f32) as i16,
            b: b.trunc().clamp(i16::MIN as f32, i16::MAX as f32) as i16,
        }
    }

    /// Signed-byte form used on disk, plus whether either channel had to saturate.
    fn narrowed(self) -> ([i8; 2], bool) {
        let a = self.a.clamp(i8::MIN as i16, i8::MAX as i16);
        let b = self.b.clamp(i8::MIN as i16, i8::MAX as i16);
        ([a as i8, b as i8], a != self.a || b != self.b)
    }
}

/// A logical view of one active cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSample {
    pub row: usize,
    pub col: usize,
    pub value: AbValue,
}

/// A square grid of sparse colour hints.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseColorMask {
    /// Side length of the square mask.
    size: usize,
    /// Half-width of the square painted by one `put_point`.
    patch_radius: usize,
    /// Row-major chrominance buffer, meaningful only where `active` is set.
    ab: Vec<AbValue>,
    /// Row-major flags marking cells touched by `put_point`.
    active: Vec<bool>,
}

impl SparseColorMask {
    /// Checks that `size` fits the 2-byte header field. Allocates nothing.
    pub fn validate_size(size: usize) -> Result<()> {
        if size == 0 || size > MAX_MASK_SIZE {
            return Err(HintError::InvalidMaskSize { size });
        }
        Ok(())
    }

    /// Creates an empty mask. Fails if `size` is zero or larger than the header allows,
    /// or if the `size * size` cell buffers cannot be allocated.
    pub fn new(size: usize, patch_radius: usize) -> Result<Self> {
        Self::validate_size(size)?;
        let cells = size * size;
        Ok(Self {
            size,
            patch_radius,
            ab: filled(cells, AbValue::default())?,
            active: filled(cells, false)?,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn patch_radius(&self) -> usize {
        self.patch_radius
    }

    /// Writes `value` into the patch centred on `(row, col)`, clipped to the mask.
    pub fn put_point(&mut self, (row, col): (usize, usize), value: AbValue) -> Result<()> {
        if row >= self.size || col >= self.size {
            return Err(HintError::OutOfBounds {
                row,
                col,
                size: self.size,
            });
        }

        let p = self.patch_radius;
        let last = self.size - 1;
        for y in row.saturating_sub(p)..=(row + p).min(last) {
            let line = y * self.size;
            for x in col.saturating_sub(p)..=(col + p).min(last) {
                self.ab[line + x] = value;
                self.active[line + x] = true;
            }
        }
        Ok(())
    }

    /// Writes `value` into exactly one cell, ignoring the patch radius.
    ///
    /// Serialized masks already list every painted cell, so decoding replays
    /// records through this instead of re-expanding each one into a patch.
    pub fn put_cell(&mut self, (row, col): (usize, usize), value: AbValue) -> Result<()> {
        if row >= self.size || col >= self.size {
            return Err(HintError::OutOfBounds {
                row,
                col,
                size: self.size,
            });
        }
        let i = row * self.size + col;
        self.ab[i] = value;
        self.active[i] = true;
        Ok(())
    }

    pub fn is_active(&self, row: usize, col: usize) -> bool {
        row < self.size && col < self.size && self.active[row * self.size + col]
    }

    /// The hint stored at `(row, col)`, or `None` for inactive cells.
    pub fn value_at(&self, row: usize, col: usize) -> Option<AbValue> {
        if self.is_active(row, col) {
            Some(self.ab[row * self.size + col])
        } else {
            None
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.active.iter().any(|&a| a)
    }

    /// Active cells in row-major order.
    pub fn samples(&self) -> impl Iterator<Item = ColorSample> + '_ {
        let size = self.size;
        self.active
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(move |(i, _)| ColorSample {
                row: i / size,
                col: i % size,
                value: self.ab[i],
            })
    }

    /// Drops every hint, keeping size and patch radius.
    pub fn clear(&mut self) {
        self.ab.fill(AbValue::default());
        self.active.fill(false);
    }

    /// Bytes used per coordinate on disk.
    pub fn coord_width(&self) -> usize {
        coord_width_for(self.size)
    }

    /// Bytes used per serialized record.
    pub fn record_len(&self) -> usize {
        2 * self.coord_width() + 2
    }

    fn validate_header(&self) -> Result<()> {
        Self::validate_size(self.size)?;
        if self.patch_radius > MAX_PATCH_RADIUS {
            return Err(HintError::PatchRadiusTooLarge {
                radius: self.patch_radius,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------- binary

    /// Serializes the mask in the canonical binary layout. Returns the bytes written.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        self.validate_header()?;

        writer.write_all(&(self.size as u16).to_le_bytes())?;
        writer.write_all(&[self.patch_radius as u8])?;
        let mut written = HEADER_LEN;

        let wide = self.coord_width() == 2;
        let mut record = [0u8; 6];
        let mut saturated = 0usize;
        for sample in self.samples() {
            let ([a, b], clipped) = sample.value.narrowed();
            if clipped {
                saturated += 1;
            }
            let len = if wide {
                record[0..2].copy_from_slice(&(sample.row as u16).to_le_bytes());
                record[2..4].copy_from_slice(&(sample.col as u16).to_le_bytes());
                record[4] = a as u8;
                record[5] = b as u8;
                6
            } else {
                record[0] = sample.row as u8;
                record[1] = sample.col as u8;
                record[2] = a as u8;
                record[3] = b as u8;
                4
            };
            writer.write_all(&record[..len])?;
            written += len;
        }

        if saturated > 0 {
            warn!(cells = saturated, "chrominance outside [-128, 127] saturated on save");
        }
        Ok(written)
    }

    /// Rebuilds the mask from the canonical binary layout, discarding prior content.
    ///
    /// Size and patch radius come from the header. Each record restores exactly one
    /// cell, so a saved patch comes back with its original extent. Reading stops
    /// silently at the first incomplete record. Records addressing cells outside the
    /// mask are skipped.
    pub fn read_from<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let mut header = [0u8; HEADER_LEN];
        if read_full(&mut reader, &mut header)? < HEADER_LEN {
            return Err(HintError::TruncatedHeader);
        }
        let size = u16::from_le_bytes([header[0], header[1]]) as usize;
        let patch_radius = header[2] as usize;
        *self = Self::new(size, patch_radius)?;

        let width = self.coord_width();
        let record_len = self.record_len();
        let mut record = [0u8; 6];
        let mut records = 0usize;
        let mut skipped = 0usize;
        loop {
            let got = read_full(&mut reader, &mut record[..record_len])?;
            if got < record_len {
                if got > 0 {
                    debug!(bytes = got, "dropping trailing partial record");
                }
                break;
            }
            let (row, col) = if width == 2 {
                (
                    u16::from_le_bytes([record[0], record[1]]) as usize,
                    u16::from_le_bytes([record[2], record[3]]) as usize,
                )
            } else {
                (record[0] as usize, record[1] as usize)
            };
            let value = AbValue::new(
                record[2 * width] as i8 as i16,
                record[2 * width + 1] as i8 as i16,
            );
            match self.put_cell((row, col), value) {
                Ok(()) => records += 1,
                Err(HintError::OutOfBounds { .. }) => skipped += 1,
                Err(e) => return Err(e),
            }
        }

        if skipped > 0 {
            warn!(skipped, "mask records outside the mask were ignored");
        }
        debug!(size, patch_radius, records, "mask loaded");
        Ok(())
    }

    /// Writes the binary sidecar to `path`. Configuration is validated before the
    /// file is created.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<usize> {
        self.validate_header()?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        let written = self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(written)
    }

    /// Replaces this mask with the contents of a binary sidecar.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        self.read_from(reader)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut mask = Self::new(1, 0)?;
        mask.load(path)?;
        Ok(mask)
    }

    // ------------------------------------------------------------------ text

    /// Writes one `row;col;a;b` line per active cell. Returns the number of lines.
    pub fn write_text<W: Write>(&self, mut writer: W) -> Result<usize> {
        let mut lines = 0;
        for s in self.samples() {
            writeln!(writer, "{};{};{};{}", s.row, s.col, s.value.a, s.value.b)?;
            lines += 1;
        }
        Ok(lines)
    }

    /// Replays `row;col;a;b` lines cell by cell. The text form has no header, so the
    /// current size and patch radius are kept.
    pub fn read_text<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.clear();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (loc, value) = parse_text_record(line)
                .ok_or_else(|| HintError::invalid(format!("line {}", number + 1), line))?;
            self.put_cell(loc, value)?;
        }
        Ok(())
    }

    pub fn save_text(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        let lines = self.write_text(&mut writer)?;
        writer.flush()?;
        Ok(lines)
    }

    pub fn load_text(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        self.read_text(reader)
    }
}

fn coord_width_for(size: usize) -> usize {
    if size > WIDE_COORD_THRESHOLD { 2 } else { 1 }
}

fn parse_text_record(line: &str) -> Option<((usize, usize), AbValue)> {
    let mut fields = line.split(';').map(str::trim);
    let row = fields.next()?.parse().ok()?;
    let col = fields.next()?.parse().ok()?;
    let a = parse_channel(fields.next()?)?;
    let b = parse_channel(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }
    Some(((row, col), AbValue::new(a, b)))
}

// Integers first, then floats (truncated), so hand-edited files still load.
fn parse_channel(field: &str) -> Option<i16> {
    field
        .parse::<i16>()
        .ok()
        .or_else(|| field.parse::<f32>().ok().map(|v| AbValue::from_lab(v, 0.0).a))
}

/// Reads until `buf` is full or the reader is exhausted. Returns the bytes read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn filled<T: Clone>(cells: usize, value: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(cells)
        .map_err(|_| HintError::AllocationFailed { cells })?;
    buffer.resize(cells, value);
    Ok(buffer)
}
