//! A1-style coordinates and ranges.

use anyhow::{Context, Result, bail};
use std::{fmt, str::FromStr};

/// 0-based column index -> Excel letters (0 -> "A", 26 -> "AA").
pub fn col_letter(mut n: u32) -> String {
    let mut s = String::new();
    loop {
        s.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// Excel letters -> 0-based column index. A leading `$` is ignored.
pub fn col_index(s: &str) -> Result<u32> {
    let letters = s.trim_start_matches('$');
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        bail!("invalid column letters: {s:?}");
    }
    let n = letters
        .bytes()
        .try_fold(0u32, |acc, b| {
            acc.checked_mul(26)?
                .checked_add((b.to_ascii_uppercase() - b'A' + 1) as u32)
        })
        .with_context(|| format!("column out of range: {s}"))?;
    Ok(n - 1)
}

/// `"C14"` -> `(2, 14)`: 0-based column, 1-based row.
pub fn split_coord(coord: &str) -> Result<(u32, u32)> {
    let p = coord
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("invalid cell coordinate – no digits found: {coord}"))?;
    let col = col_index(coord[..p].trim_end_matches('$'))?;
    let row: u32 = coord[p..]
        .parse()
        .with_context(|| format!("invalid row number in cell coordinate: {coord}"))?;
    if row == 0 {
        bail!("row numbers start at 1: {coord}");
    }
    Ok((col, row))
}

pub fn coord(col: u32, row: u32) -> String {
    format!("{}{}", col_letter(col), row)
}

/// Rectangular range such as `A13:B13`; a single cell is a 1x1 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_col: u32,
    pub first_row: u32,
    pub last_col: u32,
    pub last_row: u32,
}

impl CellRange {
    pub fn is_single_row(&self) -> bool {
        self.first_row == self.last_row
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        self.first_col <= other.last_col
            && other.first_col <= self.last_col
            && self.first_row <= other.last_row
            && other.first_row <= self.last_row
    }

    /// Same columns, moved onto `row`.
    pub fn on_row(&self, row: u32) -> CellRange {
        CellRange {
            first_row: row,
            last_row: row + (self.last_row - self.first_row),
            ..*self
        }
    }
}

impl FromStr for CellRange {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        let (a, b) = s.split_once(':').unwrap_or((s, s));
        let (c0, r0) = split_coord(a)?;
        let (c1, r1) = split_coord(b)?;
        Ok(CellRange {
            first_col: c0.min(c1),
            first_row: r0.min(r1),
            last_col: c0.max(c1),
            last_row: r0.max(r1),
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            col_letter(self.first_col),
            self.first_row,
            col_letter(self.last_col),
            self.last_row
        )
    }
}
