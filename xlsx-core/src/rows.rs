//! Row insertion: renumbers rows, cells and the sheet-level references that
//! point at them.

use crate::{CellRange, XlsxEditor, set_attr};
use anyhow::Result;
use log::debug;
use quick_xml::{
    Reader, Writer,
    events::{BytesStart, Event},
};
use regex::Regex;
use std::sync::LazyLock;

static CELL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\$?[A-Za-z]{1,3}\$?)([0-9]+)$").expect("valid regex"));

impl XlsxEditor {
    /// Opens an empty row at `at`: every row numbered `at` or greater moves
    /// down by one, keeping its content and order.
    ///
    /// Merged ranges, the sheet dimension, conditional formats, data
    /// validations and hyperlinks move with their rows; a range that spans
    /// `at` grows by one row. Formulas are not rewritten.
    pub fn insert_row(&mut self, at: u32) -> Result<()> {
        let shifted = shift_rows(&self.sheet_xml, at)?;
        self.sheet_xml = shifted;
        debug!("inserted row {at} on {:?}", self.sheet_name);
        Ok(())
    }

    /// Copies the single-row merges of `src_row` that start in one of `cols`
    /// onto `dst_row`. A merge is skipped when the destination would overlap
    /// an existing one. Returns the merges that were added.
    pub fn mirror_row_merges(
        &mut self,
        src_row: u32,
        dst_row: u32,
        cols: &[u32],
    ) -> Result<Vec<CellRange>> {
        let mut existing = self.merged_ranges()?;
        let sources: Vec<CellRange> = existing
            .iter()
            .filter(|m| m.first_row == src_row && m.is_single_row() && cols.contains(&m.first_col))
            .copied()
            .collect();

        let mut added = Vec::new();
        for src in sources {
            let target = src.on_row(dst_row);
            if existing.iter().any(|m| m.intersects(&target)) {
                continue;
            }
            self.merge_cells(&target)?;
            existing.push(target);
            added.push(target);
        }
        Ok(added)
    }
}

fn shift_rows(xml: &[u8], at: u32) -> Result<Vec<u8>> {
    let mut rdr = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    loop {
        match rdr.read_event()? {
            Event::Start(e) => writer.write_event(Event::Start(shift_element(e, at)?))?,
            Event::Empty(e) => writer.write_event(Event::Empty(shift_element(e, at)?))?,
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
    }
    Ok(writer.into_inner())
}

fn shift_element(e: BytesStart<'_>, at: u32) -> Result<BytesStart<'_>> {
    let is_row = e.local_name().as_ref() == b"row";
    let key = match e.local_name().as_ref() {
        b"row" | b"c" => "r",
        b"mergeCell" | b"dimension" | b"hyperlink" => "ref",
        b"conditionalFormatting" | b"dataValidation" => "sqref",
        _ => "",
    };
    if key.is_empty() {
        return Ok(e);
    }
    let key = key.as_bytes();
    let Some(value) = crate::attr_value(&e, key) else {
        return Ok(e);
    };
    let shifted = if is_row {
        match value.parse::<u32>() {
            Ok(r) if r >= at => (r + 1).to_string(),
            _ => return Ok(e),
        }
    } else {
        shift_sqref(&value, at)
    };
    if shifted == value {
        return Ok(e);
    }
    Ok(set_attr(&e, key, &shifted))
}

/// Shifts every reference of a space-separated list (`"A14 C3:D20"`).
pub(crate) fn shift_sqref(sqref: &str, at: u32) -> String {
    sqref
        .split(' ')
        .map(|item| match item.split_once(':') {
            Some((a, b)) => format!("{}:{}", shift_ref(a, at), shift_ref(b, at)),
            None => shift_ref(item, at),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"B15"` -> `"B16"` when `15 >= at`; anything that is not a cell reference
/// (whole columns, defined names) is returned unchanged.
pub(crate) fn shift_ref(r: &str, at: u32) -> String {
    let Some(caps) = CELL_REF.captures(r) else {
        return r.to_owned();
    };
    match caps[2].parse::<u32>() {
        Ok(row) if row >= at => format!("{}{}", &caps[1], row + 1),
        _ => r.to_owned(),
    }
}
