//! The ledger update: resolve the month's workbook, find the row, write, style, save.

use crate::booking::{Booking, parse_date_label, workbook_file_name};
use crate::config::{LedgerConfig, LedgerPaths, SheetLayout};
use crate::error::{LedgerError, Result};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use xlsx_core::{BorderSpec, ColorSpec, StylePatch, XlsxEditor, coord, write_atomic};

/// Where a booking ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub file_name: String,
    pub row: u32,
    pub file_path: PathBuf,
    pub output_path: PathBuf,
}

/// Target row for a new booking; `shift` when that row is occupied and has to
/// move down first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    pub row: u32,
    pub shift: bool,
}

/// Walks the date labels from `first_row` until the first empty one and
/// returns the first row dated strictly after `date`, or that empty row.
///
/// Labels are read in `date`'s year; labels that are not dates are skipped.
pub fn insertion_point(labels: &BTreeMap<u32, String>, first_row: u32, date: NaiveDate) -> Insertion {
    let mut row = first_row;
    while let Some(label) = labels.get(&row) {
        match parse_date_label(label, date.year()) {
            Some(existing) if date < existing => return Insertion { row, shift: true },
            Some(_) => {}
            None => debug!("row {row}: {label:?} is not a date label, skipped"),
        }
        row += 1;
    }
    Insertion { row, shift: false }
}

pub struct LedgerUpdater {
    paths: LedgerPaths,
    layout: SheetLayout,
    columns: [u32; 4],
}

impl LedgerUpdater {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        config.layout.validate()?;
        Ok(Self {
            paths: config.paths.clone(),
            layout: config.layout.clone(),
            columns: config.layout.columns.indices()?,
        })
    }

    pub fn apply(&self, booking: &Booking) -> Result<UpdateOutcome> {
        let date = booking.parsed_date()?;
        let file_name = workbook_file_name(date);
        let file_path = self.paths.ledger_path(&file_name);
        let output_path = self.paths.output_path(&file_name);

        self.paths.ensure_dirs()?;
        self.prepare_workbook(&file_path)?;

        let mut book = XlsxEditor::open(&file_path)?;
        let [date_col, customer_col, staff_col, visits_col] = self.columns;

        let labels = book.column_texts(date_col)?;
        let at = insertion_point(&labels, self.layout.first_data_row, date);
        if at.shift {
            book.insert_row(at.row)?;
        }
        info!(
            "{file_name}: booking {} -> row {} ({})",
            booking.date,
            at.row,
            if at.shift { "inserted" } else { "appended" }
        );

        book.set_text(&coord(date_col, at.row), &booking.date_label())?;
        book.set_text(&coord(customer_col, at.row), &booking.customer_name)?;
        book.set_text(&coord(staff_col, at.row), &booking.staff_name)?;
        book.set_text(&coord(visits_col, at.row), &booking.visit_label())?;
        self.stamp_style(&mut book, at.row)?;

        // one serialisation, two identical files
        let bytes = book.to_bytes()?;
        write_atomic(&file_path, &bytes)?;
        write_atomic(&output_path, &bytes)?;

        Ok(UpdateOutcome {
            file_name,
            row: at.row,
            file_path,
            output_path,
        })
    }

    /// Copies the template into place for the first booking of a month.
    fn prepare_workbook(&self, file_path: &Path) -> Result<()> {
        if file_path.exists() {
            return Ok(());
        }
        let template = self.paths.template_path();
        if !template.is_file() {
            return Err(LedgerError::TemplateMissing(template));
        }
        std::fs::copy(&template, file_path)?;
        info!("created {} from {}", file_path.display(), template.display());
        Ok(())
    }

    /// Font and alignment from the style row, thin black border on every side.
    /// Style-row merges starting in a ledger column are repeated on `row`.
    fn stamp_style(&self, book: &mut XlsxEditor, row: u32) -> Result<()> {
        let style_row = self.layout.style_row;
        let border = BorderSpec::uniform("thin", ColorSpec::rgb("FF000000"));

        for col in self.columns {
            let template = book.cell_format(&coord(col, style_row))?;
            let patch = StylePatch {
                font: template.font,
                align: Some(template.align.unwrap_or_default()),
                border: Some(border.clone()),
            };
            let sid = book.apply_style(&coord(col, row), &patch)?;
            debug!("{}: style {sid}", coord(col, row));
        }

        // covered cells carry the border too, so the merged block is outlined
        let border_only = StylePatch {
            border: Some(border),
            ..Default::default()
        };
        for merge in book.mirror_row_merges(style_row, row, &self.columns)? {
            debug!("merged {merge}");
            for col in merge.first_col + 1..=merge.last_col {
                if !self.columns.contains(&col) {
                    book.apply_style(&coord(col, row), &border_only)?;
                }
            }
        }
        Ok(())
    }
}
