//! テスト用のプロジェクト（テンプレート付き一時ディレクトリ）

#![allow(dead_code)]

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use sales_ledger::{Booking, LedgerConfig, LedgerError, LedgerUpdater, UpdateOutcome};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};
use xlsx_core::XlsxEditor;

pub const SHEET: &str = "売上";
pub const LEDGER_COLUMNS: [&str; 4] = ["A", "C", "E", "H"];

fn header(horiz: FormatAlign, vert: FormatAlign) -> Format {
    Format::new()
        .set_font_name("MS Gothic")
        .set_font_size(11)
        .set_bold()
        .set_font_color(Color::RGB(0x203864))
        .set_background_color(Color::RGB(0xDDEBF7))
        .set_align(horiz)
        .set_align(vert)
        .set_border(FormatBorder::Double)
}

/// Template layout: title on row 1, header row 13 (A:B and C:D merged, each
/// column aligned differently), ledger labels from row 14, footer on row 30.
pub fn write_workbook(path: &Path, labels: &[&str]) -> Result<(), XlsxError> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name(SHEET)?;
    ws.write_string(0, 0, "月次売上表")?;
    ws.merge_range(12, 0, 12, 1, "日付", &header(FormatAlign::Center, FormatAlign::VerticalCenter))?;
    ws.merge_range(12, 2, 12, 3, "お客様名", &header(FormatAlign::Left, FormatAlign::VerticalCenter))?;
    ws.write_string_with_format(12, 4, "担当", &header(FormatAlign::Center, FormatAlign::Top))?;
    ws.write_string_with_format(12, 7, "来店回数", &header(FormatAlign::Right, FormatAlign::Top))?;
    for (i, label) in labels.iter().enumerate() {
        ws.write_string(13 + i as u32, 0, *label)?;
    }
    ws.merge_range(29, 0, 29, 3, "合計", &Format::new().set_bold())?;
    wb.save(path)
}

pub struct Project {
    pub dir: TempDir,
    pub config: LedgerConfig,
}

impl Project {
    pub fn new() -> Self {
        let project = Self::without_template();
        project.config.paths.ensure_dirs().unwrap();
        write_workbook(&project.config.paths.template_path(), &[]).unwrap();
        project
    }

    pub fn without_template() -> Self {
        let dir = tempdir().expect("Failed to create temp dir");
        let config = LedgerConfig::load(dir.path(), None).unwrap();
        Self { dir, config }
    }

    pub fn apply(&self, booking: &Booking) -> Result<UpdateOutcome, LedgerError> {
        LedgerUpdater::new(&self.config)?.apply(booking)
    }

    pub fn ledger_path(&self, file_name: &str) -> PathBuf {
        self.config.paths.ledger_path(file_name)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.config.paths.output_path(file_name)
    }
}

pub fn booking(date: &str, customer: &str, staff: &str, visits: u32) -> Booking {
    Booking {
        date: date.to_owned(),
        customer_name: customer.to_owned(),
        staff_name: staff.to_owned(),
        visit_count: visits,
    }
}

/// Texts of the four ledger columns on `row` ("" for empty cells).
pub fn row_texts(book: &XlsxEditor, row: u32) -> Vec<String> {
    LEDGER_COLUMNS
        .iter()
        .map(|col| {
            book.cell_text(&format!("{col}{row}"))
                .unwrap()
                .unwrap_or_default()
        })
        .collect()
}
