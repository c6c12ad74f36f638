#![cfg(test)]

use crate::rows::{shift_ref, shift_sqref};
use crate::{
    BorderSpec, CellRange, ColorSpec, HorizAlignment, StylePatch, VertAlignment, XlsxEditor,
    col_index, col_letter, element_spans, find_bytes, split_coord,
};
use anyhow::Result;
use pretty_assertions::assert_eq;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Header on row 13 (merged A:B and C:D, double borders), two ledger rows and
/// a merged footer on row 21.
fn ledger_fixture(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("ledger.xlsx");
    let header = Format::new()
        .set_bold()
        .set_font_name("MS Gothic")
        .set_font_size(12)
        .set_font_color(Color::RGB(0x1F4E79))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Double);

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("売上")?;
    ws.write_string(0, 0, "月次売上")?;
    ws.merge_range(12, 0, 12, 1, "日付", &header)?;
    ws.merge_range(12, 2, 12, 3, "顧客名", &header)?;
    ws.write_string_with_format(12, 4, "担当", &header)?;
    ws.write_string_with_format(12, 7, "回数", &header)?;
    ws.write_string(13, 0, "10月1日")?;
    ws.write_string(14, 0, "10月5日")?;
    ws.merge_range(20, 0, 20, 3, "合計", &Format::new())?;
    wb.save(&path)?;
    Ok(path)
}

fn row_numbers(app: &XlsxEditor) -> Result<Vec<u32>> {
    Ok(element_spans(&app.sheet_xml, b"row", b"r")?
        .iter()
        .filter_map(|r| r.key_u32())
        .collect())
}

#[test]
fn reads_shared_and_blank_cells() -> Result<()> {
    let dir = TempDir::new()?;
    let app = XlsxEditor::open(ledger_fixture(dir.path())?)?;

    assert_eq!(app.sheet_name(), "売上");
    assert_eq!(app.cell_text("A13")?.as_deref(), Some("日付"));
    assert_eq!(app.cell_text("A14")?.as_deref(), Some("10月1日"));
    assert_eq!(app.cell_text("B13")?, None); // merged, formatted, no value
    assert_eq!(app.cell_text("Z99")?, None);

    let labels = app.column_texts(0)?;
    assert_eq!(labels.keys().copied().collect::<Vec<_>>(), vec![1, 13, 14, 15, 21]);
    assert_eq!(labels[&15], "10月5日");
    Ok(())
}

#[test]
fn set_text_keeps_column_order_and_style() -> Result<()> {
    let dir = TempDir::new()?;
    let mut app = XlsxEditor::open(ledger_fixture(dir.path())?)?;

    app.set_text("H14", "3回目")?;
    app.set_text("C14", "山田 太郎")?;
    assert_eq!(app.cell_text("C14")?.as_deref(), Some("山田 太郎"));
    assert_eq!(app.cell_text("H14")?.as_deref(), Some("3回目"));

    let a = find_bytes(&app.sheet_xml, br#"r="A14""#).unwrap();
    let c = find_bytes(&app.sheet_xml, br#"r="C14""#).unwrap();
    let h = find_bytes(&app.sheet_xml, br#"r="H14""#).unwrap();
    assert!(a < c && c < h);

    let styled = app.cell_style_id("E13")?;
    assert_ne!(styled, 0);
    app.set_text("E13", "担当者")?;
    assert_eq!(app.cell_style_id("E13")?, styled);
    assert_eq!(app.cell_text("E13")?.as_deref(), Some("担当者"));
    Ok(())
}

#[test]
fn set_text_creates_rows_in_order() -> Result<()> {
    let dir = TempDir::new()?;
    let mut app = XlsxEditor::open(ledger_fixture(dir.path())?)?;

    app.set_text("B17", " padded ")?;
    app.set_text("A30", "after footer")?;
    assert_eq!(row_numbers(&app)?, vec![1, 13, 14, 15, 17, 21, 30]);
    assert_eq!(app.cell_text("B17")?.as_deref(), Some(" padded "));
    assert!(find_bytes(&app.sheet_xml, br#"xml:space="preserve""#).is_some());
    Ok(())
}

#[test]
fn insert_row_shifts_rows_and_references() -> Result<()> {
    let dir = TempDir::new()?;
    let mut app = XlsxEditor::open(ledger_fixture(dir.path())?)?;

    app.insert_row(14)?;
    assert_eq!(app.cell_text("A13")?.as_deref(), Some("日付"));
    assert_eq!(app.cell_text("A14")?, None);
    assert_eq!(app.cell_text("A15")?.as_deref(), Some("10月1日"));
    assert_eq!(app.cell_text("A16")?.as_deref(), Some("10月5日"));
    assert_eq!(app.cell_text("A22")?.as_deref(), Some("合計"));
    assert_eq!(row_numbers(&app)?, vec![1, 13, 15, 16, 22]);

    let merges = app.merged_ranges()?;
    assert!(merges.contains(&"A13:B13".parse()?));
    assert!(merges.contains(&"A22:D22".parse()?));
    assert!(!merges.contains(&"A21:D21".parse()?));
    assert!(find_bytes(&app.sheet_xml, br#"ref="A1:H22""#).is_some());
    Ok(())
}

#[test]
fn mirror_row_merges_copies_style_row_merges_once() -> Result<()> {
    let dir = TempDir::new()?;
    let mut app = XlsxEditor::open(ledger_fixture(dir.path())?)?;
    let ledger_cols = [0, 2, 4, 7];

    app.insert_row(14)?;
    let added = app.mirror_row_merges(13, 14, &ledger_cols)?;
    assert_eq!(added.len(), 2);
    let merges = app.merged_ranges()?;
    assert!(merges.contains(&"A14:B14".parse()?));
    assert!(merges.contains(&"C14:D14".parse()?));

    assert!(app.mirror_row_merges(13, 14, &ledger_cols)?.is_empty());
    assert_eq!(app.merged_ranges()?.len(), merges.len());
    Ok(())
}

#[test]
fn merge_cells_creates_block_when_missing() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("plain.xlsx");
    let mut wb = Workbook::new();
    wb.add_worksheet().write_string(0, 0, "x")?;
    wb.save(&path)?;

    let mut app = XlsxEditor::open(&path)?;
    assert!(app.merged_ranges()?.is_empty());
    app.merge_cells(&"A2:C2".parse()?)?;
    app.merge_cells(&"A3:C3".parse()?)?;
    assert_eq!(app.merged_ranges()?.len(), 2);

    let block = find_bytes(&app.sheet_xml, b"<mergeCells").unwrap();
    let sheet_data_end = find_bytes(&app.sheet_xml, b"</sheetData>").unwrap();
    let margins = find_bytes(&app.sheet_xml, b"<pageMargins").unwrap();
    assert!(sheet_data_end < block && block < margins);
    assert!(find_bytes(&app.sheet_xml, br#"<mergeCells count="2">"#).is_some());
    Ok(())
}

#[test]
fn reads_template_format() -> Result<()> {
    let dir = TempDir::new()?;
    let app = XlsxEditor::open(ledger_fixture(dir.path())?)?;

    let fmt = app.cell_format("E13")?;
    let font = fmt.font.expect("font");
    assert_eq!(font.name.as_deref(), Some("MS Gothic"));
    assert_eq!(font.size.as_deref(), Some("12"));
    assert!(font.bold);
    assert_eq!(font.color.as_ref().and_then(|c| c.attr("rgb")), Some("FF1F4E79"));

    let align = fmt.align.expect("alignment");
    assert_eq!(align.horiz, Some(HorizAlignment::Center));
    assert_eq!(align.vert, Some(VertAlignment::Center));

    let border = fmt.border.expect("border");
    assert!(
        border
            .sides()
            .iter()
            .all(|side| side.as_ref().is_some_and(|e| e.style == "double"))
    );

    let plain = app.cell_format("A14")?;
    assert_eq!(plain.align, None);
    assert_eq!(plain.border, Some(BorderSpec::default()));
    Ok(())
}

#[test]
fn apply_style_layers_patch_and_reuses_ids() -> Result<()> {
    let dir = TempDir::new()?;
    let mut app = XlsxEditor::open(ledger_fixture(dir.path())?)?;

    let template = app.cell_format("E13")?;
    let thin = BorderSpec::uniform("thin", ColorSpec::rgb("FF000000"));
    let patch = StylePatch {
        font: template.font.clone(),
        align: template.align.clone(),
        border: Some(thin.clone()),
    };

    let first = app.apply_style("E14", &patch)?;
    let styles_len = app.styles_xml.len();
    let fmt = app.cell_format("E14")?;
    assert_eq!(fmt.font, template.font);
    assert_eq!(fmt.align, template.align);
    assert_eq!(fmt.border, Some(thin));

    // same patch on another cell: no new font, border or xf
    let second = app.apply_style("E15", &patch)?;
    assert_eq!(second, first);
    assert_eq!(app.styles_xml.len(), styles_len);

    // clearing alignment keeps font and border
    let cleared = app.apply_style(
        "E15",
        &StylePatch {
            align: Some(Default::default()),
            ..Default::default()
        },
    )?;
    assert_ne!(cleared, first);
    let fmt = app.cell_format("E15")?;
    assert_eq!(fmt.align, None);
    assert_eq!(fmt.font, template.font);
    Ok(())
}

#[test]
fn saved_copies_are_identical_and_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let src = ledger_fixture(dir.path())?;
    let mut app = XlsxEditor::open(&src)?;
    app.insert_row(14)?;
    app.set_text("A14", "9月30日")?;

    let bytes = app.to_bytes()?;
    assert_eq!(bytes, app.to_bytes()?);

    let out = dir.path().join("out");
    std::fs::create_dir(&out)?;
    app.save(&src)?;
    crate::write_atomic(out.join("copy.xlsx"), &bytes)?;
    assert_eq!(std::fs::read(&src)?, std::fs::read(out.join("copy.xlsx"))?);

    let reopened = XlsxEditor::open(&src)?;
    assert_eq!(reopened.cell_text("A14")?.as_deref(), Some("9月30日"));
    assert_eq!(reopened.cell_text("A15")?.as_deref(), Some("10月1日"));
    Ok(())
}

#[test]
fn opens_active_sheet() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("two_sheets.xlsx");
    let mut wb = Workbook::new();
    wb.add_worksheet().set_name("first")?.write_string(0, 0, "one")?;
    wb.add_worksheet()
        .set_name("second")?
        .set_active(true)
        .write_string(0, 0, "two")?;
    wb.save(&path)?;

    let app = XlsxEditor::open(&path)?;
    assert_eq!(app.sheet_name(), "second");
    assert_eq!(app.cell_text("A1")?.as_deref(), Some("two"));

    let first = XlsxEditor::open_sheet(&path, 0)?;
    assert_eq!(first.sheet_name(), "first");
    assert!(XlsxEditor::open_sheet(&path, 5).is_err());
    Ok(())
}

#[test]
fn shifts_sqref_lists() {
    assert_eq!(shift_sqref("A14 C3:D20", 14), "A15 C3:D21");
    assert_eq!(shift_sqref("A1:H13", 14), "A1:H13");
    assert_eq!(shift_ref("$A$14", 14), "$A$15");
    assert_eq!(shift_ref("A:A", 14), "A:A");
}

#[test]
fn column_helpers() -> Result<()> {
    assert_eq!(col_letter(0), "A");
    assert_eq!(col_letter(25), "Z");
    assert_eq!(col_letter(26), "AA");
    assert_eq!(col_index("AA")?, 26);
    assert_eq!(col_index("$H")?, 7);
    assert!(col_index("1A").is_err());
    assert_eq!(split_coord("H14")?, (7, 14));
    assert!(split_coord("A0").is_err());

    let r: CellRange = "C13:D13".parse()?;
    assert!(r.is_single_row());
    assert_eq!(r.on_row(20).to_string(), "C20:D20");
    assert!(r.intersects(&"D13".parse()?));
    assert!(!r.intersects(&"E13".parse()?));
    Ok(())
}

#[cfg(unix)]
#[test]
fn write_atomic_keeps_file_modes() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = |p: &Path| -> Result<u32> { Ok(std::fs::metadata(p)?.permissions().mode() & 0o777) };

    let dir = TempDir::new()?;
    let app = XlsxEditor::open(ledger_fixture(dir.path())?)?;
    let bytes = app.to_bytes()?;

    // new file: same mode as a plain create in the same directory
    let plain = dir.path().join("plain.bin");
    std::fs::write(&plain, b"x")?;
    let fresh = dir.path().join("fresh.xlsx");
    crate::write_atomic(&fresh, &bytes)?;
    assert_eq!(mode(&fresh)?, mode(&plain)?);

    // existing file: its mode survives the replace
    let shared = dir.path().join("shared.xlsx");
    std::fs::write(&shared, b"old")?;
    std::fs::set_permissions(&shared, std::fs::Permissions::from_mode(0o640))?;
    app.save(&shared)?;
    assert_eq!(mode(&shared)?, 0o640);
    assert_eq!(std::fs::read(&shared)?, bytes);
    Ok(())
}

#[test]
fn empty_string_cells_count_as_blank() -> Result<()> {
    let dir = TempDir::new()?;
    let mut app = XlsxEditor::open(ledger_fixture(dir.path())?)?;
    app.set_text("A16", "")?;
    app.set_text("A17", "10月9日")?;

    let labels = app.column_texts(0)?;
    assert!(!labels.contains_key(&16));
    assert_eq!(labels[&17], "10月9日");
    Ok(())
}
