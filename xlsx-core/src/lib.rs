//! xlsx-core: in-place editing of an existing `.xlsx` workbook.
//!
//! Only the edited worksheet and `xl/styles.xml` are ever re-serialised; every
//! other zip entry is raw-copied on save, so drawings, print settings and the
//! rest of the template survive untouched.

mod cell_ref;
mod files_part;
mod rows;
pub mod style;
mod test;

pub use cell_ref::{CellRange, col_index, col_letter, coord, split_coord};
pub use files_part::write_atomic;
pub use style::{
    AlignSpec, BorderEdge, BorderSpec, CellFormat, ColorSpec, FontSpec, HorizAlignment,
    StylePatch, VertAlignment,
};

use anyhow::{Context, Result, bail};
use quick_xml::{
    Reader, Writer,
    events::{BytesStart, BytesText, Event},
};
use std::collections::BTreeMap;

/// `XlsxEditor` keeps one worksheet of a workbook in memory, lets the caller
/// read and rewrite cells, insert rows and patch cell styles, and writes the
/// whole package back out on [`XlsxEditor::save`].
pub struct XlsxEditor {
    archive: Vec<u8>, // source package; untouched entries are raw-copied from here
    sheet_name: String,
    sheet_path: String,
    sheet_xml: Vec<u8>,
    styles_xml: Vec<u8>,
    shared_strings: Vec<String>,
}

/* ========================== CELL READ ===================================== */

impl XlsxEditor {
    /// Name of the worksheet being edited.
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Text content of a cell: inline strings, shared strings (`t="s"`) and
    /// plain values all come back as text. `None` for absent or value-less cells.
    pub fn cell_text(&self, coord: &str) -> Result<Option<String>> {
        let (col, row) = split_coord(coord)?;
        let Some(row_span) = self.row_span(row)? else {
            return Ok(None);
        };
        let row_xml = &self.sheet_xml[row_span.start..row_span.end];
        for cell in element_spans(row_xml, b"c", b"r")? {
            if cell_col(&cell)? == Some(col) {
                return cell_value(&row_xml[cell.start..cell.end], &self.shared_strings);
            }
        }
        Ok(None)
    }

    /// All non-empty texts of one column, keyed by 1-based row number.
    /// A cell whose value is `""` counts as blank, same as a missing cell.
    pub fn column_texts(&self, col: u32) -> Result<BTreeMap<u32, String>> {
        let mut out = BTreeMap::new();
        for row_span in element_spans(&self.sheet_xml, b"row", b"r")? {
            let Some(row) = row_span.key_u32() else {
                continue;
            };
            let row_xml = &self.sheet_xml[row_span.start..row_span.end];
            for cell in element_spans(row_xml, b"c", b"r")? {
                if cell_col(&cell)? != Some(col) {
                    continue;
                }
                if let Some(text) =
                    cell_value(&row_xml[cell.start..cell.end], &self.shared_strings)?
                {
                    if !text.is_empty() {
                        out.insert(row, text);
                    }
                }
                break;
            }
        }
        Ok(out)
    }

    pub(crate) fn row_span(&self, row: u32) -> Result<Option<ElemSpan>> {
        Ok(element_spans(&self.sheet_xml, b"row", b"r")?
            .into_iter()
            .find(|r| r.key_u32() == Some(row)))
    }

    /// Absolute span of the `<c>` element at `(col, row)`, if present.
    pub(crate) fn cell_span(&self, col: u32, row: u32) -> Result<Option<ElemSpan>> {
        let Some(row_span) = self.row_span(row)? else {
            return Ok(None);
        };
        let row_xml = &self.sheet_xml[row_span.start..row_span.end];
        for cell in element_spans(row_xml, b"c", b"r")? {
            if cell_col(&cell)? == Some(col) {
                return Ok(Some(cell.offset(row_span.start)));
            }
        }
        Ok(None)
    }
}

/* ========================== CELL WRITE ==================================== */

impl XlsxEditor {
    /// Writes `text` into `coord` as an inline string.
    ///
    /// An existing cell keeps its style id (`s`); a missing row is created in
    /// `r` order so Excel does not report "recovered records".
    pub fn set_text(&mut self, coord: &str, text: &str) -> Result<()> {
        let (col, row) = split_coord(coord)?;
        let style = match self.cell_span(col, row)? {
            Some(span) => attr_value(&start_tag(&self.sheet_xml, &span)?, b"s"),
            None => None,
        };
        let cell_xml = inline_string_cell(&cell_ref::coord(col, row), style.as_deref(), text)?;
        self.put_cell(col, row, cell_xml)
    }

    /// Replaces the `<c>` at `(col, row)` with `cell_xml`, or inserts it in
    /// column order, creating the row when needed.
    pub(crate) fn put_cell(&mut self, col: u32, row: u32, cell_xml: Vec<u8>) -> Result<()> {
        let Some(row_span) = self.row_span(row)? else {
            return self.insert_row_element(row, cell_xml);
        };

        let row_xml = &self.sheet_xml[row_span.start..row_span.end];
        let row_close = memchr::memmem::rfind(row_xml, b"</").map(|p| row_span.start + p);
        let cells = element_spans(row_xml, b"c", b"r")?;
        let mut insert_at = None;
        for cell in &cells {
            match cell_col(cell)? {
                Some(c) if c == col => {
                    let abs = cell.offset(row_span.start);
                    self.sheet_xml.splice(abs.start..abs.end, cell_xml);
                    return Ok(());
                }
                Some(c) if c > col => {
                    insert_at = Some(row_span.start + cell.start);
                    break;
                }
                _ => {}
            }
        }

        if row_span.self_closing() {
            // <row r="N" .../>  ->  <row r="N" ...><c .../></row>
            let tag = start_tag(&self.sheet_xml, &row_span)?;
            let mut open = Writer::new(Vec::new());
            open.write_event(Event::Start(tag))?;
            let mut replacement = open.into_inner();
            replacement.extend_from_slice(&cell_xml);
            replacement.extend_from_slice(b"</row>");
            self.sheet_xml.splice(row_span.start..row_span.end, replacement);
            return Ok(());
        }

        let pos = match insert_at {
            Some(p) => p,
            None => row_close.context("</row> not found")?,
        };
        self.sheet_xml.splice(pos..pos, cell_xml);
        Ok(())
    }

    /// Inserts `<row r="row">cell</row>` before the first row with a larger
    /// `r`, or at the end of `<sheetData>`.
    fn insert_row_element(&mut self, row: u32, cell_xml: Vec<u8>) -> Result<()> {
        let mut new_row_xml = Vec::with_capacity(cell_xml.len() + 32);
        new_row_xml.extend_from_slice(format!(r#"<row r="{row}">"#).as_bytes());
        new_row_xml.extend_from_slice(&cell_xml);
        new_row_xml.extend_from_slice(b"</row>");

        let next = element_spans(&self.sheet_xml, b"row", b"r")?
            .into_iter()
            .find(|r| r.key_u32().is_some_and(|n| n > row));
        let pos = match next {
            Some(span) => span.start,
            None => self.sheet_data_close()?,
        };
        self.sheet_xml.splice(pos..pos, new_row_xml);
        Ok(())
    }

    /// Position of `</sheetData>`, expanding a self-closing `<sheetData/>` first.
    fn sheet_data_close(&mut self) -> Result<usize> {
        if let Some(pos) = memchr::memmem::rfind(&self.sheet_xml, b"</sheetData>") {
            return Ok(pos);
        }
        let span = element_spans(&self.sheet_xml, b"sheetData", b"")?
            .into_iter()
            .next()
            .context("<sheetData> not found on the current sheet")?;
        let open = span.start + b"<sheetData>".len();
        self.sheet_xml
            .splice(span.start..span.end, b"<sheetData></sheetData>".iter().copied());
        Ok(open)
    }
}

/* ========================== MERGED CELLS ================================== */

/// Elements that must come after `<mergeCells>` in a worksheet.
const AFTER_MERGE_CELLS: [&[u8]; 16] = [
    b"<phoneticPr",
    b"<conditionalFormatting",
    b"<dataValidations",
    b"<hyperlinks",
    b"<printOptions",
    b"<pageMargins",
    b"<pageSetup",
    b"<headerFooter",
    b"<rowBreaks",
    b"<colBreaks",
    b"<customProperties",
    b"<cellWatches",
    b"<ignoredErrors",
    b"<drawing",
    b"<legacyDrawing",
    b"<tableParts",
];

impl XlsxEditor {
    pub fn merged_ranges(&self) -> Result<Vec<CellRange>> {
        let mut out = Vec::new();
        for span in element_spans(&self.sheet_xml, b"mergeCell", b"ref")? {
            if let Some(r) = span.key {
                out.push(r.parse()?);
            }
        }
        Ok(out)
    }

    pub fn merge_cells(&mut self, range: &CellRange) -> Result<()> {
        let tag = format!(r#"<mergeCell ref="{range}"/>"#);

        if let Some(end) = find_bytes(&self.sheet_xml, b"</mergeCells>") {
            self.sheet_xml.splice(end..end, tag.bytes());
            return bump_count(&mut self.sheet_xml, b"<mergeCells");
        }

        // no block yet – create one in schema order
        let sd_end = find_bytes(&self.sheet_xml, b"</sheetData>")
            .context("</sheetData> not found")?
            + "</sheetData>".len();
        let insert_pos = AFTER_MERGE_CELLS
            .iter()
            .filter_map(|t| find_bytes_from(&self.sheet_xml, t, sd_end))
            .min()
            .or_else(|| find_bytes_from(&self.sheet_xml, b"</worksheet>", sd_end))
            .unwrap_or(sd_end);
        let block = format!(r#"<mergeCells count="1">{tag}</mergeCells>"#);
        self.sheet_xml.splice(insert_pos..insert_pos, block.bytes());
        Ok(())
    }
}

/* ========================== XML HELPERS =================================== */

/// Byte span of one element inside a buffer.
#[derive(Debug, Clone)]
pub(crate) struct ElemSpan {
    pub start: usize,
    pub open_end: usize, // just past the start tag's '>'
    pub end: usize,      // just past the end tag (== open_end for `<x/>`)
    pub key: Option<String>,
}

impl ElemSpan {
    pub fn self_closing(&self) -> bool {
        self.open_end == self.end
    }

    pub fn key_u32(&self) -> Option<u32> {
        self.key.as_deref().and_then(|k| k.parse().ok())
    }

    pub fn offset(&self, base: usize) -> ElemSpan {
        ElemSpan {
            start: self.start + base,
            open_end: self.open_end + base,
            end: self.end + base,
            key: self.key.clone(),
        }
    }
}

/// Spans of every `<tag>` element in `xml` (nested ones are skipped over),
/// together with the raw value of the attribute `key`.
pub(crate) fn element_spans(xml: &[u8], tag: &[u8], key: &[u8]) -> Result<Vec<ElemSpan>> {
    let mut rdr = Reader::from_reader(xml);
    let mut spans = Vec::new();
    loop {
        let start = rdr.buffer_position() as usize;
        match rdr.read_event()? {
            Event::Start(ref e) if e.local_name().as_ref() == tag => {
                let open_end = rdr.buffer_position() as usize;
                let key = attr_value(e, key);
                rdr.read_to_end(e.name())?;
                spans.push(ElemSpan {
                    start,
                    open_end,
                    end: rdr.buffer_position() as usize,
                    key,
                });
            }
            Event::Empty(ref e) if e.local_name().as_ref() == tag => {
                let end = rdr.buffer_position() as usize;
                spans.push(ElemSpan {
                    start,
                    open_end: end,
                    end,
                    key: attr_value(e, key),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(spans)
}

pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().with_checks(false).flatten().find_map(|a| {
        (a.key.as_ref() == key).then(|| String::from_utf8_lossy(&a.value).into_owned())
    })
}

/// Parses the start tag of `span` back into an owned `BytesStart`.
pub(crate) fn start_tag(xml: &[u8], span: &ElemSpan) -> Result<BytesStart<'static>> {
    let mut rdr = Reader::from_reader(&xml[span.start..span.open_end]);
    match rdr.read_event()? {
        Event::Start(e) | Event::Empty(e) => Ok(e.into_owned()),
        other => bail!("expected a start tag, found {other:?}"),
    }
}

/// Copy of `e` with attribute `key` set to `value` (replaced in place or appended).
pub(crate) fn set_attr(e: &BytesStart<'_>, key: &[u8], value: &str) -> BytesStart<'static> {
    let mut out = e.clone().into_owned();
    out.clear_attributes();
    let mut replaced = false;
    for a in e.attributes().with_checks(false).flatten() {
        if a.key.as_ref() == key {
            out.push_attribute((key, value.as_bytes()));
            replaced = true;
        } else {
            out.push_attribute(a);
        }
    }
    if !replaced {
        out.push_attribute((key, value.as_bytes()));
    }
    out
}

fn cell_col(span: &ElemSpan) -> Result<Option<u32>> {
    span.key
        .as_deref()
        .map(|k| split_coord(k).map(|(c, _)| c))
        .transpose()
}

/// `<c r=".." [s=".."] t="inlineStr"><is><t>text</t></is></c>`
fn inline_string_cell(coord: &str, style: Option<&str>, text: &str) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let mut c_elem = writer.create_element("c").with_attribute(("r", coord));
    if let Some(s) = style {
        c_elem = c_elem.with_attribute(("s", s));
    }
    c_elem
        .with_attribute(("t", "inlineStr"))
        .write_inner_content(|w| {
            w.create_element("is").write_inner_content(|w2| {
                let mut t = w2.create_element("t");
                if text.trim() != text {
                    t = t.with_attribute(("xml:space", "preserve"));
                }
                t.write_text_content(BytesText::new(text))?;
                Ok(())
            })?;
            Ok(())
        })?;
    Ok(writer.into_inner())
}

/// Text of a single `<c>` element. Phonetic runs (`<rPh>`) and formulas are ignored.
fn cell_value(cell_xml: &[u8], shared: &[String]) -> Result<Option<String>> {
    let mut rdr = Reader::from_reader(cell_xml);
    let mut kind = None;
    let mut text: Option<String> = None;
    loop {
        match rdr.read_event()? {
            Event::Start(ref e) if e.local_name().as_ref() == b"c" => kind = attr_value(e, b"t"),
            Event::Empty(ref e) if e.local_name().as_ref() == b"c" => return Ok(None),
            Event::Start(ref e) if matches!(e.local_name().as_ref(), b"rPh" | b"f") => {
                rdr.read_to_end(e.name())?;
            }
            Event::Start(ref e) if matches!(e.local_name().as_ref(), b"t" | b"v") => {
                let raw = rdr.read_text(e.name())?;
                text.get_or_insert_with(String::new)
                    .push_str(&quick_xml::escape::unescape(&raw)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    match (kind.as_deref(), text) {
        (Some("s"), Some(idx)) => {
            let idx: usize = idx
                .trim()
                .parse()
                .with_context(|| format!("bad shared string index {idx:?}"))?;
            let s = shared
                .get(idx)
                .with_context(|| format!("shared string {idx} out of range"))?;
            Ok(Some(s.clone()))
        }
        (_, text) => Ok(text),
    }
}

/// Parses `xl/sharedStrings.xml` into its string table (rich-text runs joined).
pub(crate) fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut rdr = Reader::from_reader(xml);
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match rdr.read_event()? {
            Event::Start(ref e) if e.local_name().as_ref() == b"si" => {
                current = Some(String::new())
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => out.push(String::new()),
            Event::End(ref e) if e.local_name().as_ref() == b"si" => {
                out.extend(current.take());
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"rPh" => {
                rdr.read_to_end(e.name())?;
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"t" => {
                let raw = rdr.read_text(e.name())?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&quick_xml::escape::unescape(&raw)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/* ========================== BYTE HELPERS ================================== */

pub(crate) fn find_bytes(hay: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(hay, needle)
}

pub(crate) fn find_bytes_from(hay: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    memchr::memmem::find(hay.get(start..)?, needle).map(|p| p + start)
}

/// Increments `count="N"` on the first `tag` start tag. A tag without a
/// `count` attribute is left alone (the attribute is optional).
pub(crate) fn bump_count(xml: &mut Vec<u8>, tag: &[u8]) -> Result<()> {
    let pos = find_bytes(xml, tag)
        .with_context(|| format!("{} not found", String::from_utf8_lossy(tag)))?;
    let tag_end = find_bytes_from(xml, b">", pos).context("unterminated start tag")?;
    let Some(a) = find_bytes_from(xml, b" count=\"", pos).filter(|&a| a < tag_end) else {
        return Ok(());
    };
    let start = a + b" count=\"".len();
    let end = find_bytes_from(xml, b"\"", start).context("closing quote not found")?;
    let num: u32 = std::str::from_utf8(&xml[start..end])?.parse()?;
    xml.splice(start..end, (num + 1).to_string().bytes());
    Ok(())
}
