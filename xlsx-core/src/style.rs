//! style.rs – reading and patching cell formats in `xl/styles.xml`.
//!
//! Attribute values (font names, colours) are kept exactly as they appear in
//! the XML, so whatever is read from one cell can be written onto another
//! without a decode/encode round-trip.

use anyhow::{Context, Result, bail};
use log::debug;
use quick_xml::{
    Reader, Writer,
    events::{BytesStart, Event},
};
use std::ops::Range;
use std::{fmt, str::FromStr};

use crate::{
    XlsxEditor, attr_value, bump_count, coord, find_bytes, set_attr, split_coord, start_tag,
};

/* ========================== ALIGNMENT API ================================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HorizAlignment {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterContinuous,
    Distributed,
}
impl fmt::Display for HorizAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HorizAlignment::General => "general",
            HorizAlignment::Left => "left",
            HorizAlignment::Center => "center",
            HorizAlignment::Right => "right",
            HorizAlignment::Fill => "fill",
            HorizAlignment::Justify => "justify",
            HorizAlignment::CenterContinuous => "centerContinuous",
            HorizAlignment::Distributed => "distributed",
        })
    }
}
impl FromStr for HorizAlignment {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "general" => HorizAlignment::General,
            "left" => HorizAlignment::Left,
            "center" => HorizAlignment::Center,
            "right" => HorizAlignment::Right,
            "fill" => HorizAlignment::Fill,
            "justify" => HorizAlignment::Justify,
            "centerContinuous" => HorizAlignment::CenterContinuous,
            "distributed" => HorizAlignment::Distributed,
            _ => bail!("Unknown horizontal alignment: {s}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertAlignment {
    Top,
    Center,
    Bottom,
    Justify,
    Distributed,
}
impl fmt::Display for VertAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VertAlignment::Top => "top",
            VertAlignment::Center => "center",
            VertAlignment::Bottom => "bottom",
            VertAlignment::Justify => "justify",
            VertAlignment::Distributed => "distributed",
        })
    }
}
impl FromStr for VertAlignment {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "top" => VertAlignment::Top,
            "center" => VertAlignment::Center,
            "bottom" => VertAlignment::Bottom,
            "justify" => VertAlignment::Justify,
            "distributed" => VertAlignment::Distributed,
            _ => bail!("Unknown vertical alignment: {s}"),
        })
    }
}

/// Horizontal and vertical placement; other `<alignment>` attributes are not carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignSpec {
    pub horiz: Option<HorizAlignment>,
    pub vert: Option<VertAlignment>,
}

impl AlignSpec {
    pub fn is_empty(&self) -> bool {
        self.horiz.is_none() && self.vert.is_none()
    }

    fn from_tag(e: &BytesStart<'_>) -> Self {
        // unknown values are dropped rather than failing the whole read
        AlignSpec {
            horiz: attr_value(e, b"horizontal").and_then(|v| v.parse().ok()),
            vert: attr_value(e, b"vertical").and_then(|v| v.parse().ok()),
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<alignment");
        if let Some(h) = &self.horiz {
            xml.push_str(&format!(r#" horizontal="{h}""#));
        }
        if let Some(v) = &self.vert {
            xml.push_str(&format!(r#" vertical="{v}""#));
        }
        xml.push_str("/>");
        xml
    }
}

/* ========================== FONT / BORDER ================================= */

/// A `<color>` element, attributes verbatim (`rgb`, `theme`, `indexed`, `tint`, …).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorSpec {
    pub attrs: Vec<(String, String)>,
}

impl ColorSpec {
    /// `argb` such as `"FF000000"`.
    pub fn rgb(argb: &str) -> Self {
        ColorSpec {
            attrs: vec![("rgb".to_owned(), argb.to_owned())],
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn from_tag(e: &BytesStart<'_>) -> Self {
        ColorSpec {
            attrs: e
                .attributes()
                .with_checks(false)
                .flatten()
                .map(|a| {
                    (
                        String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                        String::from_utf8_lossy(&a.value).into_owned(),
                    )
                })
                .collect(),
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<color");
        for (k, v) in &self.attrs {
            xml.push_str(&format!(r#" {k}="{v}""#));
        }
        xml.push_str("/>");
        xml
    }
}

/// The font properties carried between cells: name, size, bold and colour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontSpec {
    pub name: Option<String>,
    pub size: Option<String>,
    pub bold: bool,
    pub color: Option<ColorSpec>,
}

impl FontSpec {
    fn parse(xml: &[u8]) -> Result<Self> {
        let mut rdr = Reader::from_reader(xml);
        let mut font = FontSpec::default();
        loop {
            match rdr.read_event()? {
                Event::Empty(ref e) | Event::Start(ref e) => match e.local_name().as_ref() {
                    b"b" => {
                        font.bold = attr_value(e, b"val").is_none_or(|v| v != "0" && v != "false")
                    }
                    b"sz" => font.size = attr_value(e, b"val"),
                    b"name" => font.name = attr_value(e, b"val"),
                    b"color" => font.color = Some(ColorSpec::from_tag(e)),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(font)
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<font>");
        if self.bold {
            xml.push_str("<b/>");
        }
        if let Some(sz) = &self.size {
            xml.push_str(&format!(r#"<sz val="{sz}"/>"#));
        }
        if let Some(c) = &self.color {
            xml.push_str(&c.to_xml());
        }
        if let Some(name) = &self.name {
            xml.push_str(&format!(r#"<name val="{name}"/>"#));
        }
        xml.push_str("</font>");
        xml
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderEdge {
    pub style: String,
    pub color: Option<ColorSpec>,
}

/// Four sides of a `<border>`; `None` means no line. Diagonals are not carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorderSpec {
    pub left: Option<BorderEdge>,
    pub right: Option<BorderEdge>,
    pub top: Option<BorderEdge>,
    pub bottom: Option<BorderEdge>,
}

impl BorderSpec {
    /// The same line on all four sides.
    pub fn uniform(style: &str, color: ColorSpec) -> Self {
        let edge = Some(BorderEdge {
            style: style.to_owned(),
            color: Some(color),
        });
        BorderSpec {
            left: edge.clone(),
            right: edge.clone(),
            top: edge.clone(),
            bottom: edge,
        }
    }

    pub fn sides(&self) -> [&Option<BorderEdge>; 4] {
        [&self.left, &self.right, &self.top, &self.bottom]
    }

    fn side_mut(&mut self, name: &[u8]) -> Option<&mut Option<BorderEdge>> {
        match name {
            b"left" | b"start" => Some(&mut self.left),
            b"right" | b"end" => Some(&mut self.right),
            b"top" => Some(&mut self.top),
            b"bottom" => Some(&mut self.bottom),
            _ => None,
        }
    }

    fn parse(xml: &[u8]) -> Result<Self> {
        let mut rdr = Reader::from_reader(xml);
        let mut spec = BorderSpec::default();
        let mut current: Option<(Vec<u8>, BorderEdge)> = None;
        loop {
            match rdr.read_event()? {
                Event::Start(ref e) if e.local_name().as_ref() == b"color" => {
                    if let Some((_, edge)) = current.as_mut() {
                        edge.color = Some(ColorSpec::from_tag(e));
                    }
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"color" => {
                    if let Some((_, edge)) = current.as_mut() {
                        edge.color = Some(ColorSpec::from_tag(e));
                    }
                }
                Event::Start(ref e) => {
                    let name = e.local_name().as_ref().to_vec();
                    current = attr_value(e, b"style")
                        .filter(|s| s != "none")
                        .map(|style| (name, BorderEdge { style, color: None }));
                }
                Event::Empty(ref e) => {
                    let name = e.local_name().as_ref().to_vec();
                    if let (Some(style), Some(side)) =
                        (attr_value(e, b"style"), spec.side_mut(&name))
                    {
                        if style != "none" {
                            *side = Some(BorderEdge { style, color: None });
                        }
                    }
                }
                Event::End(ref e) => {
                    let name = e.local_name().as_ref().to_vec();
                    if let Some((open, edge)) = current.take() {
                        if open == name {
                            if let Some(side) = spec.side_mut(&name) {
                                *side = Some(edge);
                            }
                        } else {
                            current = Some((open, edge));
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(spec)
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<border>");
        for (name, edge) in ["left", "right", "top", "bottom"].into_iter().zip(self.sides()) {
            match edge {
                Some(edge) => {
                    xml.push_str(&format!(r#"<{name} style="{}">"#, edge.style));
                    if let Some(c) = &edge.color {
                        xml.push_str(&c.to_xml());
                    }
                    xml.push_str(&format!("</{name}>"));
                }
                None => xml.push_str(&format!("<{name}/>")),
            }
        }
        xml.push_str("<diagonal/></border>");
        xml
    }
}

/// Resolved format of one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellFormat {
    pub font: Option<FontSpec>,
    pub align: Option<AlignSpec>,
    pub border: Option<BorderSpec>,
}

/// What to change on a cell; `None` parts keep the cell's current value.
/// `align: Some(AlignSpec::default())` clears the alignment.
#[derive(Debug, Clone, Default)]
pub struct StylePatch {
    pub font: Option<FontSpec>,
    pub align: Option<AlignSpec>,
    pub border: Option<BorderSpec>,
}

/* ========================== CELL XF ======================================= */

/// One `<xf>` of `<cellXfs>`.
#[derive(Debug, Clone, Default)]
struct XfRecord {
    num_fmt_id: u32,
    font_id: u32,
    fill_id: u32,
    border_id: u32,
    xf_id: u32,
    align: Option<AlignSpec>,
    protection: Option<String>, // raw <protection .../>
}

impl XfRecord {
    fn parse(xml: &[u8]) -> Result<Self> {
        fn id(e: &BytesStart<'_>, key: &[u8]) -> u32 {
            attr_value(e, key).and_then(|v| v.parse().ok()).unwrap_or(0)
        }

        let mut rdr = Reader::from_reader(xml);
        let mut xf = XfRecord::default();
        loop {
            match rdr.read_event()? {
                Event::Empty(ref e) | Event::Start(ref e) => match e.local_name().as_ref() {
                    b"xf" => {
                        xf.num_fmt_id = id(e, b"numFmtId");
                        xf.font_id = id(e, b"fontId");
                        xf.fill_id = id(e, b"fillId");
                        xf.border_id = id(e, b"borderId");
                        xf.xf_id = id(e, b"xfId");
                    }
                    b"alignment" => xf.align = Some(AlignSpec::from_tag(e)),
                    b"protection" => {
                        let mut w = Writer::new(Vec::new());
                        w.write_event(Event::Empty(e.clone()))?;
                        xf.protection = Some(String::from_utf8(w.into_inner())?);
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(xf)
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="{}""#,
            self.num_fmt_id, self.font_id, self.fill_id, self.border_id, self.xf_id
        );
        if self.num_fmt_id != 0 {
            xml.push_str(r#" applyNumberFormat="1""#);
        }
        xml.push_str(r#" applyFont="1""#);
        if self.fill_id != 0 {
            xml.push_str(r#" applyFill="1""#);
        }
        xml.push_str(r#" applyBorder="1""#);

        let align = self.align.as_ref().filter(|a| !a.is_empty());
        if align.is_some() {
            xml.push_str(r#" applyAlignment="1""#);
        }
        if self.protection.is_some() {
            xml.push_str(r#" applyProtection="1""#);
        }
        if align.is_none() && self.protection.is_none() {
            xml.push_str("/>");
            return xml;
        }
        xml.push('>');
        if let Some(a) = align {
            xml.push_str(&a.to_xml());
        }
        if let Some(p) = &self.protection {
            xml.push_str(p);
        }
        xml.push_str("</xf>");
        xml
    }
}

/* ========================== PUBLIC API ==================================== */

impl XlsxEditor {
    /// Style id (`s`) of a cell; 0 when the cell or the attribute is absent.
    pub fn cell_style_id(&self, coord: &str) -> Result<u32> {
        let (col, row) = split_coord(coord)?;
        let Some(span) = self.cell_span(col, row)? else {
            return Ok(0);
        };
        Ok(attr_value(&start_tag(&self.sheet_xml, &span)?, b"s")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    /// Font, alignment and border currently in effect on `coord`.
    pub fn cell_format(&self, coord: &str) -> Result<CellFormat> {
        let sid = self.cell_style_id(coord)?;
        let Some(xf) = self.read_xf(sid)? else {
            return Ok(CellFormat::default());
        };
        Ok(CellFormat {
            font: self.read_font(xf.font_id)?,
            align: xf.align.filter(|a| !a.is_empty()),
            border: self.read_border(xf.border_id)?,
        })
    }

    /// Layers `patch` over the cell's current format (fill and number format
    /// are kept) and points the cell at the resulting style id.
    ///
    /// Fonts, borders and xfs are looked up before being added, so applying
    /// the same patch again reuses the same ids.
    pub fn apply_style(&mut self, coord: &str, patch: &StylePatch) -> Result<u32> {
        let sid = self.cell_style_id(coord)?;
        let mut xf = self.read_xf(sid)?.unwrap_or_default();

        if let Some(font) = &patch.font {
            xf.font_id = self.ensure_entry("fonts", "font", &font.to_xml())?;
        }
        if let Some(border) = &patch.border {
            xf.border_id = self.ensure_entry("borders", "border", &border.to_xml())?;
        }
        if let Some(align) = &patch.align {
            xf.align = Some(align.clone());
        }
        let new_sid = self.ensure_entry("cellXfs", "xf", &xf.to_xml())?;
        debug!(
            "{coord}: style {sid} -> {new_sid} (font {}, border {})",
            xf.font_id, xf.border_id
        );

        self.apply_style_to_cell(coord, new_sid)?;
        Ok(new_sid)
    }
}

/* ========================== LOW-LEVEL HELPERS ============================= */

impl XlsxEditor {
    fn read_xf(&self, style_id: u32) -> Result<Option<XfRecord>> {
        match self.style_entry("cellXfs", "xf", style_id)? {
            Some(xml) => Ok(Some(XfRecord::parse(xml)?)),
            None => Ok(None),
        }
    }

    fn read_font(&self, font_id: u32) -> Result<Option<FontSpec>> {
        match self.style_entry("fonts", "font", font_id)? {
            Some(xml) => Ok(Some(FontSpec::parse(xml)?)),
            None => Ok(None),
        }
    }

    fn read_border(&self, border_id: u32) -> Result<Option<BorderSpec>> {
        match self.style_entry("borders", "border", border_id)? {
            Some(xml) => Ok(Some(BorderSpec::parse(xml)?)),
            None => Ok(None),
        }
    }

    /// Raw XML of the `index`-th `<child>` of `<block>`.
    fn style_entry(&self, block: &str, child: &str, index: u32) -> Result<Option<&[u8]>> {
        let children = style_children(&self.styles_xml, block.as_bytes(), child.as_bytes())?
            .unwrap_or_default();
        Ok(children
            .get(index as usize)
            .map(|r| &self.styles_xml[r.clone()]))
    }

    /// Index of an entry whose XML equals `xml`, appending it when missing.
    fn ensure_entry(&mut self, block: &str, child: &str, xml: &str) -> Result<u32> {
        let children = style_children(&self.styles_xml, block.as_bytes(), child.as_bytes())?
            .with_context(|| format!("styles.xml: <{block}> not found"))?;
        if let Some(i) = children
            .iter()
            .position(|r| self.styles_xml[r.clone()] == *xml.as_bytes())
        {
            return Ok(i as u32);
        }

        let close = format!("</{block}>");
        let pos = find_bytes(&self.styles_xml, close.as_bytes())
            .with_context(|| format!("styles.xml: {close} not found"))?;
        self.styles_xml.splice(pos..pos, xml.bytes());
        bump_count(&mut self.styles_xml, format!("<{block}").as_bytes())?;
        Ok(children.len() as u32)
    }

    fn apply_style_to_cell(&mut self, coord_str: &str, style: u32) -> Result<()> {
        let (col, row) = split_coord(coord_str)?;
        let Some(span) = self.cell_span(col, row)? else {
            let cell = format!(r#"<c r="{}" s="{style}"/>"#, coord(col, row));
            return self.put_cell(col, row, cell.into_bytes());
        };

        let tag = set_attr(&start_tag(&self.sheet_xml, &span)?, b"s", &style.to_string());
        let mut w = Writer::new(Vec::new());
        if span.self_closing() {
            w.write_event(Event::Empty(tag))?;
        } else {
            w.write_event(Event::Start(tag))?;
        }
        self.sheet_xml.splice(span.start..span.open_end, w.into_inner());
        Ok(())
    }
}

/// Byte ranges of the direct `<child>` elements of the first `<block>`;
/// `None` when the block is missing.
fn style_children(xml: &[u8], block: &[u8], child: &[u8]) -> Result<Option<Vec<Range<usize>>>> {
    let mut rdr = Reader::from_reader(xml);
    let mut out = Vec::new();
    let mut inside = false;
    loop {
        let start = rdr.buffer_position() as usize;
        match rdr.read_event()? {
            Event::Start(ref e) if !inside && e.local_name().as_ref() == block => inside = true,
            Event::Empty(ref e) if !inside && e.local_name().as_ref() == block => {
                return Ok(Some(out));
            }
            Event::End(ref e) if inside && e.local_name().as_ref() == block => return Ok(Some(out)),
            Event::Start(ref e) if inside && e.local_name().as_ref() == child => {
                rdr.read_to_end(e.name())?;
                out.push(start..rdr.buffer_position() as usize);
            }
            Event::Empty(ref e) if inside && e.local_name().as_ref() == child => {
                out.push(start..rdr.buffer_position() as usize);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
