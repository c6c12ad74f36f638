use crate::{XlsxEditor, attr_value, parse_shared_strings};
use ::zip as zip_crate;
use anyhow::{Context, Result};
use log::debug;
use quick_xml::{Reader, events::Event};
use std::{
    fs,
    io::{Cursor, Read, Seek, Write},
    path::Path,
};
use tempfile::Builder;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PART: &str = "xl/styles.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Work with files
impl XlsxEditor {
    /// Opens a workbook on its active sheet (`workbookView/@activeTab`, first sheet by default).
    pub fn open<P: AsRef<Path>>(src: P) -> Result<Self> {
        let src = src.as_ref();
        let archive = fs::read(src).with_context(|| format!("cannot read {}", src.display()))?;
        let mut zip = zip_crate::ZipArchive::new(Cursor::new(archive.as_slice()))
            .with_context(|| format!("{} is not an xlsx package", src.display()))?;

        let workbook_xml = read_part(&mut zip, WORKBOOK_PART)?;
        let active = active_tab(&workbook_xml)?;
        drop(zip);
        Self::open_in(archive, active)
    }

    /// Opens a workbook on the sheet at `index` (0-based, tab order).
    pub fn open_sheet<P: AsRef<Path>>(src: P, index: usize) -> Result<Self> {
        let src = src.as_ref();
        let archive = fs::read(src).with_context(|| format!("cannot read {}", src.display()))?;
        Self::open_in(archive, index)
    }

    fn open_in(archive: Vec<u8>, index: usize) -> Result<Self> {
        let mut zip = zip_crate::ZipArchive::new(Cursor::new(archive.as_slice()))
            .context("not an xlsx package")?;

        // ── workbook.xml + rels → sheet part path ─────────────────────
        let workbook_xml = read_part(&mut zip, WORKBOOK_PART)?;
        let rels_xml = read_part(&mut zip, WORKBOOK_RELS_PART)?;
        let sheets = sheet_entries(&workbook_xml)?;
        let (sheet_name, rid) = sheets
            .get(index)
            .cloned()
            .with_context(|| format!("sheet #{index} not found ({} sheets)", sheets.len()))?;
        let target = relationship_target(&rels_xml, &rid)?
            .with_context(|| format!("relationship {rid} not found"))?;
        let sheet_path = part_path(&target);
        debug!("sheet {sheet_name:?} -> {sheet_path}");

        let sheet_xml = read_part(&mut zip, &sheet_path)?;
        let styles_xml = read_part(&mut zip, STYLES_PART)?;

        // ── sharedStrings.xml is optional ─────────────────────────────
        let shared_strings = match read_optional_part(&mut zip, SHARED_STRINGS_PART)? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        drop(zip);
        Ok(Self {
            archive,
            sheet_name,
            sheet_path,
            sheet_xml,
            styles_xml,
            shared_strings,
        })
    }

    /// Serialises the package: the edited sheet and `styles.xml` are written
    /// from memory, every other entry is raw-copied from the source.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zin = zip_crate::ZipArchive::new(Cursor::new(self.archive.as_slice()))?;
        let mut zout =
            zip_crate::ZipWriter::new(Cursor::new(Vec::with_capacity(self.archive.len() + 1024)));

        let opt: zip_crate::write::FileOptions<'_, ()> = zip_crate::write::FileOptions::default()
            .compression_method(zip_crate::CompressionMethod::Deflated)
            .compression_level(Some(1));

        for i in 0..zin.len() {
            let file = zin.by_index_raw(i)?;
            let name = file.name().to_owned();

            if name == self.sheet_path {
                zout.start_file(name.as_str(), opt)?;
                zout.write_all(&self.sheet_xml)?;
            } else if name == STYLES_PART {
                zout.start_file(name.as_str(), opt)?;
                zout.write_all(&self.styles_xml)?;
            } else {
                zout.raw_copy_file(file)?;
            }
        }

        Ok(zout.finish()?.into_inner())
    }

    /// Saves the workbook to `dst` (which may be the file it was opened from).
    pub fn save<P: AsRef<Path>>(&self, dst: P) -> Result<()> {
        write_atomic(dst, &self.to_bytes()?)
    }
}

/// Writes `bytes` to a temp file next to `dst` and renames it over `dst`, so a
/// failed save never leaves a truncated workbook behind.
pub fn write_atomic<P: AsRef<Path>>(dst: P, bytes: &[u8]) -> Result<()> {
    let dst = dst.as_ref();
    let dir = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    // keep the mode of the file being replaced, otherwise 0666 minus umask like a plain create
    let existing = fs::metadata(dst)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.permissions());
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = Builder::new();
    #[cfg(unix)]
    builder.permissions(<fs::Permissions as std::os::unix::fs::PermissionsExt>::from_mode(0o666));
    let mut tmp = builder
        .tempfile_in(dir)
        .with_context(|| format!("cannot create a temp file in {}", dir.display()))?;
    if let Some(perms) = existing {
        tmp.as_file().set_permissions(perms)?;
    }
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dst)
        .map_err(|e| e.error)
        .with_context(|| format!("cannot write {}", dst.display()))?;
    debug!("saved {} ({} bytes)", dst.display(), bytes.len());
    Ok(())
}

fn read_part<R: Read + Seek>(zip: &mut zip_crate::ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    read_optional_part(zip, name)?.with_context(|| format!("{name} not found"))
}

fn read_optional_part<R: Read + Seek>(
    zip: &mut zip_crate::ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    let mut part = match zip.by_name(name) {
        Ok(part) => part,
        Err(zip_crate::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("cannot open {name}")),
    };
    let mut buf = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// `(name, r:id)` of every `<sheet>` in tab order.
fn sheet_entries(workbook_xml: &[u8]) -> Result<Vec<(String, String)>> {
    let mut rdr = Reader::from_reader(workbook_xml);
    let mut sheets = Vec::new();
    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(e, b"name").unwrap_or_default();
                let rid = e.attributes().with_checks(false).flatten().find_map(|a| {
                    (a.key.local_name().as_ref() == b"id")
                        .then(|| String::from_utf8_lossy(&a.value).into_owned())
                });
                if let Some(rid) = rid {
                    sheets.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

fn active_tab(workbook_xml: &[u8]) -> Result<usize> {
    let mut rdr = Reader::from_reader(workbook_xml);
    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"workbookView" =>
            {
                return Ok(attr_value(e, b"activeTab")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0));
            }
            Event::Eof => return Ok(0),
            _ => {}
        }
    }
}

fn relationship_target(rels_xml: &[u8], rid: &str) -> Result<Option<String>> {
    let mut rdr = Reader::from_reader(rels_xml);
    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship"
                    && attr_value(e, b"Id").as_deref() == Some(rid) =>
            {
                return Ok(attr_value(e, b"Target"));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Relationship target (relative to `xl/` or absolute) -> zip entry name.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_owned(),
        None => format!("xl/{target}"),
    }
}
