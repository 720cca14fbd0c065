//! Minimal OOXML workbook editing: append worksheets to an existing
//! `.xlsx` package and read cell text back.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArcError;
use crate::sheets::{Cell, Table};

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const CT_WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// Optional namespace prefix in front of an element name, e.g. `x:` in `<x:sheet>`.
const PREFIX: &str = r"(?:[A-Za-z_][\w.-]*:)?";

static SHEET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"<{PREFIX}sheet\s[^>]*>")).unwrap());
static REL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"<{PREFIX}Relationship\s[^>]*>")).unwrap());
static REL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"xmlns:([A-Za-z_][\w.-]*)="{}""#,
        regex::escape(NS_REL)
    ))
    .unwrap()
});
static ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z_][\w.:-]*)="([^"]*)""#).unwrap());
static SHEET_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").unwrap());
static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)<{PREFIX}row\b([^>]*?)(?:/>|>(.*?)</{PREFIX}row>)"
    ))
    .unwrap()
});
static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)<{PREFIX}c\b([^>]*?)(?:/>|>(.*?)</{PREFIX}c>)")).unwrap()
});
static TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)<{PREFIX}t\b[^>]*>(.*?)</{PREFIX}t>")).unwrap()
});
static VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?s)<{PREFIX}v>(.*?)</{PREFIX}v>")).unwrap());
static SHARED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?s)<{PREFIX}si>(.*?)</{PREFIX}si>")).unwrap());

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    sheet_id: u32,
    rel_id: String,
}

#[derive(Debug, Clone)]
struct Package {
    entries: Vec<(String, Vec<u8>)>,
}

impl Package {
    fn open(path: &Path) -> Result<Self, ArcError> {
        let file = fs::File::open(path)
            .map_err(|err| ArcError::Workbook(format!("open {}: {err}", path.display())))?;
        let mut archive =
            ZipArchive::new(file).map_err(|err| ArcError::Workbook(err.to_string()))?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|err| ArcError::Workbook(err.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|err| ArcError::Workbook(err.to_string()))?;
            entries.push((name, content));
        }
        Ok(Self { entries })
    }

    fn text(&self, name: &str) -> Result<String, ArcError> {
        let (_, content) = self
            .entries
            .iter()
            .find(|(entry, _)| entry == name)
            .ok_or_else(|| ArcError::Workbook(format!("package has no {name}")))?;
        String::from_utf8(content.clone()).map_err(|err| ArcError::Workbook(err.to_string()))
    }

    fn put(&mut self, name: &str, content: Vec<u8>) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some(entry) => entry.1 = content,
            None => self.entries.push((name.to_string(), content)),
        }
    }

    fn sheets(&self) -> Result<Vec<SheetEntry>, ArcError> {
        let workbook = self.text(WORKBOOK)?;
        let rel_attr = format!(
            "{}:id",
            relationship_prefix(&workbook).unwrap_or("r")
        );
        SHEET_TAG
            .find_iter(&workbook)
            .map(|tag| {
                let attrs = attributes(tag.as_str());
                let name = attrs
                    .get("name")
                    .map(|name| unescape(name))
                    .ok_or_else(|| ArcError::Workbook("sheet without name".to_string()))?;
                let sheet_id = attrs
                    .get("sheetId")
                    .and_then(|id| id.parse().ok())
                    .unwrap_or(0);
                let rel_id = attrs.get(&rel_attr).cloned().unwrap_or_default();
                Ok(SheetEntry {
                    name,
                    sheet_id,
                    rel_id,
                })
            })
            .collect()
    }

    /// Relationship id -> package part name.
    fn sheet_targets(&self) -> Result<HashMap<String, String>, ArcError> {
        let rels = self.text(WORKBOOK_RELS)?;
        Ok(REL_TAG
            .find_iter(&rels)
            .filter_map(|tag| {
                let attrs = attributes(tag.as_str());
                let id = attrs.get("Id")?.clone();
                let target = attrs.get("Target")?;
                let part = match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{target}"),
                };
                Some((id, part))
            })
            .collect())
    }

    fn write(&self, path: &Path) -> Result<(), ArcError> {
        let parent = path
            .parent()
            .ok_or_else(|| ArcError::Filesystem("invalid workbook path".to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("omero-arc-xlsx")
            .tempfile_in(parent)
            .map_err(|err| ArcError::Filesystem(err.to_string()))?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(temp.as_file());
        for (name, content) in &self.entries {
            writer
                .start_file(name.as_str(), options)
                .map_err(|err| ArcError::Workbook(err.to_string()))?;
            writer
                .write_all(content)
                .map_err(|err| ArcError::Workbook(err.to_string()))?;
        }
        writer
            .finish()
            .map_err(|err| ArcError::Workbook(err.to_string()))?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(temp.path(), meta.permissions())
                .map_err(|err| ArcError::Filesystem(err.to_string()))?;
        }
        temp.persist(path)
            .map_err(|err| ArcError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Appends one worksheet per table to the workbook at `path`.
pub fn append_sheets(path: &Path, tables: &[Table]) -> Result<(), ArcError> {
    let mut package = Package::open(path)?;
    let existing = package.sheets()?;
    for table in tables {
        if existing.iter().any(|sheet| sheet.name == table.name) {
            return Err(ArcError::Workbook(format!(
                "sheet {:?} already exists in {}",
                table.name,
                path.display()
            )));
        }
    }

    let mut workbook = package.text(WORKBOOK)?;
    let mut rels = package.text(WORKBOOK_RELS)?;
    let mut content_types = package.text(CONTENT_TYPES)?;

    let mut next_part = package
        .entries
        .iter()
        .filter_map(|(name, _)| SHEET_PART.captures(name))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let mut next_sheet_id = existing.iter().map(|s| s.sheet_id).max().unwrap_or(0);
    let mut next_rel = REL_TAG
        .find_iter(&rels)
        .filter_map(|tag| attributes(tag.as_str()).get("Id").cloned())
        .filter_map(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
        .max()
        .unwrap_or(0);

    let rel_attr = match relationship_prefix(&workbook) {
        Some(prefix) => format!("{prefix}:id"),
        None => format!(r#"xmlns:r="{NS_REL}" r:id"#),
    };

    for table in tables {
        next_part += 1;
        next_sheet_id += 1;
        next_rel += 1;
        let part = format!("worksheets/sheet{next_part}.xml");
        let rel_id = format!("rId{next_rel}");

        let name = escape(&table.name);
        workbook = insert_into(&workbook, "sheets", |prefix| {
            format!(r#"<{prefix}sheet name="{name}" sheetId="{next_sheet_id}" {rel_attr}="{rel_id}"/>"#)
        })?;
        rels = insert_into(&rels, "Relationships", |prefix| {
            format!(
                r#"<{prefix}Relationship Id="{rel_id}" Type="{REL_WORKSHEET}" Target="{part}"/>"#
            )
        })?;
        content_types = insert_into(&content_types, "Types", |prefix| {
            format!(r#"<{prefix}Override PartName="/xl/{part}" ContentType="{CT_WORKSHEET}"/>"#)
        })?;
        package.put(&format!("xl/{part}"), worksheet_xml(table).into_bytes());
    }

    package.put(WORKBOOK, workbook.into_bytes());
    package.put(WORKBOOK_RELS, rels.into_bytes());
    package.put(CONTENT_TYPES, content_types.into_bytes());
    package.write(path)
}

/// Writes a fresh workbook containing only `tables`.
pub fn new_workbook(path: &Path, tables: &[Table]) -> Result<(), ArcError> {
    let package = Package {
        entries: vec![
            (
                CONTENT_TYPES.to_string(),
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                    r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
                    "</Types>"
                )
                .as_bytes()
                .to_vec(),
            ),
            (
                "_rels/.rels".to_string(),
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
                    "</Relationships>"
                )
                .as_bytes()
                .to_vec(),
            ),
            (
                WORKBOOK.to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets></sheets></workbook>"#
                )
                .into_bytes(),
            ),
            (
                WORKBOOK_RELS.to_string(),
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                    "</Relationships>"
                )
                .as_bytes()
                .to_vec(),
            ),
        ],
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ArcError::Filesystem(err.to_string()))?;
    }
    package.write(path)?;
    append_sheets(path, tables)
}

pub fn sheet_names(path: &Path) -> Result<Vec<String>, ArcError> {
    let package = Package::open(path)?;
    Ok(package.sheets()?.into_iter().map(|sheet| sheet.name).collect())
}

/// Cell text of every row of `sheet`, header row included.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<Vec<Vec<String>>, ArcError> {
    let package = Package::open(path)?;
    let entry = package
        .sheets()?
        .into_iter()
        .find(|entry| entry.name == sheet)
        .ok_or_else(|| ArcError::Workbook(format!("no sheet named {sheet:?}")))?;
    let part = package
        .sheet_targets()?
        .remove(&entry.rel_id)
        .ok_or_else(|| ArcError::Workbook(format!("dangling relationship {}", entry.rel_id)))?;
    let shared = match package.text(SHARED_STRINGS) {
        Ok(xml) => SHARED_ITEM
            .captures_iter(&xml)
            .map(|caps| joined_text(&caps[1]))
            .collect(),
        Err(_) => Vec::new(),
    };
    let xml = package.text(&part)?;

    let mut rows = Vec::new();
    for row in ROW.captures_iter(&xml) {
        let mut cells = Vec::new();
        let Some(body) = row.get(2) else {
            rows.push(cells);
            continue;
        };
        for cell in CELL.captures_iter(body.as_str()) {
            let attrs = attributes(&cell[1]);
            let column = attrs
                .get("r")
                .map(|reference| column_index(reference))
                .unwrap_or(cells.len());
            let inner = cell.get(2).map(|m| m.as_str()).unwrap_or("");
            let value = match attrs.get("t").map(String::as_str) {
                Some("inlineStr") => joined_text(inner),
                Some("s") => VALUE
                    .captures(inner)
                    .and_then(|v| v[1].parse::<usize>().ok())
                    .and_then(|idx| shared.get(idx).cloned())
                    .unwrap_or_default(),
                _ => VALUE
                    .captures(inner)
                    .map(|v| unescape(&v[1]))
                    .unwrap_or_default(),
            };
            if cells.len() < column {
                cells.resize(column, String::new());
            }
            cells.push(value);
        }
        rows.push(cells);
    }
    Ok(rows)
}

fn worksheet_xml(table: &Table) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{NS_MAIN}"><sheetData>"#
    );
    let header = table
        .columns
        .iter()
        .map(|column| Cell::Text(column.clone()))
        .collect::<Vec<_>>();
    for (idx, row) in std::iter::once(&header).chain(&table.rows).enumerate() {
        let number = idx + 1;
        xml.push_str(&format!(r#"<row r="{number}">"#));
        for (col, cell) in row.iter().enumerate() {
            let reference = format!("{}{number}", column_name(col));
            match cell {
                Cell::Empty => {}
                Cell::Int(value) => {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#))
                }
                Cell::Float(value) if value.is_finite() => {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#))
                }
                other => xml.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    escape(&other.to_string())
                )),
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Inserts a child at the end of the last `element` in `xml`. `child` gets
/// the namespace prefix the document uses for `element` (`""` or `"x:"`).
fn insert_into(
    xml: &str,
    element: &str,
    child: impl Fn(&str) -> String,
) -> Result<String, ArcError> {
    let element_pattern = regex::escape(element);
    let closing = Regex::new(&format!(r"</({PREFIX}){element_pattern}\s*>"))
        .map_err(|err| ArcError::Workbook(err.to_string()))?;
    if let Some(caps) = closing.captures_iter(xml).last() {
        let (Some(tag), Some(prefix)) = (caps.get(0), caps.get(1)) else {
            return Err(ArcError::Workbook(format!("malformed {element} element")));
        };
        let fragment = child(prefix.as_str());
        let mut out = String::with_capacity(xml.len() + fragment.len());
        out.push_str(&xml[..tag.start()]);
        out.push_str(&fragment);
        out.push_str(&xml[tag.start()..]);
        return Ok(out);
    }
    // An empty element may be written self-closing, e.g. `<x:sheets/>`.
    let self_closing = Regex::new(&format!(r"<({PREFIX}){element_pattern}(\s[^>]*?)?\s*/>"))
        .map_err(|err| ArcError::Workbook(err.to_string()))?;
    match self_closing.captures_iter(xml).last() {
        Some(caps) => {
            let (Some(tag), Some(prefix)) = (caps.get(0), caps.get(1)) else {
                return Err(ArcError::Workbook(format!("malformed {element} element")));
            };
            let prefix = prefix.as_str();
            let attrs = caps.get(2).map(|m| m.as_str().trim_end()).unwrap_or("");
            Ok(format!(
                "{}<{prefix}{element}{attrs}>{}</{prefix}{element}>{}",
                &xml[..tag.start()],
                child(prefix),
                &xml[tag.end()..]
            ))
        }
        None => Err(ArcError::Workbook(format!(
            "malformed package part, missing </{element}>"
        ))),
    }
}

/// Prefix the workbook binds to the relationships namespace, usually `r`.
fn relationship_prefix(workbook: &str) -> Option<&str> {
    REL_PREFIX
        .captures(workbook)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn attributes(tag: &str) -> HashMap<String, String> {
    ATTR.captures_iter(tag)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn joined_text(xml: &str) -> String {
    TEXT.captures_iter(xml)
        .map(|caps| unescape(&caps[1]))
        .collect()
}

fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn column_index(reference: &str) -> usize {
    reference
        .chars()
        .take_while(|ch| ch.is_ascii_alphabetic())
        .fold(0usize, |acc, ch| {
            acc * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1)
        })
        .saturating_sub(1)
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_roll_over() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_index("A7"), 0);
        assert_eq!(column_index("AB12"), 27);
    }

    #[test]
    fn self_closing_sheets_element_is_expanded() {
        let xml = "<workbook><sheets/></workbook>";
        let out = insert_into(xml, "sheets", |prefix| format!("<{prefix}sheet/>")).unwrap();
        assert_eq!(out, "<workbook><sheets><sheet/></sheets></workbook>");

        let prefixed = "<x:workbook><x:sheets /><x:calcPr/></x:workbook>";
        let out = insert_into(prefixed, "sheets", |prefix| format!("<{prefix}sheet/>")).unwrap();
        assert_eq!(
            out,
            "<x:workbook><x:sheets><x:sheet/></x:sheets><x:calcPr/></x:workbook>"
        );
    }

    #[test]
    fn children_take_the_container_prefix() {
        let xml = "<x:sheets><x:sheet name=\"A\"/></x:sheets><x:definedNames/>";
        let out = insert_into(xml, "sheets", |prefix| format!("<{prefix}sheet name=\"B\"/>"))
            .unwrap();
        assert_eq!(
            out,
            "<x:sheets><x:sheet name=\"A\"/><x:sheet name=\"B\"/></x:sheets><x:definedNames/>"
        );
        assert_matches::assert_matches!(
            insert_into("<workbook/>", "sheets", |_| String::new()),
            Err(ArcError::Workbook(_))
        );
    }

    #[test]
    fn relationship_prefix_is_read_from_namespace_declaration() {
        let xml = format!(r#"<x:workbook xmlns:x="{NS_MAIN}" xmlns:rel="{NS_REL}">"#);
        assert_eq!(relationship_prefix(&xml), Some("rel"));
        assert_eq!(relationship_prefix("<workbook/>"), None);
    }

    #[test]
    fn escaping_round_trips() {
        let raw = r#"a<b & "c">"#;
        assert_eq!(unescape(&escape(raw)), raw);
    }
}
