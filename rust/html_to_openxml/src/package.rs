//! Open Packaging Conventions plumbing: relationships, content types and
//! the zip container.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Seek, Write};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::xml::{attr_string, xml_escape_text};

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_NUMBERING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
pub const REL_FOOTNOTES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footnotes";
pub const REL_ENDNOTES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/endnotes";
pub const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
pub const REL_CORE_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

pub const CT_DOCUMENT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
pub const CT_NUMBERING: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
pub const CT_FOOTNOTES: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.footnotes+xml";
pub const CT_ENDNOTES: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.endnotes+xml";
pub const CT_CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Relationships of one part (`_rels/*.rels`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(xml: &str, part: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut items = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e) | Event::Empty(ref e))
                    if e.name().as_ref() == b"Relationship" =>
                {
                    if let (Some(id), Some(rel_type), Some(target)) = (
                        attr_string(e, b"Id"),
                        attr_string(e, b"Type"),
                        attr_string(e, b"Target"),
                    ) {
                        let external = attr_string(e, b"TargetMode")
                            .is_some_and(|m| m.eq_ignore_ascii_case("External"));
                        items.push(Relationship {
                            id,
                            rel_type,
                            target,
                            external,
                        });
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::xml(part, e)),
                _ => {}
            }
            buf.clear();
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[Relationship] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn next_id(&self) -> String {
        let max = self
            .items
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let id = self.next_id();
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
        id
    }

    pub fn find_by_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.rel_type == rel_type)
    }

    /// Id of the external hyperlink to `target`, added on first use.
    pub fn hyperlink(&mut self, target: &str) -> String {
        match self
            .items
            .iter()
            .find(|r| r.external && r.rel_type == REL_HYPERLINK && r.target == target)
        {
            Some(r) => r.id.clone(),
            None => self.add(REL_HYPERLINK, target, true),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        );
        for r in &self.items {
            out.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}""#,
                xml_escape_text(&r.id),
                xml_escape_text(&r.rel_type),
                xml_escape_text(&r.target)
            ));
            if r.external {
                out.push_str(r#" TargetMode="External""#);
            }
            out.push_str("/>");
        }
        out.push_str("</Relationships>");
        out
    }
}

/// Relationship part name of `part` (`word/document.xml` → `word/_rels/document.xml.rels`).
pub fn rels_part_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target relative to the directory of `source`.
pub fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = source.split('/').collect();
    segments.pop();
    for seg in target.split('/') {
        match seg {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Minimal set for a new package.
    pub fn basic() -> Self {
        let mut ct = Self::default();
        ct.add_default("rels", CT_RELATIONSHIPS);
        ct.add_default("xml", "application/xml");
        ct
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut ct = Self::default();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e) | Event::Empty(ref e)) => match e.name().as_ref() {
                    b"Default" => {
                        if let (Some(ext), Some(t)) =
                            (attr_string(e, b"Extension"), attr_string(e, b"ContentType"))
                        {
                            ct.defaults.push((ext, t));
                        }
                    }
                    b"Override" => {
                        if let (Some(part), Some(t)) =
                            (attr_string(e, b"PartName"), attr_string(e, b"ContentType"))
                        {
                            ct.overrides.push((part, t));
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::xml(CONTENT_TYPES_PART, e)),
                _ => {}
            }
            buf.clear();
        }
        Ok(ct)
    }

    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        if !self
            .defaults
            .iter()
            .any(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        {
            self.defaults
                .push((extension.to_string(), content_type.to_string()));
        }
    }

    /// Sets the content type of `part` (a package path without leading `/`).
    pub fn set_override(&mut self, part: &str, content_type: &str) {
        let name = format!("/{part}");
        match self.overrides.iter_mut().find(|(p, _)| *p == name) {
            Some(entry) => entry.1 = content_type.to_string(),
            None => self.overrides.push((name, content_type.to_string())),
        }
    }

    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let name = format!("/{part}");
        if let Some((_, t)) = self.overrides.iter().find(|(p, _)| *p == name) {
            return Some(t);
        }
        let ext = part.rsplit_once('.')?.1;
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, t)| t.as_str())
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
        );
        for (ext, t) in &self.defaults {
            out.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                xml_escape_text(ext),
                xml_escape_text(t)
            ));
        }
        for (part, t) in &self.overrides {
            out.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                xml_escape_text(part),
                xml_escape_text(t)
            ));
        }
        out.push_str("</Types>");
        out
    }
}

/// Reads every file entry of a zip package.
pub fn read_package(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        parts.insert(file.name().trim_start_matches('/').to_string(), data);
    }
    if !parts.contains_key(CONTENT_TYPES_PART) {
        return Err(Error::InvalidPackage(format!("missing {CONTENT_TYPES_PART}")));
    }
    Ok(parts)
}

/// Writes `parts` as a deflated zip, content types first.
pub fn write_package<W: Write + Seek>(writer: W, parts: &BTreeMap<String, Vec<u8>>) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let opt = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    if let Some(ct) = parts.get(CONTENT_TYPES_PART) {
        zip.start_file(CONTENT_TYPES_PART, opt)?;
        zip.write_all(ct)?;
    }

    let mut dirs = BTreeSet::new();
    for (name, data) in parts.iter().filter(|(n, _)| *n != CONTENT_TYPES_PART) {
        let mut prefix = String::new();
        let segments: Vec<&str> = name.split('/').collect();
        for seg in &segments[..segments.len().saturating_sub(1)] {
            prefix.push_str(seg);
            prefix.push('/');
            if dirs.insert(prefix.clone()) {
                zip.add_directory(prefix.as_str(), opt)?;
            }
        }
        zip.start_file(name.as_str(), opt)?;
        zip.write_all(data)?;
    }

    Ok(zip.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relationship_ids_continue() {
        let xml = r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId3" Type="x" Target="styles.xml"/><Relationship Id="rId7" Type="y" Target="http://a.b/" TargetMode="External"/></Relationships>"#;
        let mut rels = Relationships::parse(xml, "word/_rels/document.xml.rels").unwrap();
        assert_eq!(rels.items().len(), 2);
        assert!(rels.items()[1].external);
        assert_eq!(rels.add(REL_IMAGE, "media/image1.png", false), "rId8");
        assert_eq!(rels.hyperlink("http://example.com/"), "rId9");
        assert_eq!(rels.hyperlink("http://example.com/"), "rId9");
        assert!(rels.to_xml().contains(r#"Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="http://example.com/" TargetMode="External""#));
    }

    #[test]
    fn test_part_names() {
        assert_eq!(rels_part_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_name(""), "_rels/.rels");
        assert_eq!(resolve_target("word/document.xml", "media/a.png"), "word/media/a.png");
        assert_eq!(resolve_target("word/document.xml", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn test_content_types() {
        let mut ct = ContentTypes::basic();
        ct.add_default("png", "image/png");
        ct.add_default("PNG", "image/other");
        ct.set_override("word/document.xml", CT_DOCUMENT);
        assert_eq!(ct.content_type_of("word/media/image1.png"), Some("image/png"));
        assert_eq!(ct.content_type_of("word/document.xml"), Some(CT_DOCUMENT));
        let reparsed = ContentTypes::parse(&ct.to_xml()).unwrap();
        assert_eq!(reparsed, ct);
    }

    #[test]
    fn test_zip_round_trip() {
        let mut parts = BTreeMap::new();
        parts.insert(CONTENT_TYPES_PART.to_string(), ContentTypes::basic().to_xml().into_bytes());
        parts.insert("word/document.xml".to_string(), b"<w:document/>".to_vec());
        let cursor = write_package(Cursor::new(Vec::new()), &parts).unwrap();
        let read = read_package(&cursor.into_inner()).unwrap();
        assert_eq!(read, parts);
    }

    #[test]
    fn test_missing_content_types_is_invalid() {
        let mut parts = BTreeMap::new();
        parts.insert("word/document.xml".to_string(), Vec::new());
        let cursor = write_package(Cursor::new(Vec::new()), &parts).unwrap();
        assert!(matches!(
            read_package(&cursor.into_inner()),
            Err(Error::InvalidPackage(_))
        ));
    }
}
