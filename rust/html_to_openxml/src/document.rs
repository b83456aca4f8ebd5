//! The target word-processing package: managed parts (body, styles,
//! numbering, notes, relationships) plus every other part kept verbatim.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use lazy_static::lazy_static;
use log::{debug, info};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::error::{Error, Result};
use crate::image::ImageFormat;
use crate::model::{Block, NoteKind, Paragraph, ParagraphProperties, Run, RunContent, Spacing};
use crate::numbering::NumberingStore;
use crate::package::{
    read_package, rels_part_name, resolve_target, write_package, ContentTypes, Relationships,
    CONTENT_TYPES_PART, CT_CORE_PROPERTIES, CT_DOCUMENT, CT_ENDNOTES, CT_FOOTNOTES, CT_NUMBERING,
    CT_STYLES, REL_CORE_PROPERTIES, REL_ENDNOTES, REL_FOOTNOTES, REL_IMAGE, REL_NUMBERING,
    REL_OFFICE_DOCUMENT, REL_STYLES,
};
use crate::style::{StyleCatalog, StyleFamily};
use crate::xml::{attr_i64, blocks_xml, paragraph_xml, xml_escape_text, R_NS, W_NS};

lazy_static! {
    static ref DRAWING_ID: Regex =
        Regex::new(r#"<(?:wp:docPr|pic:cNvPr)\s[^>]*?\bid="(\d+)""#).unwrap();
    static ref SEQ_FIGURE: Regex = Regex::new(r"SEQ\s+Figure\b").unwrap();
    static ref PAGE_SIZE: Regex = Regex::new(r"<w:pgSz\b[^>]*/>").unwrap();
    static ref PAGE_SIZE_ATTR: Regex = Regex::new(r#"\bw:(w|h)="(\d+)""#).unwrap();
    static ref CORE_TITLE: Regex =
        Regex::new(r"(?s)<dc:title\s*/>|<dc:title>.*?</dc:title>").unwrap();
}

const MAIN_PART: &str = "word/document.xml";
const CORE_PART: &str = "docProps/core.xml";

fn document_prefix() -> String {
    // Namespaces of a Word 2013 document, so copied markup keeps resolving.
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:wpc="http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas"
 xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"
 xmlns:o="urn:schemas-microsoft-com:office:office"
 xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"
 xmlns:v="urn:schemas-microsoft-com:vml"
 xmlns:wp14="http://schemas.microsoft.com/office/word/2010/wordprocessingDrawing"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:w10="urn:schemas-microsoft-com:office:word"
 xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordprocessingml"
 xmlns:w15="http://schemas.microsoft.com/office/word/2012/wordprocessingml"
 xmlns:wpg="http://schemas.microsoft.com/office/word/2010/wordprocessingGroup"
 xmlns:wpi="http://schemas.microsoft.com/office/word/2010/wordprocessingInk"
 xmlns:wne="http://schemas.microsoft.com/office/word/2006/wordml"
 xmlns:wps="http://schemas.microsoft.com/office/word/2010/wordprocessingShape"
 mc:Ignorable="w14 w15 wp14"><w:body>"#
        .to_string()
}

fn default_section() -> String {
    r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/><w:cols w:space="708"/><w:docGrid w:linePitch="360"/></w:sectPr>"#
        .to_string()
}

fn default_styles_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{W_NS}">
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
  <w:style w:type="character" w:default="1" w:styleId="DefaultParagraphFont">
    <w:name w:val="Default Paragraph Font"/>
    <w:uiPriority w:val="1"/>
    <w:semiHidden/>
    <w:unhideWhenUsed/>
  </w:style>
  <w:style w:type="table" w:default="1" w:styleId="TableNormal">
    <w:name w:val="Normal Table"/>
    <w:uiPriority w:val="99"/>
    <w:semiHidden/>
    <w:unhideWhenUsed/>
    <w:tblPr>
      <w:tblInd w:w="0" w:type="dxa"/>
      <w:tblCellMar>
        <w:top w:w="0" w:type="dxa"/>
        <w:left w:w="108" w:type="dxa"/>
        <w:bottom w:w="0" w:type="dxa"/>
        <w:right w:w="108" w:type="dxa"/>
      </w:tblCellMar>
    </w:tblPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading1">
    <w:name w:val="heading 1"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:keepLines/>
      <w:spacing w:before="240" w:after="120"/>
      <w:outlineLvl w:val="0"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:sz w:val="32"/>
    </w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading2">
    <w:name w:val="heading 2"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:keepLines/>
      <w:spacing w:before="200" w:after="100"/>
      <w:outlineLvl w:val="1"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:sz w:val="28"/>
    </w:rPr>
  </w:style>
</w:styles>"#
    )
}

/// `document.xml` split around the content the converter appends to.
#[derive(Debug, Clone)]
struct BodyXml {
    prefix: String,
    raw: String,
    section: Option<String>,
    suffix: String,
}

impl BodyXml {
    fn new() -> Self {
        Self {
            prefix: document_prefix(),
            raw: String::new(),
            section: Some(default_section()),
            suffix: "</w:body></w:document>".into(),
        }
    }

    fn parse(xml: &str) -> Result<Self> {
        let invalid = || Error::InvalidPackage("document part has no w:body".into());
        let open = xml.find("<w:body").ok_or_else(invalid)?;
        let open_end = open + xml[open..].find('>').ok_or_else(invalid)? + 1;
        if xml[..open_end].ends_with("/>") {
            return Ok(Self {
                prefix: format!("{}>", xml[..open_end - 2].trim_end()),
                raw: String::new(),
                section: None,
                suffix: format!("</w:body>{}", &xml[open_end..]),
            });
        }
        let close = xml.rfind("</w:body>").ok_or_else(invalid)?;
        let inner = &xml[open_end..close];
        const SECT_END: &str = "</w:sectPr>";
        let (raw, section) = match (inner.rfind("<w:sectPr"), inner.rfind(SECT_END)) {
            (Some(start), Some(end))
                if start < end && inner[end + SECT_END.len()..].trim().is_empty() =>
            {
                (&inner[..start], Some(inner[start..end + SECT_END.len()].to_string()))
            }
            _ => (inner, None),
        };
        Ok(Self {
            prefix: xml[..open_end].to_string(),
            raw: raw.to_string(),
            section,
            suffix: xml[close..].to_string(),
        })
    }
}

#[derive(Debug, Clone)]
struct Note {
    id: i32,
    note_type: Option<&'static str>,
    paragraphs: Vec<Paragraph>,
}

/// A footnotes or endnotes part.
#[derive(Debug, Clone, Default)]
struct NotesPart {
    present: bool,
    root_open: Option<String>,
    raw: String,
    max_id: i32,
    notes: Vec<Note>,
    rels: Relationships,
}

fn note_element(kind: NoteKind) -> &'static str {
    match kind {
        NoteKind::Footnote => "footnote",
        NoteKind::Endnote => "endnote",
    }
}

impl NotesPart {
    fn parse(xml: &str, kind: NoteKind, part: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let element = format!("w:{}", note_element(kind));
        let mut notes = NotesPart {
            present: true,
            ..Default::default()
        };
        let mut depth = 0usize;
        let mut inner_start = 0usize;
        loop {
            let before = reader.buffer_position();
            let event = reader.read_event_into(&mut buf);
            let after = reader.buffer_position();
            match event {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    if depth == 1 {
                        notes.root_open = Some(xml[before..after].trim().to_string());
                        inner_start = after;
                    } else if depth == 2 && e.name().as_ref() == element.as_bytes() {
                        if let Some(id) = attr_i64(e, b"w:id") {
                            notes.max_id = notes.max_id.max(id as i32);
                        }
                    }
                }
                Ok(Event::Empty(_)) if depth == 0 => {
                    let root = xml[before..after].trim();
                    let root = root.strip_suffix("/>").unwrap_or(root);
                    notes.root_open = Some(format!("{}>", root.trim_end()));
                }
                Ok(Event::End(_)) => {
                    if depth == 1 {
                        notes.raw = xml[inner_start..before].to_string();
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::xml(part, e)),
                _ => {}
            }
            buf.clear();
        }
        Ok(notes)
    }

    /// Creates the part with its separator entries on first use.
    fn ensure(&mut self) {
        if self.present {
            return;
        }
        self.present = true;
        for (id, note_type, mark) in [
            (-1, "separator", RunContent::SeparatorMark),
            (0, "continuationSeparator", RunContent::ContinuationSeparatorMark),
        ] {
            let mut p = Paragraph::with_props(ParagraphProperties {
                spacing: Some(Spacing {
                    before: None,
                    after: Some(0),
                    line: Some(240),
                }),
                ..Default::default()
            });
            p.children.push(Run::new(mark).into());
            self.notes.push(Note {
                id,
                note_type: Some(note_type),
                paragraphs: vec![p],
            });
        }
    }

    fn next_id(&self) -> i32 {
        let created = self.notes.iter().map(|n| n.id).max().unwrap_or(0);
        self.max_id.max(created) + 1
    }

    fn to_xml(&self, kind: NoteKind) -> String {
        let element = note_element(kind);
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        match &self.root_open {
            Some(root) => out.push_str(root),
            None => out.push_str(&format!(
                r#"<w:{element}s xmlns:w="{W_NS}" xmlns:r="{R_NS}">"#
            )),
        }
        out.push_str(&self.raw);
        for note in &self.notes {
            out.push_str(&format!("<w:{element}"));
            if let Some(t) = note.note_type {
                out.push_str(&format!(r#" w:type="{t}""#));
            }
            out.push_str(&format!(r#" w:id="{}">"#, note.id));
            for p in &note.paragraphs {
                paragraph_xml(&mut out, p);
            }
            out.push_str(&format!("</w:{element}>"));
        }
        out.push_str(&format!("</w:{element}s>"));
        out
    }
}

/// A word-processing document, new or loaded from a package.
pub struct Document {
    parts: BTreeMap<String, Vec<u8>>,
    content_types: ContentTypes,
    package_rels: Relationships,
    main_part: String,
    document_rels: Relationships,
    body: BodyXml,
    blocks: Vec<Block>,
    styles_part: String,
    styles_xml: String,
    styles: StyleCatalog,
    numbering_part: String,
    numbering: NumberingStore,
    footnotes_part: String,
    footnotes: NotesPart,
    endnotes_part: String,
    endnotes: NotesPart,
    next_drawing_id: u32,
    figure_count: u32,
    title: Option<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn part_text(parts: &mut BTreeMap<String, Vec<u8>>, name: &str) -> Result<Option<String>> {
    match parts.remove(name) {
        Some(bytes) => {
            let text = String::from_utf8(bytes).map_err(|e| Error::xml(name, e))?;
            Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
        }
        None => Ok(None),
    }
}

fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Relationship target of `part` as seen from `source`.
fn relative_target(source: &str, part: &str) -> String {
    let dir = part_dir(source);
    if dir.is_empty() {
        return part.to_string();
    }
    match part.strip_prefix(dir).and_then(|p| p.strip_prefix('/')) {
        Some(relative) => relative.to_string(),
        None => format!("/{part}"),
    }
}

impl Document {
    pub fn new() -> Self {
        let styles_xml = default_styles_xml();
        let styles = StyleCatalog::from_styles_xml(&styles_xml).unwrap_or_default();
        Self {
            parts: BTreeMap::new(),
            content_types: ContentTypes::basic(),
            package_rels: Relationships::default(),
            main_part: MAIN_PART.into(),
            document_rels: Relationships::default(),
            body: BodyXml::new(),
            blocks: Vec::new(),
            styles_part: "word/styles.xml".into(),
            styles_xml,
            styles,
            numbering_part: "word/numbering.xml".into(),
            numbering: NumberingStore::default(),
            footnotes_part: "word/footnotes.xml".into(),
            footnotes: NotesPart::default(),
            endnotes_part: "word/endnotes.xml".into(),
            endnotes: NotesPart::default(),
            next_drawing_id: 1,
            figure_count: 0,
            title: None,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parts = read_package(bytes)?;
        let content_types = match part_text(&mut parts, CONTENT_TYPES_PART)? {
            Some(xml) => ContentTypes::parse(&xml)?,
            None => ContentTypes::basic(),
        };
        let package_rels = match part_text(&mut parts, "_rels/.rels")? {
            Some(xml) => Relationships::parse(&xml, "_rels/.rels")?,
            None => Relationships::default(),
        };
        let main_part = package_rels
            .find_by_type(REL_OFFICE_DOCUMENT)
            .map(|r| resolve_target("", &r.target))
            .ok_or_else(|| Error::InvalidPackage("no main document part".into()))?;
        let document_xml = part_text(&mut parts, &main_part)?
            .ok_or_else(|| Error::InvalidPackage(format!("missing {main_part}")))?;
        let rels_name = rels_part_name(&main_part);
        let document_rels = match part_text(&mut parts, &rels_name)? {
            Some(xml) => Relationships::parse(&xml, &rels_name)?,
            None => Relationships::default(),
        };

        let dir = part_dir(&main_part).to_string();
        let locate = |rel_type: &str, file: &str| {
            document_rels
                .find_by_type(rel_type)
                .map(|r| resolve_target(&main_part, &r.target))
                .unwrap_or_else(|| format!("{dir}/{file}"))
        };
        let styles_part = locate(REL_STYLES, "styles.xml");
        let numbering_part = locate(REL_NUMBERING, "numbering.xml");
        let footnotes_part = locate(REL_FOOTNOTES, "footnotes.xml");
        let endnotes_part = locate(REL_ENDNOTES, "endnotes.xml");

        let styles_xml = part_text(&mut parts, &styles_part)?.unwrap_or_else(default_styles_xml);
        let styles = StyleCatalog::from_styles_xml(&styles_xml)?;
        let numbering = match part_text(&mut parts, &numbering_part)? {
            Some(xml) => NumberingStore::parse(&xml)?,
            None => NumberingStore::default(),
        };
        let mut load_notes = |part: &str, kind: NoteKind| -> Result<NotesPart> {
            let mut notes = match part_text(&mut parts, part)? {
                Some(xml) => NotesPart::parse(&xml, kind, part)?,
                None => NotesPart::default(),
            };
            let rels_name = rels_part_name(part);
            if let Some(xml) = part_text(&mut parts, &rels_name)? {
                notes.rels = Relationships::parse(&xml, &rels_name)?;
            }
            Ok(notes)
        };
        let footnotes = load_notes(&footnotes_part, NoteKind::Footnote)?;
        let endnotes = load_notes(&endnotes_part, NoteKind::Endnote)?;

        let body = BodyXml::parse(&document_xml)?;
        let next_drawing_id = DRAWING_ID
            .captures_iter(&body.raw)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let figure_count = SEQ_FIGURE.find_iter(&body.raw).count() as u32;
        info!(
            "opened package: {} kept parts, {} styles, {} numbering entries",
            parts.len(),
            styles.entries().len(),
            numbering.entries().len()
        );

        Ok(Self {
            parts,
            content_types,
            package_rels,
            main_part,
            document_rels,
            body,
            blocks: Vec::new(),
            styles_part,
            styles_xml,
            styles,
            numbering_part,
            numbering,
            footnotes_part,
            footnotes,
            endnotes_part,
            endnotes,
            next_drawing_id,
            figure_count,
            title: None,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        write_package(file, &self.build_parts())?;
        debug!("saved {}", path.display());
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(write_package(Cursor::new(Vec::new()), &self.build_parts())?.into_inner())
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Blocks appended by conversions since the document was loaded.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn append_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks.extend(blocks);
    }

    /// Body markup, section properties last.
    pub fn body_xml(&self) -> String {
        let mut out = self.body.raw.clone();
        out.push_str(&blocks_xml(&self.blocks));
        if let Some(section) = &self.body.section {
            out.push_str(section);
        }
        out
    }

    pub fn styles(&self) -> &StyleCatalog {
        &self.styles
    }

    /// Style id for `name`, adding a built-in definition when needed.
    pub fn style_id(&mut self, name: &str, family: StyleFamily) -> String {
        self.styles.resolve(name, family)
    }

    /// Styles part markup including the definitions added on demand.
    pub fn styles_xml(&self) -> String {
        let added: String = self.styles.added().iter().map(|d| d.xml.as_str()).collect();
        match self.styles_xml.rfind("</w:styles>") {
            Some(at) if !added.is_empty() => {
                format!("{}{added}{}", &self.styles_xml[..at], &self.styles_xml[at..])
            }
            _ => self.styles_xml.clone(),
        }
    }

    /// Reloads the catalog from the styles part, folding in added definitions.
    pub fn refresh_styles(&mut self) -> Result<()> {
        self.styles_xml = self.styles_xml();
        self.styles = StyleCatalog::from_styles_xml(&self.styles_xml)?;
        Ok(())
    }

    pub fn numbering(&self) -> &NumberingStore {
        &self.numbering
    }

    pub fn numbering_mut(&mut self) -> &mut NumberingStore {
        &mut self.numbering
    }

    pub fn add_hyperlink(&mut self, target: &str) -> String {
        self.document_rels.hyperlink(target)
    }

    /// Hyperlink relationship owned by the notes part of `kind`.
    pub fn add_note_hyperlink(&mut self, kind: NoteKind, target: &str) -> String {
        self.notes_mut(kind).rels.hyperlink(target)
    }

    fn notes_mut(&mut self, kind: NoteKind) -> &mut NotesPart {
        match kind {
            NoteKind::Footnote => &mut self.footnotes,
            NoteKind::Endnote => &mut self.endnotes,
        }
    }

    /// Id the next note of `kind` will get.
    pub fn next_note_id(&mut self, kind: NoteKind) -> i32 {
        let notes = self.notes_mut(kind);
        notes.ensure();
        notes.next_id()
    }

    pub fn add_note(&mut self, kind: NoteKind, paragraphs: Vec<Paragraph>) -> i32 {
        let notes = self.notes_mut(kind);
        notes.ensure();
        let id = notes.next_id();
        notes.notes.push(Note {
            id,
            note_type: None,
            paragraphs,
        });
        id
    }

    pub fn notes_xml(&self, kind: NoteKind) -> Option<String> {
        let notes = match kind {
            NoteKind::Footnote => &self.footnotes,
            NoteKind::Endnote => &self.endnotes,
        };
        notes.present.then(|| notes.to_xml(kind))
    }

    /// Stores an image part and returns its relationship id.
    pub fn add_image(&mut self, bytes: Vec<u8>, format: ImageFormat) -> String {
        let dir = part_dir(&self.main_part).to_string();
        let prefix = if dir.is_empty() {
            "media/image".to_string()
        } else {
            format!("{dir}/media/image")
        };
        let mut n = 1;
        let part = loop {
            let candidate = format!("{prefix}{n}.{}", format.extension());
            if !self.parts.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.content_types
            .add_default(format.extension(), format.content_type());
        let target = relative_target(&self.main_part, &part);
        self.parts.insert(part, bytes);
        self.document_rels.add(REL_IMAGE, &target, false)
    }

    /// Next `docPr` id; picture ids share the sequence.
    pub fn next_drawing_id(&mut self) -> u32 {
        let id = self.next_drawing_id;
        self.next_drawing_id += 1;
        id
    }

    pub fn next_figure_number(&mut self) -> u32 {
        self.figure_count += 1;
        self.figure_count
    }

    /// Sets the page orientation of the final section. An existing page size
    /// is swapped only when its orientation differs.
    pub fn set_page_orientation(&mut self, landscape: bool) {
        let page_size = |w: i64, h: i64| {
            if landscape {
                format!(r#"<w:pgSz w:w="{w}" w:h="{h}" w:orient="landscape"/>"#)
            } else {
                format!(r#"<w:pgSz w:w="{w}" w:h="{h}"/>"#)
            }
        };
        let (a4_long, a4_short) = (16838, 11906);
        let Some(section) = &self.body.section else {
            let size = if landscape {
                page_size(a4_long, a4_short)
            } else {
                page_size(a4_short, a4_long)
            };
            self.body.section = Some(format!(
                r#"<w:sectPr>{size}<w:pgMar w:top="1417" w:right="1417" w:bottom="1417" w:left="1417" w:header="708" w:footer="708" w:gutter="0"/><w:cols w:space="708"/><w:docGrid w:linePitch="360"/></w:sectPr>"#
            ));
            return;
        };
        let Some(existing) = PAGE_SIZE.find(section) else {
            let size = if landscape {
                page_size(a4_long, a4_short)
            } else {
                page_size(a4_short, a4_long)
            };
            let updated = section.replacen("<w:sectPr>", &format!("<w:sectPr>{size}"), 1);
            self.body.section = Some(updated);
            return;
        };
        let current = existing.as_str();
        if current.contains(r#"w:orient="landscape""#) == landscape {
            return;
        }
        let mut w = a4_short;
        let mut h = a4_long;
        for cap in PAGE_SIZE_ATTR.captures_iter(current) {
            let v: i64 = cap[2].parse().unwrap_or(0);
            if &cap[1] == "w" {
                w = v;
            } else {
                h = v;
            }
        }
        let replacement = page_size(h, w);
        let updated = format!(
            "{}{replacement}{}",
            &section[..existing.start()],
            &section[existing.end()..]
        );
        self.body.section = Some(updated);
    }

    fn core_xml(&self, existing: Option<&[u8]>, title: &str) -> String {
        let escaped = xml_escape_text(title);
        let element = format!("<dc:title>{escaped}</dc:title>");
        if let Some(xml) = existing.and_then(|b| std::str::from_utf8(b).ok()) {
            if CORE_TITLE.is_match(xml) {
                return CORE_TITLE.replace(xml, element.as_str()).into_owned();
            }
            if let Some(at) = xml.rfind("</cp:coreProperties>") {
                return format!("{}{element}{}", &xml[..at], &xml[at..]);
            }
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">{element}</cp:coreProperties>"#
        )
    }

    fn build_parts(&self) -> BTreeMap<String, Vec<u8>> {
        let mut parts = self.parts.clone();
        let mut content_types = self.content_types.clone();
        let mut package_rels = self.package_rels.clone();
        let mut document_rels = self.document_rels.clone();
        let main = self.main_part.as_str();

        // Package relationships resolve from the root, part relationships from their source.
        let ensure_rel = |rels: &mut Relationships, source: &str, rel_type: &str, part: &str| {
            if rels.find_by_type(rel_type).is_none() {
                rels.add(rel_type, &relative_target(source, part), false);
            }
        };

        ensure_rel(&mut package_rels, "", REL_OFFICE_DOCUMENT, main);
        content_types.set_override(main, CT_DOCUMENT);
        let document = format!("{}{}{}", self.body.prefix, self.body_xml(), self.body.suffix);
        parts.insert(main.to_string(), document.into_bytes());

        ensure_rel(&mut document_rels, main, REL_STYLES, &self.styles_part);
        content_types.set_override(&self.styles_part, CT_STYLES);
        parts.insert(self.styles_part.clone(), self.styles_xml().into_bytes());

        if !self.numbering.is_empty() {
            ensure_rel(&mut document_rels, main, REL_NUMBERING, &self.numbering_part);
            content_types.set_override(&self.numbering_part, CT_NUMBERING);
            parts.insert(self.numbering_part.clone(), self.numbering.to_xml().into_bytes());
        }

        for (kind, part, rel_type, ct) in [
            (NoteKind::Footnote, &self.footnotes_part, REL_FOOTNOTES, CT_FOOTNOTES),
            (NoteKind::Endnote, &self.endnotes_part, REL_ENDNOTES, CT_ENDNOTES),
        ] {
            let notes = match kind {
                NoteKind::Footnote => &self.footnotes,
                NoteKind::Endnote => &self.endnotes,
            };
            if let Some(xml) = self.notes_xml(kind) {
                ensure_rel(&mut document_rels, main, rel_type, part);
                content_types.set_override(part, ct);
                parts.insert(part.clone(), xml.into_bytes());
                if !notes.rels.is_empty() {
                    parts.insert(rels_part_name(part), notes.rels.to_xml().into_bytes());
                }
            }
        }

        if let Some(title) = &self.title {
            let core_part = package_rels
                .find_by_type(REL_CORE_PROPERTIES)
                .map(|r| resolve_target("", &r.target))
                .unwrap_or_else(|| CORE_PART.to_string());
            let core = self.core_xml(parts.get(&core_part).map(Vec::as_slice), title);
            if package_rels.find_by_type(REL_CORE_PROPERTIES).is_none() {
                package_rels.add(REL_CORE_PROPERTIES, &core_part, false);
            }
            content_types.set_override(&core_part, CT_CORE_PROPERTIES);
            parts.insert(core_part, core.into_bytes());
        }

        parts.insert(
            rels_part_name(main),
            document_rels.to_xml().into_bytes(),
        );
        parts.insert("_rels/.rels".into(), package_rels.to_xml().into_bytes());
        parts.insert(CONTENT_TYPES_PART.into(), content_types.to_xml().into_bytes());
        parts
    }
}
