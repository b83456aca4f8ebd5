//! Style catalog of the target document and the built-in definitions
//! added on demand when a referenced style is missing.

use std::collections::HashSet;

use log::warn;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::xml::attr_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleFamily {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl StyleFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            StyleFamily::Paragraph => "paragraph",
            StyleFamily::Character => "character",
            StyleFamily::Table => "table",
            StyleFamily::Numbering => "numbering",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "paragraph" => Some(StyleFamily::Paragraph),
            "character" => Some(StyleFamily::Character),
            "table" => Some(StyleFamily::Table),
            "numbering" => Some(StyleFamily::Numbering),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleEntry {
    pub id: String,
    pub name: String,
    pub family: StyleFamily,
    /// Style id of the linked paragraph/character counterpart.
    pub linked: Option<String>,
}

impl StyleEntry {
    fn matches(&self, name: &str) -> bool {
        self.id.eq_ignore_ascii_case(name) || self.name.eq_ignore_ascii_case(name)
    }
}

/// Built-in style with its `<w:style>` definition.
#[derive(Debug, Clone)]
pub struct StyleDefinition {
    pub entry: StyleEntry,
    pub xml: String,
}

#[derive(Debug, Default)]
pub struct StyleCatalog {
    entries: Vec<StyleEntry>,
    added: Vec<StyleDefinition>,
    reported: HashSet<String>,
}

impl StyleCatalog {
    pub fn new(entries: Vec<StyleEntry>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    pub fn from_styles_xml(xml: &str) -> Result<Self> {
        Ok(Self::new(parse_styles_xml(xml)?))
    }

    pub fn entries(&self) -> &[StyleEntry] {
        &self.entries
    }

    /// Definitions added since the catalog was loaded.
    pub fn added(&self) -> &[StyleDefinition] {
        &self.added
    }

    /// Case-insensitive lookup by id or display name. A character lookup
    /// falls back to the character style linked to a paragraph style of that
    /// name.
    pub fn find(&self, name: &str, family: StyleFamily) -> Option<&StyleEntry> {
        if let Some(e) = self
            .entries
            .iter()
            .find(|e| e.family == family && e.matches(name))
        {
            return Some(e);
        }
        if family != StyleFamily::Character {
            return None;
        }
        let linked = self
            .entries
            .iter()
            .find(|e| e.family == StyleFamily::Paragraph && e.matches(name))
            .and_then(|e| e.linked.as_deref())?;
        self.entries
            .iter()
            .find(|e| e.family == StyleFamily::Character && e.id == linked)
    }

    pub fn contains(&self, name: &str, family: StyleFamily) -> bool {
        self.find(name, family).is_some()
    }

    /// Resolves `name` to a style id, adding a built-in definition (and its
    /// linked counterpart) when the document lacks it. Unknown names are
    /// returned unchanged and reported once.
    pub fn resolve(&mut self, name: &str, family: StyleFamily) -> String {
        if let Some(e) = self.find(name, family) {
            return e.id.clone();
        }
        if let Some(def) = predefined_style(name) {
            let linked = def.entry.linked.clone();
            let own_family = def.entry.family;
            self.add(def);
            if let Some(linked) = linked {
                if !self.entries.iter().any(|e| e.id == linked) {
                    if let Some(partner) = predefined_style(&linked) {
                        self.add(partner);
                    }
                }
            }
            if own_family == family || family == StyleFamily::Character {
                if let Some(e) = self.find(name, family) {
                    return e.id.clone();
                }
            }
        }
        if self.reported.insert(name.to_ascii_lowercase()) {
            warn!("style '{name}' ({}) is not defined in the document", family.as_str());
        }
        name.to_string()
    }

    fn add(&mut self, def: StyleDefinition) {
        self.entries.push(def.entry.clone());
        self.added.push(def);
    }
}

/// Reads the `<w:style>` entries of a styles part.
pub fn parse_styles_xml(xml: &str) -> Result<Vec<StyleEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut styles = Vec::new();
    let mut current: Option<StyleEntry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"w:style" => {
                current = style_start(e);
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:style" => {
                    if let Some(style) = style_start(e) {
                        styles.push(style);
                    }
                }
                b"w:name" => {
                    if let (Some(style), Some(val)) = (current.as_mut(), attr_string(e, b"w:val")) {
                        style.name = val;
                    }
                }
                b"w:link" => {
                    if let Some(style) = current.as_mut() {
                        style.linked = attr_string(e, b"w:val");
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"w:style" => {
                if let Some(style) = current.take() {
                    styles.push(style);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::xml("word/styles.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(styles)
}

fn style_start(e: &quick_xml::events::BytesStart<'_>) -> Option<StyleEntry> {
    let family = attr_string(e, b"w:type")
        .as_deref()
        .and_then(StyleFamily::parse)
        .unwrap_or(StyleFamily::Paragraph);
    let id = attr_string(e, b"w:styleId")?;
    Some(StyleEntry {
        name: id.clone(),
        id,
        family,
        linked: None,
    })
}

fn definition(
    id: &str,
    name: &str,
    family: StyleFamily,
    linked: Option<&str>,
    body: &str,
) -> StyleDefinition {
    let link = linked
        .map(|l| format!(r#"<w:link w:val="{l}"/>"#))
        .unwrap_or_default();
    let based_on = match family {
        StyleFamily::Paragraph => r#"<w:basedOn w:val="Normal"/>"#,
        StyleFamily::Character => r#"<w:basedOn w:val="DefaultParagraphFont"/>"#,
        StyleFamily::Table => r#"<w:basedOn w:val="TableNormal"/>"#,
        StyleFamily::Numbering => "",
    };
    StyleDefinition {
        entry: StyleEntry {
            id: id.to_string(),
            name: name.to_string(),
            family,
            linked: linked.map(str::to_string),
        },
        xml: format!(
            r#"<w:style w:type="{}" w:styleId="{id}"><w:name w:val="{name}"/>{based_on}{link}<w:uiPriority w:val="99"/><w:unhideWhenUsed/>{body}</w:style>"#,
            family.as_str()
        ),
    }
}

/// Built-in definition for a well-known style id, matched case-insensitively.
pub fn predefined_style(name: &str) -> Option<StyleDefinition> {
    use StyleFamily::{Character, Paragraph, Table};

    let lower = name.to_ascii_lowercase();
    if let Some(level) = lower
        .strip_prefix("heading")
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| (1..=6).contains(l))
    {
        let sizes = [32, 28, 26, 24, 22, 22];
        let size = sizes[level - 1];
        return Some(definition(
            &format!("Heading{level}"),
            &format!("heading {level}"),
            Paragraph,
            None,
            &format!(
                r#"<w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="{}"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr>"#,
                level - 1
            ),
        ));
    }

    let def = match lower.as_str() {
        "caption" => definition(
            "Caption",
            "caption",
            Paragraph,
            None,
            r#"<w:qFormat/><w:pPr><w:spacing w:after="200" w:line="240" w:lineRule="auto"/></w:pPr><w:rPr><w:b/><w:bCs/><w:color w:val="4F81BD"/><w:sz w:val="18"/><w:szCs w:val="18"/></w:rPr>"#,
        ),
        "hyperlink" => definition(
            "Hyperlink",
            "Hyperlink",
            Character,
            None,
            r#"<w:rPr><w:color w:val="0000FF"/><w:u w:val="single"/></w:rPr>"#,
        ),
        "listparagraph" => definition(
            "ListParagraph",
            "List Paragraph",
            Paragraph,
            None,
            r#"<w:qFormat/><w:pPr><w:ind w:left="720"/><w:contextualSpacing/></w:pPr>"#,
        ),
        "quote" => definition(
            "Quote",
            "Quote",
            Paragraph,
            Some("QuoteChar"),
            r#"<w:qFormat/><w:rPr><w:i/><w:iCs/><w:color w:val="404040"/></w:rPr>"#,
        ),
        "quotechar" => definition(
            "QuoteChar",
            "Quote Char",
            Character,
            Some("Quote"),
            r#"<w:rPr><w:i/><w:iCs/><w:color w:val="404040"/></w:rPr>"#,
        ),
        "intensequote" => definition(
            "IntenseQuote",
            "Intense Quote",
            Paragraph,
            Some("IntenseQuoteChar"),
            r#"<w:qFormat/><w:pPr><w:pBdr><w:top w:val="single" w:sz="4" w:space="10" w:color="4F81BD"/><w:bottom w:val="single" w:sz="4" w:space="10" w:color="4F81BD"/></w:pBdr><w:spacing w:before="360" w:after="360"/><w:ind w:left="864" w:right="864"/><w:jc w:val="center"/></w:pPr><w:rPr><w:i/><w:iCs/><w:color w:val="4F81BD"/></w:rPr>"#,
        ),
        "intensequotechar" => definition(
            "IntenseQuoteChar",
            "Intense Quote Char",
            Character,
            Some("IntenseQuote"),
            r#"<w:rPr><w:i/><w:iCs/><w:color w:val="4F81BD"/></w:rPr>"#,
        ),
        "tablegrid" => definition(
            "TableGrid",
            "Table Grid",
            Table,
            None,
            r#"<w:pPr><w:spacing w:after="0" w:line="240" w:lineRule="auto"/></w:pPr><w:tblPr><w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:left w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:right w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="auto"/></w:tblBorders></w:tblPr>"#,
        ),
        "footnotetext" => definition(
            "FootnoteText",
            "footnote text",
            Paragraph,
            None,
            r#"<w:pPr><w:spacing w:after="0" w:line="240" w:lineRule="auto"/></w:pPr><w:rPr><w:sz w:val="20"/><w:szCs w:val="20"/></w:rPr>"#,
        ),
        "footnotereference" => definition(
            "FootnoteReference",
            "footnote reference",
            Character,
            None,
            r#"<w:rPr><w:vertAlign w:val="superscript"/></w:rPr>"#,
        ),
        "endnotetext" => definition(
            "EndnoteText",
            "endnote text",
            Paragraph,
            None,
            r#"<w:pPr><w:spacing w:after="0" w:line="240" w:lineRule="auto"/></w:pPr><w:rPr><w:sz w:val="20"/><w:szCs w:val="20"/></w:rPr>"#,
        ),
        "endnotereference" => definition(
            "EndnoteReference",
            "endnote reference",
            Character,
            None,
            r#"<w:rPr><w:vertAlign w:val="superscript"/></w:rPr>"#,
        ),
        _ => return None,
    };
    Some(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
  <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
  <w:style w:type="paragraph" w:styleId="Quote"><w:name w:val="Quote"/><w:link w:val="QuoteChar"/></w:style>
  <w:style w:type="character" w:styleId="QuoteChar"><w:name w:val="Quote Char"/><w:link w:val="Quote"/></w:style>
  <w:style w:type="table" w:styleId="TableGrid"><w:name w:val="Table Grid"/></w:style>
</w:styles>"#;

    #[test]
    fn test_parse_styles_xml() {
        let styles = parse_styles_xml(STYLES).unwrap();
        assert_eq!(styles.len(), 5);
        assert_eq!(styles[1].id, "Heading1");
        assert_eq!(styles[1].name, "heading 1");
        assert_eq!(styles[2].linked.as_deref(), Some("QuoteChar"));
        assert_eq!(styles[4].family, StyleFamily::Table);
    }

    #[test]
    fn test_find_is_case_insensitive_and_family_aware() {
        let catalog = StyleCatalog::from_styles_xml(STYLES).unwrap();
        assert_eq!(catalog.find("HEADING 1", StyleFamily::Paragraph).unwrap().id, "Heading1");
        assert_eq!(catalog.find("heading1", StyleFamily::Paragraph).unwrap().id, "Heading1");
        assert!(catalog.find("TableGrid", StyleFamily::Paragraph).is_none());
        assert!(catalog.contains("tablegrid", StyleFamily::Table));
    }

    #[test]
    fn test_character_lookup_follows_link() {
        let catalog = StyleCatalog::from_styles_xml(STYLES).unwrap();
        assert_eq!(catalog.find("Quote", StyleFamily::Character).unwrap().id, "QuoteChar");
    }

    #[test]
    fn test_resolve_adds_predefined_with_partner() {
        let mut catalog = StyleCatalog::default();
        assert_eq!(catalog.resolve("intensequote", StyleFamily::Character), "IntenseQuoteChar");
        let ids: Vec<&str> = catalog.added().iter().map(|d| d.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["IntenseQuote", "IntenseQuoteChar"]);
        // Second lookup finds the added entry instead of adding again.
        assert_eq!(catalog.resolve("IntenseQuote", StyleFamily::Paragraph), "IntenseQuote");
        assert_eq!(catalog.added().len(), 2);
    }

    #[test]
    fn test_resolve_unknown_keeps_name() {
        let mut catalog = StyleCatalog::default();
        assert_eq!(catalog.resolve("Fancy", StyleFamily::Paragraph), "Fancy");
        assert!(catalog.added().is_empty());
    }

    #[test]
    fn test_predefined_headings() {
        let def = predefined_style("heading3").unwrap();
        assert_eq!(def.entry.id, "Heading3");
        assert!(def.xml.contains(r#"<w:outlineLvl w:val="2"/>"#));
        assert!(predefined_style("Heading7").is_none());
    }
}
