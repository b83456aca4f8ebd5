use serde::Deserialize;

use crate::error::{Error, Result};

/// Where the note generated for `<abbr>`, `<acronym>` and `<blockquote cite>` is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcronymPosition {
    /// Footnote at the end of the page.
    #[default]
    PageEnd,
    /// Endnote at the end of the document.
    DocumentEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptionPosition {
    #[default]
    Above,
    Below,
}

/// Style names used for each semantic role. Names are resolved against the
/// document catalog, case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DefaultStyles {
    pub caption: String,
    pub endnote_text: String,
    pub endnote_reference: String,
    pub footnote_text: String,
    pub footnote_reference: String,
    /// Prefix of the heading styles; the level digit is appended (`Heading` + `1`).
    pub heading: String,
    pub hyperlink: String,
    pub list_paragraph: String,
    /// Paragraph style of plain paragraphs, `None` keeps the document default.
    pub paragraph: Option<String>,
    pub pre_table: String,
    pub quote: String,
    pub intense_quote: String,
    pub table: String,
}

impl Default for DefaultStyles {
    fn default() -> Self {
        Self {
            caption: "Caption".into(),
            endnote_text: "EndnoteText".into(),
            endnote_reference: "EndnoteReference".into(),
            footnote_text: "FootnoteText".into(),
            footnote_reference: "FootnoteReference".into(),
            heading: "Heading".into(),
            hyperlink: "Hyperlink".into(),
            list_paragraph: "ListParagraph".into(),
            paragraph: None,
            pre_table: "TableGrid".into(),
            quote: "Quote".into(),
            intense_quote: "IntenseQuote".into(),
            table: "TableGrid".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuoteChars {
    pub prefix: String,
    pub suffix: String,
}

impl Default for QuoteChars {
    fn default() -> Self {
        Self {
            prefix: "\u{201c}".into(),
            suffix: "\u{201d}".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConverterOptions {
    pub acronym_position: AcronymPosition,
    /// Render `<div>` like `<p>` instead of a line break.
    pub consider_div_as_paragraph: bool,
    /// Drop `#anchor` links (`#_top` is always kept).
    pub exclude_link_anchor: bool,
    pub table_caption_position: CaptionPosition,
    /// Render `<pre>` inside a bordered one-cell table.
    pub render_pre_as_table: bool,
    pub quote_chars: QuoteChars,
    /// Base used to resolve relative image sources.
    pub base_image_url: Option<String>,
    pub default_styles: DefaultStyles,
}

impl ConverterOptions {
    /// Reads options from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_options_from_json() {
        let json = r#"{
            "acronym-position": "document-end",
            "render-pre-as-table": true,
            "table-caption-position": "below",
            "default-styles": { "hyperlink": "WebLink" }
        }"#;
        let opts = ConverterOptions::from_json(json).unwrap();
        assert_eq!(opts.acronym_position, AcronymPosition::DocumentEnd);
        assert!(opts.render_pre_as_table);
        assert!(!opts.exclude_link_anchor);
        assert_eq!(opts.table_caption_position, CaptionPosition::Below);
        assert_eq!(opts.default_styles.hyperlink, "WebLink");
        assert_eq!(opts.default_styles.caption, "Caption");
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let err = ConverterOptions::from_json(r#"{"acronym-position": "sideways"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_defaults() {
        let opts = ConverterOptions::default();
        assert_eq!(opts.acronym_position, AcronymPosition::PageEnd);
        assert_eq!(opts.default_styles.table, "TableGrid");
        assert_eq!(opts.default_styles.paragraph, None);
    }
}
