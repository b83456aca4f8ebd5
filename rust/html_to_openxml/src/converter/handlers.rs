//! Tag handlers. Each open tag pushes frames into exactly the cascades its
//! close handler pops; handlers that read their content with `sub_convert`
//! consume the close tag and pop their own frames.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::Url;

use super::{tidy_blocks, trim_trailing_space, Engine};
use crate::cascade::{CellFragment, ParagraphFragment, RunFragment};
use crate::config::{AcronymPosition, CaptionPosition};
use crate::css::{
    first_family, parse_align, parse_html_font_size, parse_valign, FontStyle, FontWeight,
    SideBorder, Unit, UnitMetric,
};
use crate::model::{
    Block, BorderLine, BorderStyle, Borders, CellMargins, Drawing, Hyperlink, Indentation, Inline,
    Justification, LinkClick, NoteKind, NumberingRef, Paragraph, ParagraphProperties, Run,
    RunContent, RunProperties, SimpleField, Spacing, Table, TableCell, TableCellProperties,
    TableProperties, TableWidth, TextDirection, VerticalAlign, VerticalMerge, VerticalPosition,
};
use crate::numbering::list_type_name;
use crate::style::StyleFamily;
use crate::table::{TableState, MAX_COL_SPAN, MAX_ROW_SPAN};

lazy_static! {
    static ref HEADING_NUMBER: Regex = Regex::new(r"^((?:\d+\.)+)\s").unwrap();
    static ref NOTE_LINK: Regex = Regex::new(r"^((https?|ftps?|mailto|file)://|\\\\)").unwrap();
}

/// Used when neither the markup nor the image header gives a size.
const FALLBACK_IMAGE_PX: f64 = 96.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TagKind {
    Anchor,
    Abbreviation,
    Block,
    BlockQuote,
    Body,
    Break,
    Caption,
    Cite,
    DefinitionDescription,
    DefinitionTerm,
    FigureCaption,
    Font,
    Format(RunFragment),
    Heading(u8),
    HorizontalRule,
    Image,
    List { ordered: bool },
    ListItem,
    Paragraph,
    Preformatted,
    Quote,
    Skipped,
    Span,
    Table,
    TableCell,
    TablePart,
    TableRow,
    Unknown,
}

impl TagKind {
    /// `name` is lower-cased by the tokenizer.
    pub(super) fn from_name(name: &str) -> Self {
        if let Some(fragment) = format_fragment(name) {
            return TagKind::Format(fragment);
        }
        match name {
            "a" => TagKind::Anchor,
            "abbr" | "acronym" => TagKind::Abbreviation,
            "article" | "aside" | "div" | "section" => TagKind::Block,
            "blockquote" => TagKind::BlockQuote,
            "body" | "html" => TagKind::Body,
            "br" => TagKind::Break,
            "caption" => TagKind::Caption,
            "cite" => TagKind::Cite,
            "dd" => TagKind::DefinitionDescription,
            "dt" => TagKind::DefinitionTerm,
            "figcaption" => TagKind::FigureCaption,
            "font" => TagKind::Font,
            "hr" => TagKind::HorizontalRule,
            "img" => TagKind::Image,
            "li" => TagKind::ListItem,
            "ol" => TagKind::List { ordered: true },
            "ul" => TagKind::List { ordered: false },
            "p" => TagKind::Paragraph,
            "pre" => TagKind::Preformatted,
            "q" => TagKind::Quote,
            "head" | "script" | "style" | "title" | "xml" => TagKind::Skipped,
            "span" => TagKind::Span,
            "table" => TagKind::Table,
            "td" | "th" => TagKind::TableCell,
            "thead" | "tbody" | "tfoot" => TagKind::TablePart,
            "tr" => TagKind::TableRow,
            h => match h.strip_prefix('h').and_then(|n| n.parse::<u8>().ok()) {
                Some(level @ 1..=6) => TagKind::Heading(level),
                _ => TagKind::Unknown,
            },
        }
    }
}

/// Inline formatting tags and the fragment each contributes.
fn format_fragment(name: &str) -> Option<RunFragment> {
    let fragment = match name {
        "b" | "strong" => RunFragment::Bold,
        "i" | "em" => RunFragment::Italic,
        "u" | "ins" => RunFragment::Underline,
        "s" | "strike" | "del" => RunFragment::Strike,
        "sub" => RunFragment::VerticalAlign(VerticalPosition::Subscript),
        "sup" => RunFragment::VerticalAlign(VerticalPosition::Superscript),
        _ => return None,
    };
    Some(fragment)
}

/// Formatting read from the attributes of a container tag.
#[derive(Debug, Default)]
struct ContainerStyle {
    runs: Vec<RunFragment>,
    paragraphs: Vec<ParagraphFragment>,
    /// The paragraph attributes call for a paragraph of its own.
    new_paragraph: bool,
    page_break_after: bool,
}

enum LinkTarget {
    External(String),
    Anchor(String),
}

impl Engine<'_> {
    pub(super) fn open_tag(&mut self, tag: TagKind) {
        let name = self.tokens.tag_name().to_string();
        match tag {
            TagKind::Anchor => self.open_anchor(),
            TagKind::Abbreviation => self.open_abbreviation(&name),
            TagKind::Block => self.open_block(&name),
            TagKind::BlockQuote => self.open_blockquote(),
            TagKind::Body => self.open_body(&name),
            TagKind::Break => self.push_run(RunContent::Break),
            TagKind::Caption => self.open_caption(),
            TagKind::Cite => {
                let options = self.options;
                let style = self
                    .doc
                    .style_id(&options.default_styles.quote, StyleFamily::Character);
                self.open_inline(&name, vec![RunFragment::Style(style)]);
            }
            TagKind::DefinitionDescription => {
                let extra = vec![
                    ParagraphFragment::Indentation(Indentation {
                        first_line: Some(708),
                        ..Default::default()
                    }),
                    ParagraphFragment::Spacing(Spacing {
                        after: Some(0),
                        ..Default::default()
                    }),
                ];
                self.paragraph_block(&name, extra);
            }
            TagKind::DefinitionTerm => {
                let extra = vec![ParagraphFragment::Spacing(Spacing {
                    after: Some(0),
                    ..Default::default()
                })];
                self.paragraph_block(&name, extra);
            }
            TagKind::FigureCaption => self.open_figure_caption(),
            TagKind::Font => self.open_font(),
            TagKind::Format(fragment) => self.open_inline(&name, vec![fragment]),
            TagKind::Heading(level) => self.open_heading(&name, level),
            TagKind::HorizontalRule => self.open_horizontal_rule(),
            TagKind::Image => {
                if let Some(run) = self.image_run() {
                    self.pending.push(run.into());
                }
            }
            TagKind::List { ordered } => self.open_list(ordered),
            TagKind::ListItem => self.open_list_item(),
            TagKind::Paragraph => self.paragraph_block(&name, Vec::new()),
            TagKind::Preformatted => self.open_preformatted(),
            TagKind::Quote => self.open_quote(),
            TagKind::Skipped => {
                debug!("skipping <{name}>");
                self.tokens.skip_until_end();
            }
            TagKind::Span => self.open_span(),
            TagKind::Table => self.open_table(),
            TagKind::TableCell => self.open_table_cell(&name),
            TagKind::TablePart => {
                let (cells, paragraphs, runs) = self.table_attributes(true);
                self.tables.begin_tag(&name, cells, paragraphs);
                self.runs.merge_tag(&name, runs);
            }
            TagKind::TableRow => self.open_table_row(),
            TagKind::Unknown => debug!("no handler for <{name}>"),
        }
    }

    pub(super) fn close_tag(&mut self, tag: TagKind) {
        let name = self.tokens.tag_name().to_string();
        match tag {
            TagKind::Block => {
                if !self.pending.is_empty() && !self.ends_with_break() {
                    self.push_run(RunContent::Break);
                }
                self.end_container(&name);
            }
            TagKind::Body | TagKind::Cite | TagKind::Font | TagKind::Format(_) | TagKind::Span => {
                self.end_container(&name)
            }
            TagKind::List { .. } => {
                self.flush();
                if let Some(numbering) = self.numbering.as_mut() {
                    numbering.end_list();
                }
            }
            TagKind::Quote => {
                let suffix = self.options.quote_chars.suffix.clone();
                self.push_run(RunContent::Text(suffix));
                self.end_container(&name);
            }
            TagKind::Table => self.close_table(),
            TagKind::TableCell => self.close_table_cell(&name),
            TagKind::TablePart => {
                self.tables.end_tag(&name);
                self.runs.end_tag(&name);
            }
            TagKind::TableRow => {
                if self.table_ctx.has_context() {
                    self.flush();
                    self.table_ctx.end_row();
                    self.tables.end_tag(&name);
                    self.runs.end_tag(&name);
                }
            }
            _ => {}
        }
    }

    // Attribute readers.

    fn find_class_style(&self, family: StyleFamily) -> Option<String> {
        self.tokens
            .attributes()
            .classes()
            .iter()
            .find_map(|class| self.doc.styles().find(class, family).map(|e| e.id.clone()))
    }

    fn run_attributes(&self) -> Vec<RunFragment> {
        let attrs = self.tokens.attributes();
        let styles = self.tokens.styles();
        let mut fragments = Vec::new();
        if attrs.is_empty() {
            return fragments;
        }
        if let Some(color) = styles.get_color("color").or_else(|| attrs.get_color("color")) {
            fragments.push(RunFragment::Color(color.to_hex()));
        }
        if let Some(color) = styles.get_color("background-color") {
            fragments.push(RunFragment::Shading(color.to_hex()));
        }
        let decoration = styles.get_text_decoration("text-decoration");
        if decoration.underline {
            fragments.push(RunFragment::Underline);
        }
        if decoration.line_through {
            fragments.push(RunFragment::Strike);
        }
        if let Some(style) = self.find_class_style(StyleFamily::Character) {
            fragments.push(RunFragment::Style(style));
        }
        let font = styles.get_font("font");
        if font.style == Some(FontStyle::Italic) {
            fragments.push(RunFragment::Italic);
        }
        if font.weight == Some(FontWeight::Bold) {
            fragments.push(RunFragment::Bold);
        }
        if font.small_caps {
            fragments.push(RunFragment::SmallCaps);
        }
        if let Some(family) = font.family {
            fragments.push(RunFragment::Fonts(family));
        }
        if let Some(size) = font.size.filter(Unit::is_fixed) {
            fragments.push(RunFragment::Size(size.in_half_points()));
        }
        fragments
    }

    /// Paragraph fragments of the current tag; the flag tells whether they
    /// call for a paragraph of its own.
    fn paragraph_attributes(&self) -> (Vec<ParagraphFragment>, bool) {
        let attrs = self.tokens.attributes();
        let styles = self.tokens.styles();
        let mut fragments = Vec::new();
        if attrs.is_empty() {
            return (fragments, false);
        }
        if let Some(style) = self.find_class_style(StyleFamily::Paragraph) {
            fragments.push(ParagraphFragment::Style(style));
        }
        if let Some(align) = styles
            .get("text-align")
            .or_else(|| attrs.get("align"))
            .and_then(parse_align)
        {
            fragments.push(ParagraphFragment::Justification(align));
        }
        if let Some(borders) = styles.get_border("border").to_borders() {
            fragments.push(ParagraphFragment::Borders(borders));
        }

        let margin = styles.get_margin("margin");
        let dxa = |u: Option<Unit>| u.filter(Unit::is_fixed).map(|u| u.in_dxa());
        let (before, after) = (dxa(margin.top), dxa(margin.bottom));
        if before.is_some() || after.is_some() {
            let points = |v: i64| v.max(0) as u32;
            fragments.push(ParagraphFragment::Spacing(Spacing {
                before: before.map(points),
                after: after.map(points),
                ..Default::default()
            }));
        }
        let (left, right) = (dxa(margin.left), dxa(margin.right));
        if left.is_some() || right.is_some() {
            fragments.push(ParagraphFragment::Indentation(Indentation {
                left,
                right,
                ..Default::default()
            }));
        }
        if let Some(indent) = styles.get_unit("text-indent").filter(Unit::is_fixed) {
            fragments.push(ParagraphFragment::Indentation(Indentation {
                first_line: Some(indent.in_dxa()),
                ..Default::default()
            }));
        }

        let new_paragraph = !fragments.is_empty();
        (fragments, new_paragraph)
    }

    /// Common attributes of block and inline containers. A
    /// `page-break-before` adds its break runs right away.
    fn container_attributes(&mut self, tag: &str) -> ContainerStyle {
        let mut style = ContainerStyle::default();
        if !self.table_ctx.has_context() || tag == "pre" {
            let styles = self.tokens.styles();
            style.page_break_after =
                styles.get_lower("page-break-after").as_deref() == Some("always");
            if styles.get_lower("page-break-before").as_deref() == Some("always") {
                self.push_run(RunContent::PageBreak);
                self.push_run(RunContent::LastRenderedPageBreak);
            }
        }

        let padding = self.tokens.styles().get_margin("padding");
        let dxa = |u: Option<Unit>| {
            u.filter(Unit::is_fixed)
                .map(|u| u.in_dxa())
                .filter(|&v| v > 0)
        };
        let (left, right) = (dxa(padding.left), dxa(padding.right));
        if left.is_some() || right.is_some() {
            style.paragraphs.push(ParagraphFragment::Indentation(Indentation {
                left,
                right,
                ..Default::default()
            }));
        }

        let (paragraphs, new_paragraph) = self.paragraph_attributes();
        style.paragraphs.extend(paragraphs);
        style.new_paragraph = new_paragraph;
        style.runs = self.run_attributes();
        style
    }

    /// Cell, paragraph and run fragments shared by `table`, `tr`, `td` and
    /// the row groups. `align` is a text alignment except on `<table>`.
    fn table_attributes(
        &self,
        align_attribute: bool,
    ) -> (Vec<CellFragment>, Vec<ParagraphFragment>, Vec<RunFragment>) {
        let attrs = self.tokens.attributes();
        let styles = self.tokens.styles();
        let mut cells = Vec::new();
        let mut paragraphs = Vec::new();

        if let Some(color) = styles
            .get_color("background-color")
            .or_else(|| attrs.get_color("bgcolor"))
        {
            cells.push(CellFragment::Shading(color.to_hex()));
        }
        if let Some(v_align) = styles
            .get("vertical-align")
            .or_else(|| attrs.get("valign"))
            .and_then(parse_valign)
        {
            cells.push(CellFragment::VAlign(v_align));
        }
        let align = styles
            .get("text-align")
            .or_else(|| attrs.get("align").filter(|_| align_attribute))
            .and_then(parse_align);
        if let Some(align) = align {
            paragraphs.push(ParagraphFragment::Justification(align));
        }

        let mut runs = self.run_attributes();
        runs.retain(|f| !matches!(f, RunFragment::Shading(_)));
        (cells, paragraphs, runs)
    }

    // Containers.

    fn begin_container(&mut self, tag: &str, style: ContainerStyle) {
        if style.page_break_after {
            self.breaks_after.push(self.runs.depth());
        }
        self.runs.merge_tag(tag, style.runs);
        self.paragraphs.begin_tag(tag, style.paragraphs);
    }

    fn end_container(&mut self, tag: &str) {
        self.runs.end_tag(tag);
        self.paragraphs.end_tag(tag);
        if self.breaks_after.last() == Some(&self.runs.depth()) {
            self.breaks_after.pop();
            self.flush();
            let page_break = Paragraph::new(vec![Run::new(RunContent::PageBreak).into()]);
            self.add_block(page_break.into());
        }
    }

    /// Reads the element up to its close tag into a paragraph of its own.
    fn own_paragraph(&mut self, tag: &str, style: ContainerStyle) {
        self.begin_container(tag, style);
        let content = self.sub_convert(tag);
        self.pending.extend(content);
        self.flush();
        self.end_container(tag);
    }

    fn paragraph_block(&mut self, tag: &str, extra: Vec<ParagraphFragment>) {
        self.flush();
        let mut style = self.container_attributes(tag);
        let mut paragraphs = extra;
        paragraphs.append(&mut style.paragraphs);
        style.paragraphs = paragraphs;
        self.own_paragraph(tag, style);
    }

    /// `div` and the sectioning tags: a line break unless their attributes
    /// ask for a paragraph.
    fn open_block(&mut self, tag: &str) {
        let styles = self.tokens.styles();
        let as_paragraph = self.options.consider_div_as_paragraph
            || styles.get("text-align").is_some()
            || self.tokens.attributes().get("align").is_some()
            || !styles.get_border("border").is_empty();
        if as_paragraph {
            self.paragraph_block(tag, Vec::new());
            return;
        }
        let style = self.container_attributes(tag);
        if style.new_paragraph {
            self.flush();
            self.own_paragraph(tag, style);
            return;
        }
        if !self.pending.is_empty() && !self.ends_with_break() {
            self.push_run(RunContent::Break);
        }
        self.begin_container(tag, style);
    }

    fn open_inline(&mut self, tag: &str, mut fragments: Vec<RunFragment>) {
        let mut style = self.container_attributes(tag);
        fragments.append(&mut style.runs);
        style.runs = fragments;
        self.begin_container(tag, style);
    }

    fn open_span(&mut self) {
        let style = self.container_attributes("span");
        if style.new_paragraph {
            self.flush();
            self.own_paragraph("span", style);
        } else {
            self.begin_container("span", style);
        }
    }

    fn open_font(&mut self) {
        let attrs = self.tokens.attributes();
        let mut fragments = Vec::new();
        if let Some(size) = attrs
            .get("size")
            .and_then(parse_html_font_size)
            .filter(Unit::is_fixed)
        {
            fragments.push(RunFragment::Size(size.in_half_points()));
        }
        if let Some(face) = attrs.get("face").and_then(first_family) {
            fragments.push(RunFragment::Fonts(face));
        }
        self.open_inline("font", fragments);
    }

    fn open_body(&mut self, tag: &str) {
        if tag == "body" {
            if let Some(orientation) = self.tokens.styles().get_lower("page-orientation") {
                self.doc.set_page_orientation(orientation == "landscape");
            }
        }
        let style = ContainerStyle {
            runs: self.run_attributes(),
            paragraphs: self.paragraph_attributes().0,
            ..Default::default()
        };
        self.begin_container(tag, style);
    }

    fn open_quote(&mut self) {
        let options = self.options;
        let style = self
            .doc
            .style_id(&options.default_styles.quote, StyleFamily::Character);
        self.open_inline("q", vec![RunFragment::Style(style)]);
        self.push_run(RunContent::Text(options.quote_chars.prefix.clone()));
    }

    fn open_blockquote(&mut self) {
        self.flush();
        let options = self.options;
        let style = self
            .doc
            .style_id(&options.default_styles.intense_quote, StyleFamily::Paragraph);
        let cite = self
            .tokens
            .attributes()
            .get("cite")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self.paragraphs
            .begin_tag("blockquote", vec![ParagraphFragment::Style(style)]);
        let content = self.sub_convert("blockquote");
        self.pending.extend(content);
        if let Some(cite) = cite.filter(|_| !self.pending.is_empty()) {
            let reference = self.note_reference(&cite);
            self.pending.push(reference.into());
        }
        self.flush();
        self.paragraphs.end_tag("blockquote");
    }

    fn open_heading(&mut self, tag: &str, level: u8) {
        self.flush();
        let (paragraphs, _) = self.paragraph_attributes();
        let runs = self.run_attributes();
        self.runs.merge_tag(tag, runs);
        self.paragraphs.begin_tag(tag, paragraphs);

        let mut children = self.sub_convert(tag);
        let options = self.options;
        let style = self.doc.style_id(
            &format!("{}{level}", options.default_styles.heading),
            StyleFamily::Paragraph,
        );
        let mut props = ParagraphProperties::styled(style);
        if let Some(depth) = strip_heading_number(&mut children) {
            let (numbering, store) = self.lists();
            numbering.apply_heading_numbering(store, &mut props, depth);
        }
        trim_trailing_space(&mut children);
        if !children.is_empty() {
            let item = self.take_paragraph_props();
            if props.numbering.is_none() {
                props.numbering = item.numbering;
                props.indentation = item.indentation;
            }
            let paragraph = self.finish_paragraph(Paragraph { props, children });
            self.add_block(paragraph.into());
        }

        self.runs.end_tag(tag);
        self.paragraphs.end_tag(tag);
    }

    fn open_horizontal_rule(&mut self) {
        self.flush();
        let top = self
            .tokens
            .styles()
            .get_border("border")
            .top
            .filter(SideBorder::is_valid)
            .map(|b| b.to_line())
            .unwrap_or_else(|| BorderLine::sized(BorderStyle::Single, 4));
        let after_border = match self.last_block() {
            Some(Block::Table(_)) => true,
            Some(Block::Paragraph(p)) => p
                .props
                .borders
                .as_ref()
                .and_then(|b| b.bottom.as_ref())
                .is_some_and(|b| b.size.unwrap_or(0) > 0),
            None => false,
        };
        let mut props = ParagraphProperties {
            borders: Some(Borders {
                top: Some(top),
                ..Default::default()
            }),
            ..Default::default()
        };
        if after_border {
            props.spacing = Some(Spacing {
                before: Some(240),
                ..Default::default()
            });
        }
        let paragraph = self.finish_paragraph(Paragraph {
            props,
            children: vec![Run::default().into()],
        });
        self.add_block(paragraph.into());
    }

    fn open_preformatted(&mut self) {
        self.flush();
        let style = self.container_attributes("pre");
        let options = self.options;
        if options.render_pre_as_table {
            let table_style = self
                .doc
                .style_id(&options.default_styles.pre_table, StyleFamily::Table);
            self.table_ctx.new_context(Table {
                props: TableProperties {
                    style: Some(table_style),
                    width: TableWidth::Pct(5000),
                    ..Default::default()
                },
                grid: vec![Some(5610)],
                rows: Vec::new(),
            });
            let line = BorderLine::sized(BorderStyle::Single, 4);
            let cell = TableCell {
                props: TableCellProperties {
                    borders: Some(Borders {
                        top: Some(line.clone()),
                        left: Some(line.clone()),
                        bottom: Some(line.clone()),
                        right: Some(line),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                content: Vec::new(),
            };
            self.table_ctx.begin_row(None);
            self.table_ctx.begin_cell(cell, 1);
        }

        self.begin_container("pre", style);
        self.preformatted += 1;
        let content = self.sub_convert("pre");
        self.pending.extend(content);
        self.flush();
        self.preformatted -= 1;

        if options.render_pre_as_table {
            self.table_ctx.end_cell();
            self.table_ctx.end_row();
            if let Some(state) = self.table_ctx.close_context() {
                self.add_block(Block::Table(state.table));
            }
        }
        self.end_container("pre");
    }

    fn open_figure_caption(&mut self) {
        self.flush();
        let options = self.options;
        let style = self
            .doc
            .style_id(&options.default_styles.caption, StyleFamily::Paragraph);
        let number = self.doc.next_figure_number();
        let mut children: Vec<Inline> = vec![
            Run::text("Figure ").into(),
            Inline::SimpleField(SimpleField {
                instruction: " SEQ Figure \\* ARABIC ".into(),
                runs: vec![Run::text(number.to_string())],
            }),
        ];
        let mut content = self.sub_convert("figcaption");
        prefix_space(&mut content);
        children.extend(content);
        trim_trailing_space(&mut children);
        let props = ParagraphProperties {
            style: Some(style),
            keep_next: true,
            ..Default::default()
        };
        let paragraph = self.finish_paragraph(Paragraph { props, children });
        self.add_block(paragraph.into());
    }

    // Notes and links.

    /// Registers a footnote or endnote holding `description` and returns the
    /// run referencing it.
    fn note_reference(&mut self, description: &str) -> Run {
        let options = self.options;
        let styles = &options.default_styles;
        let (kind, text_style, reference_style) = match options.acronym_position {
            AcronymPosition::PageEnd => (
                NoteKind::Footnote,
                &styles.footnote_text,
                &styles.footnote_reference,
            ),
            AcronymPosition::DocumentEnd => (
                NoteKind::Endnote,
                &styles.endnote_text,
                &styles.endnote_reference,
            ),
        };
        let text_style = self.doc.style_id(text_style, StyleFamily::Paragraph);
        let reference_style = self.doc.style_id(reference_style, StyleFamily::Character);

        let mut children: Vec<Inline> = vec![
            Run::with_props(
                RunProperties::styled(reference_style.clone()),
                RunContent::NoteReferenceMark(kind),
            )
            .into(),
            Run::text(" ").into(),
        ];
        if NOTE_LINK.is_match(description) && Url::parse(description).is_ok() {
            let rel_id = self.doc.add_note_hyperlink(kind, description);
            let link_style = self
                .doc
                .style_id(&styles.hyperlink, StyleFamily::Character);
            children.push(Inline::Hyperlink(Hyperlink {
                rel_id: Some(rel_id),
                anchor: None,
                tooltip: None,
                children: vec![Run::with_props(
                    RunProperties::styled(link_style),
                    RunContent::Text(description.to_string()),
                )
                .into()],
            }));
        } else {
            children.push(Run::text(description).into());
        }
        let note = Paragraph {
            props: ParagraphProperties::styled(text_style),
            children,
        };
        let id = self.doc.add_note(kind, vec![note]);
        Run::with_props(
            RunProperties::styled(reference_style),
            RunContent::NoteReference(kind, id),
        )
    }

    fn open_abbreviation(&mut self, tag: &str) {
        let Some(title) = self
            .tokens
            .attributes()
            .get("title")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
        else {
            return;
        };
        let content = self.sub_convert(tag);
        let starts_with_run = matches!(content.first(), Some(Inline::Run(_)));
        self.pending.extend(content);
        if starts_with_run {
            let reference = self.note_reference(&title);
            self.pending.push(reference.into());
        }
    }

    fn open_anchor(&mut self) {
        let attrs = self.tokens.attributes();
        let Some(href) = attrs
            .get("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            return;
        };
        let mut href = href.to_string();
        let tooltip = attrs.get("title").map(str::to_string);
        if href
            .get(..4)
            .is_some_and(|p| p.eq_ignore_ascii_case("www."))
        {
            href = format!("http://{href}");
        }
        let target = match href.strip_prefix('#') {
            Some(anchor) => {
                if anchor.is_empty() || (self.options.exclude_link_anchor && anchor != "_top") {
                    return;
                }
                LinkTarget::Anchor(anchor.to_string())
            }
            None => match Url::parse(&href) {
                Ok(url) if url.scheme() != "javascript" => LinkTarget::External(href.clone()),
                _ => return,
            },
        };

        let mut children = self.sub_convert("a");
        if children.is_empty() {
            return;
        }
        let (rel_id, anchor) = match target {
            LinkTarget::External(uri) => (Some(self.doc.add_hyperlink(&uri)), None),
            LinkTarget::Anchor(name) => (None, Some(name)),
        };

        let mut has_image = false;
        for inline in children.iter_mut() {
            let Inline::Run(run) = inline else {
                continue;
            };
            for content in run.content.iter_mut() {
                if let RunContent::Drawing(drawing) = content {
                    has_image = true;
                    if let Some(rel_id) = &rel_id {
                        drawing.link_click = Some(LinkClick {
                            rel_id: rel_id.clone(),
                            tooltip: Some(drawing.description.clone()).filter(|d| !d.is_empty()),
                        });
                    }
                }
            }
        }

        let options = self.options;
        let style = self
            .doc
            .style_id(&options.default_styles.hyperlink, StyleFamily::Character);
        let first_text = children.iter_mut().find_map(|inline| match inline {
            Inline::Run(run) if !run.has_drawing() => Some(run),
            _ => None,
        });
        if let Some(run) = first_text {
            run.props.style = Some(style);
        }

        self.pending.push(Inline::Hyperlink(Hyperlink {
            rel_id,
            anchor,
            tooltip,
            children,
        }));
        if has_image {
            self.flush();
        }
    }

    fn image_run(&mut self) -> Option<Run> {
        let attrs = self.tokens.attributes();
        let styles = self.tokens.styles();
        let src = attrs
            .get("src")
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        let alt = attrs
            .get("title")
            .or_else(|| attrs.get("alt"))
            .unwrap_or_default()
            .to_string();
        let dimension = |name: &str| {
            attrs
                .get_unit(name)
                .or_else(|| styles.get_unit(name))
                .filter(|u| u.is_fixed() && u.value > 0.0)
                .map(|u| u.in_px())
        };
        let (width, height) = (dimension("width"), dimension("height"));
        let border = styles
            .get_side_border("border")
            .filter(SideBorder::is_valid)
            .map(|b| b.to_line())
            .or_else(|| {
                attrs.get_int("border").filter(|&b| b > 0).map(|b| {
                    BorderLine::sized(
                        BorderStyle::Single,
                        Unit::px(f64::from(b)).in_eighth_points(),
                    )
                })
            });

        let asset = self.images.resolve(&src, self.fetcher, self.doc)?;
        let (width, height) = match (width, height, asset.size) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, Some((iw, ih))) if iw > 0 => (w, w * f64::from(ih) / f64::from(iw)),
            (None, Some(h), Some((iw, ih))) if ih > 0 => (h * f64::from(iw) / f64::from(ih), h),
            (None, None, Some((iw, ih))) if iw > 0 && ih > 0 => (f64::from(iw), f64::from(ih)),
            (w, h, _) => (
                w.or(h).unwrap_or(FALLBACK_IMAGE_PX),
                h.or(w).unwrap_or(FALLBACK_IMAGE_PX),
            ),
        };

        let id = self.doc.next_drawing_id();
        let name = if src.starts_with("data:") {
            format!("Picture {id}")
        } else {
            src
        };
        let drawing = Drawing {
            rel_id: asset.rel_id,
            width_emu: Unit::px(width).in_emus(),
            height_emu: Unit::px(height).in_emus(),
            doc_pr_id: id,
            picture_id: id,
            name,
            description: alt,
            link_click: None,
        };
        let mut run = self.new_run(RunContent::Drawing(drawing));
        if border.is_some() {
            run.props.border = border;
        }
        Some(run)
    }

    // Lists.

    fn open_list(&mut self, ordered: bool) {
        self.flush();
        let attrs = self.tokens.attributes();
        let list_type = self
            .tokens
            .styles()
            .get("list-style-type")
            .and_then(list_type_name)
            .or_else(|| {
                attrs
                    .get("type")
                    .filter(|_| ordered)
                    .and_then(list_type_name)
            });
        let classes = attrs.classes();
        let (numbering, store) = self.lists();
        numbering.begin_list(store, list_type, ordered, classes);
    }

    fn open_list_item(&mut self) {
        self.flush();
        if !self.in_list() {
            self.own_paragraph("li", ContainerStyle::default());
            return;
        }
        let margin_left = self.tokens.styles().get_margin("margin").left;
        let item_classes = self.tokens.attributes().classes();
        let (numbering, store) = self.lists();
        let num_id = numbering.process_item(store, margin_left);
        let depth = numbering.level_depth();
        let list_classes = numbering.current_list_classes().to_vec();

        let class_style = item_classes
            .iter()
            .chain(list_classes.iter())
            .find_map(|class| {
                self.doc
                    .styles()
                    .find(class, StyleFamily::Paragraph)
                    .map(|e| e.id.clone())
            });
        let style = match class_style {
            Some(style) => style,
            None => {
                let options = self.options;
                self.doc
                    .style_id(&options.default_styles.list_paragraph, StyleFamily::Paragraph)
            }
        };
        let indentation = (depth >= 2).then(|| Indentation {
            left: Some(i64::from(depth) * 780),
            ..Default::default()
        });
        self.paragraph = ParagraphProperties {
            style: Some(style),
            numbering: Some(NumberingRef {
                level: depth.saturating_sub(1).min(8),
                num_id,
            }),
            indentation,
            ..Default::default()
        };
        self.paragraph_depth = self.table_ctx.depth();

        let content = self.sub_convert("li");
        self.pending.extend(content);
        self.flush();
        // An item with no content of its own numbers nothing after it.
        self.paragraph = ParagraphProperties::default();
    }

    // Tables.

    fn open_table(&mut self) {
        let options = self.options;
        let default_style = self
            .doc
            .style_id(&options.default_styles.table, StyleFamily::Table);
        let style = self
            .find_class_style(StyleFamily::Table)
            .unwrap_or_else(|| default_style.clone());
        let attrs = self.tokens.attributes();
        let styles = self.tokens.styles();

        let mut props = TableProperties {
            style: Some(style.clone()),
            ..Default::default()
        };
        match attrs.get_int("border") {
            Some(0) => props.borders = Some(Borders::all(BorderLine::none())),
            Some(size) if size > 0 => {
                if style != default_style {
                    let line = BorderLine::sized(
                        BorderStyle::Single,
                        Unit::px(f64::from(size)).in_eighth_points(),
                    );
                    props.borders = Some(Borders {
                        top: Some(BorderLine::none()),
                        left: Some(BorderLine::none()),
                        bottom: Some(BorderLine::none()),
                        right: Some(BorderLine::none()),
                        inside_h: Some(line.clone()),
                        inside_v: Some(line),
                    });
                }
            }
            _ => props.borders = styles.get_border("border").to_borders(),
        }

        props.width = match styles.get_unit("width").or_else(|| attrs.get_unit("width")) {
            Some(u) if u.metric == UnitMetric::Percent => {
                TableWidth::Pct((u.value * 50.0).round() as i64)
            }
            Some(u) if u.is_fixed() => TableWidth::Dxa(u.in_dxa()),
            _ => TableWidth::Auto(0),
        };

        let align = attrs
            .get("align")
            .and_then(parse_align)
            .filter(|j| *j != Justification::Both);
        props.justification = align;
        if matches!(align, None | Some(Justification::Left)) {
            let margin = styles.get_margin("margin");
            let dxa = |u: Option<Unit>| u.filter(Unit::is_fixed).map(|u| TableWidth::Dxa(u.in_dxa()));
            let cell_margin = CellMargins {
                top: dxa(margin.top),
                left: dxa(margin.left),
                bottom: dxa(margin.bottom),
                right: dxa(margin.right),
            };
            if !cell_margin.is_empty() {
                props.cell_margin = Some(cell_margin);
            }
            let auto = |u: Option<Unit>| u.is_some_and(|u| u.is_auto());
            match (auto(margin.left), auto(margin.right)) {
                (true, true) => props.justification = Some(Justification::Center),
                (true, false) => props.justification = Some(Justification::Right),
                (false, true) => props.justification = Some(Justification::Left),
                (false, false) => {}
            }
        }
        if let Some(spacing) = attrs.get_int("cellspacing").filter(|&v| v > 0) {
            props.cell_spacing = Some(Unit::px(f64::from(spacing)).in_dxa());
        }
        if let Some(padding) = attrs.get_int("cellpadding").filter(|&v| v >= 0) {
            let width = Some(TableWidth::Dxa(Unit::px(f64::from(padding)).in_dxa()));
            props.cell_margin = Some(CellMargins {
                top: width,
                left: width,
                bottom: width,
                right: width,
            });
        }

        let (cells, paragraphs, runs) = self.table_attributes(false);
        self.flush();
        self.tables.begin_tag("table", cells, paragraphs);
        self.runs.merge_tag("table", runs);
        self.table_ctx.new_context(Table {
            props,
            ..Default::default()
        });
    }

    pub(super) fn close_table(&mut self) {
        self.flush();
        let state = self.table_ctx.close_context();
        self.tables.end_tag("table");
        self.runs.end_tag("table");
        let Some(TableState {
            table, captions, ..
        }) = state
        else {
            return;
        };
        if table.rows.is_empty() {
            debug!("dropping a table without rows");
            for caption in captions {
                self.add_block(caption.into());
            }
            return;
        }
        let (above, below) = match self.options.table_caption_position {
            CaptionPosition::Above => (captions, Vec::new()),
            CaptionPosition::Below => (Vec::new(), captions),
        };
        for caption in above {
            self.add_block(caption.into());
        }
        self.add_block(Block::Table(table));
        for caption in below {
            self.add_block(caption.into());
        }
    }

    fn open_caption(&mut self) {
        let Some(table_align) = self
            .table_ctx
            .current()
            .map(|s| s.table.props.justification)
        else {
            return;
        };
        let justification = self
            .tokens
            .styles()
            .get("text-align")
            .or_else(|| self.tokens.attributes().get("align"))
            .and_then(parse_align)
            .or(table_align);
        let options = self.options;
        let style = self
            .doc
            .style_id(&options.default_styles.caption, StyleFamily::Paragraph);

        let mut content = self.sub_convert("caption");
        prefix_space(&mut content);
        let mut children: Vec<Inline> = vec![
            Run::new(RunContent::FieldBegin).into(),
            Run::new(RunContent::FieldCode(" SEQ TABLE \\* ARABIC ".into())).into(),
            Run::new(RunContent::FieldEnd).into(),
        ];
        children.extend(content);
        trim_trailing_space(&mut children);
        let props = ParagraphProperties {
            style: Some(style),
            justification,
            ..Default::default()
        };
        let caption = self.finish_paragraph(Paragraph { props, children });
        self.table_ctx.add_caption(caption);
    }

    fn open_table_row(&mut self) {
        if !self.table_ctx.has_context() {
            return;
        }
        let height = self
            .tokens
            .styles()
            .get_unit("height")
            .or_else(|| self.tokens.attributes().get_unit("height"))
            .filter(Unit::is_fixed)
            .map(|u| u.in_dxa().max(0) as u32);
        let (cells, paragraphs, runs) = self.table_attributes(true);
        self.tables.begin_tag("tr", cells, paragraphs);
        self.runs.merge_tag("tr", runs);
        self.table_ctx.begin_row(height);
    }

    fn open_table_cell(&mut self, tag: &str) {
        if !self.table_ctx.has_context() {
            return;
        }
        let attrs = self.tokens.attributes();
        let styles = self.tokens.styles();
        let mut props = TableCellProperties::default();

        props.width = match styles.get_unit("width").or_else(|| attrs.get_unit("width")) {
            Some(u) if u.metric == UnitMetric::Percent => {
                Some(TableWidth::Pct((u.value * 50.0).round() as i64))
            }
            Some(u) if u.is_fixed() => Some(TableWidth::Dxa(u.in_dxa())),
            _ => None,
        };
        if let Some(span) = attrs.get_int("colspan").filter(|&v| v > 1) {
            props.grid_span = Some((span as u32).min(MAX_COL_SPAN));
        }
        let row_span = attrs
            .get_int("rowspan")
            .filter(|&v| v > 1)
            .map_or(1, |v| (v as u32).min(MAX_ROW_SPAN));
        if row_span > 1 {
            props.v_merge = Some(VerticalMerge::Restart);
        }

        let direction = match styles.get_lower("writing-mode").as_deref() {
            Some("tb-lr") | Some("vertical-lr") => Some(TextDirection::BottomToTopLeftToRight),
            Some("tb-rl") | Some("vertical-rl") => Some(TextDirection::TopToBottomRightToLeft),
            _ => None,
        };
        if direction.is_some() {
            props.text_direction = direction;
            props.v_align = Some(VerticalAlign::Center);
        }

        let padding = styles.get_margin("padding");
        let side = |u: Option<Unit>| match u {
            Some(u) if u.value <= 0.0 => None,
            Some(u) if u.metric == UnitMetric::Percent => {
                Some(TableWidth::Pct((u.value * 50.0).round() as i64))
            }
            Some(u) if u.is_fixed() => Some(TableWidth::Dxa(u.in_dxa())),
            _ => None,
        };
        let margins = CellMargins {
            top: side(padding.top),
            left: side(padding.left),
            bottom: side(padding.bottom),
            right: side(padding.right),
        };
        if !margins.is_empty() {
            props.margins = Some(margins);
        }
        props.borders = styles.get_border("border").to_borders();

        let height = styles
            .get_unit("height")
            .or_else(|| attrs.get_unit("height"))
            .filter(Unit::is_fixed)
            .map(|u| u.in_dxa().max(0) as u32);

        let (cells, mut paragraphs, runs) = self.table_attributes(true);
        if direction.is_some() {
            paragraphs.insert(0, ParagraphFragment::Justification(Justification::Center));
        }
        if let Some(height) = height {
            if let Some(row) = self
                .table_ctx
                .current_table()
                .and_then(|t| t.rows.last_mut())
            {
                row.height.get_or_insert(height);
            }
        }
        self.tables.begin_tag(tag, cells, paragraphs);
        self.runs.merge_tag(tag, runs);
        self.table_ctx.begin_cell(
            TableCell {
                props,
                content: Vec::new(),
            },
            row_span,
        );
    }

    fn close_table_cell(&mut self, tag: &str) {
        if !self.table_ctx.has_context() {
            self.push_run(RunContent::Text(" ".into()));
            return;
        }
        self.flush();
        if let Some(cell) = self.table_ctx.current_cell() {
            self.tables.cells.apply_tags(&mut cell.props);
            cell.props.v_align.get_or_insert(VerticalAlign::Center);
            tidy_blocks(&mut cell.content);
            for block in cell.content.iter_mut() {
                if let Block::Paragraph(p) = block {
                    self.tables.paragraphs.apply_tags(&mut p.props);
                }
            }
        }
        self.table_ctx.end_cell();
        self.tables.end_tag(tag);
        self.runs.end_tag(tag);
    }
}

/// Strips a leading `1.2. ` from the heading text and returns its depth.
fn strip_heading_number(children: &mut [Inline]) -> Option<u32> {
    let Some(Inline::Run(run)) = children.first_mut() else {
        return None;
    };
    let Some(RunContent::Text(text)) = run.content.first_mut() else {
        return None;
    };
    let (depth, end) = {
        let caps = HEADING_NUMBER.captures(text)?;
        (caps[1].matches('.').count() as u32, caps.get(0)?.end())
    };
    text.replace_range(..end, "");
    Some(depth)
}

/// Separates content following a generated label.
fn prefix_space(content: &mut [Inline]) {
    if let Some(Inline::Run(run)) = content.first_mut() {
        if let Some(RunContent::Text(text)) = run.content.first_mut() {
            if !text.starts_with(' ') {
                text.insert(0, ' ');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{convert, convert_with, offline, paragraph, png_fetcher, table, texts};
    use super::*;
    use crate::config::ConverterOptions;
    use crate::document::Document;
    use crate::token::{HtmlToken, HtmlTokens};
    use pretty_assertions::assert_eq;

    fn numbering_of(block: &Block) -> Option<NumberingRef> {
        paragraph(block).props.numbering
    }

    #[test]
    fn test_tag_kinds() {
        assert_eq!(TagKind::from_name("strong"), TagKind::Format(RunFragment::Bold));
        assert_eq!(TagKind::from_name("h3"), TagKind::Heading(3));
        assert_eq!(TagKind::from_name("h7"), TagKind::Unknown);
        assert_eq!(TagKind::from_name("hr"), TagKind::HorizontalRule);
        assert_eq!(TagKind::from_name("th"), TagKind::TableCell);
        assert_eq!(TagKind::from_name("marquee"), TagKind::Unknown);
    }

    #[test]
    fn test_unknown_tag_content_flows() {
        let (_, blocks) = convert("<p><blink>still</blink> here</p>");
        assert_eq!(texts(&blocks), vec!["still here"]);
    }

    #[test]
    fn test_script_and_style_skipped() {
        let (_, blocks) = convert("<style>p{color:red}</style><script>var x;</script><p>kept</p>");
        assert_eq!(texts(&blocks), vec!["kept"]);
    }

    #[test]
    fn test_ordered_list_scenario() {
        let (doc, blocks) = convert("<ol><li>A</li><li>B</li></ol>");
        assert_eq!(blocks.len(), 2);
        let (a, b) = (numbering_of(&blocks[0]).unwrap(), numbering_of(&blocks[1]).unwrap());
        assert_eq!(a.num_id, b.num_id);
        assert_ne!(a.num_id, 0);
        assert_eq!((a.level, b.level), (0, 0));
        assert_eq!(paragraph(&blocks[0]).props.style.as_deref(), Some("ListParagraph"));
        assert!(doc.numbering().instances().any(|n| n.id == a.num_id));
    }

    #[test]
    fn test_nested_lists() {
        let (_, blocks) =
            convert("<ul><li>one<ul><li>inner</li></ul></li><li>two</li></ul><ol><li>x</li></ol>");
        assert_eq!(texts(&blocks), vec!["one", "inner", "two", "x"]);
        let levels: Vec<u32> = blocks.iter().map(|b| numbering_of(b).unwrap().level).collect();
        assert_eq!(levels, vec![0, 1, 0, 0]);
        let ids: Vec<u32> = blocks.iter().map(|b| numbering_of(b).unwrap().num_id).collect();
        assert_eq!(ids[0], ids[2]);
        assert_ne!(ids[0], ids[3]);
        assert_eq!(
            paragraph(&blocks[1]).props.indentation.as_ref().and_then(|i| i.left),
            Some(1560)
        );
    }

    #[test]
    fn test_block_children_of_list_items_are_numbered() {
        let (_, blocks) =
            convert("<ol><li><p>A</p><p>more</p></li><li><h2>B</h2></li><li></li></ol><p>after</p>");
        assert_eq!(texts(&blocks), vec!["A", "more", "B", "after"]);
        let a = numbering_of(&blocks[0]).unwrap();
        assert_eq!(a.level, 0);
        assert_eq!(numbering_of(&blocks[1]), None);
        assert_eq!(numbering_of(&blocks[2]).map(|n| n.num_id), Some(a.num_id));
        assert_eq!(paragraph(&blocks[2]).props.style.as_deref(), Some("Heading2"));
        assert_eq!(numbering_of(&blocks[3]), None);
    }

    #[test]
    fn test_table_in_list_item_keeps_cells_plain() {
        let (_, blocks) = convert("<ul><li><table><tr><td>cell</td></tr></table>tail</li></ul>");
        let cell = &table(&blocks[0]).rows[0].cells[0];
        assert_eq!(paragraph(&cell.content[0]).props.numbering, None);
        assert!(numbering_of(&blocks[1]).is_some());
    }

    #[test]
    fn test_list_item_outside_list_is_plain() {
        let tokens = vec![
            HtmlToken::open("li", Default::default()),
            HtmlToken::Text("orphan".into()),
            HtmlToken::close("li"),
        ];
        let mut doc = Document::new();
        let options = ConverterOptions::default();
        let fetcher = offline();
        let engine = Engine::new(
            &mut doc,
            &fetcher,
            &options,
            HtmlTokens::from_tokens(tokens),
        );
        let blocks = engine.run();
        assert_eq!(texts(&blocks), vec!["orphan"]);
        assert_eq!(paragraph(&blocks[0]).props.numbering, None);
    }

    #[test]
    fn test_heading_numbering() {
        let (_, blocks) = convert("<h1>1. Intro</h1><h2>1.1. Scope</h2><h2>Plain</h2>");
        assert_eq!(texts(&blocks), vec!["Intro", "Scope", "Plain"]);
        let first = numbering_of(&blocks[0]).unwrap();
        let second = numbering_of(&blocks[1]).unwrap();
        assert_eq!(first.num_id, second.num_id);
        assert_eq!((first.level, second.level), (0, 1));
        assert_eq!(numbering_of(&blocks[2]), None);
        assert_eq!(paragraph(&blocks[1]).props.style.as_deref(), Some("Heading2"));
    }

    #[test]
    fn test_rowspan_scenario() {
        let (_, blocks) = convert("<table><tr><td rowspan='2'>X</td></tr><tr></tr></table>");
        let t = table(&blocks[0]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0].cells[0].props.v_merge, Some(VerticalMerge::Restart));
        assert_eq!(t.rows[1].cells.len(), 1);
        assert!(t.rows[1].cells[0].is_placeholder());
        assert_eq!(t.grid.len(), 1);
    }

    #[test]
    fn test_table_never_has_empty_rows() {
        let (_, blocks) = convert("<table><tr></tr><tr><td>a</td><td colspan=2>b</td></tr><tr></tr></table>");
        let t = table(&blocks[0]);
        assert_eq!(t.rows.len(), 1);
        assert!(t.rows.iter().all(|r| !r.cells.is_empty()));
        assert_eq!(t.grid.len(), 3);
    }

    #[test]
    fn test_rowspan_after_colspan_keeps_its_column() {
        let (_, blocks) = convert(
            "<table><tr><td colspan=2>A</td><td rowspan=2>B</td></tr>\
             <tr><td>C</td><td>D</td></tr></table>",
        );
        let t = table(&blocks[0]);
        let second: Vec<String> = t.rows[1]
            .cells
            .iter()
            .map(|c| {
                if c.is_placeholder() {
                    "<ph>".to_string()
                } else {
                    texts(&c.content).concat()
                }
            })
            .collect();
        assert_eq!(second, vec!["C", "D", "<ph>"]);
        assert_eq!(t.grid.len(), 3);
    }

    #[test]
    fn test_oversized_spans_are_clamped() {
        let (_, blocks) = convert(
            "<table><tr><td colspan=2000000000>a</td><td colspan=2000000000>b</td>\
             <td colspan=2000000000 rowspan=2000000000>c</td></tr></table>",
        );
        let t = table(&blocks[0]);
        let spans: Vec<u32> = t.rows[0].cells.iter().map(TableCell::span).collect();
        assert_eq!(spans, vec![MAX_COL_SPAN; 3]);
        assert_eq!(t.grid.len(), 3000);
    }

    #[test]
    fn test_table_attributes_cascade_to_cells() {
        let (_, blocks) = convert(
            "<table width='50%' style='color:red'><tr bgcolor='#00ff00'>\
             <td align='right' valign='top'>a</td><td>b</td></tr></table>",
        );
        let t = table(&blocks[0]);
        assert_eq!(t.props.width, TableWidth::Pct(2500));
        assert_eq!(t.props.style.as_deref(), Some("TableGrid"));
        let a = &t.rows[0].cells[0];
        assert_eq!(a.props.v_align, Some(VerticalAlign::Top));
        assert_eq!(a.props.shading.as_ref().map(|s| s.fill.as_str()), Some("00FF00"));
        let text = paragraph(&a.content[0]);
        assert_eq!(text.props.justification, Some(Justification::Right));
        assert_eq!(text.runs().next().unwrap().props.color.as_deref(), Some("FF0000"));
        let b = &t.rows[0].cells[1];
        assert_eq!(b.props.v_align, Some(VerticalAlign::Center));
        assert_eq!(paragraph(&b.content[0]).props.justification, None);
    }

    #[test]
    fn test_nested_table_lands_in_cell() {
        let (_, blocks) = convert(
            "<table><tr><td>out<table><tr><td>in</td></tr></table></td></tr></table>",
        );
        assert_eq!(blocks.len(), 1);
        let cell = &table(&blocks[0]).rows[0].cells[0];
        assert_eq!(cell.content.len(), 3);
        assert_eq!(paragraph(&cell.content[0]).inner_text(), "out");
        assert!(cell.content[1].is_table());
        assert!(matches!(cell.content[2], Block::Paragraph(_)));
    }

    #[test]
    fn test_caption_below_table() {
        let mut doc = Document::new();
        let options = ConverterOptions {
            table_caption_position: CaptionPosition::Below,
            ..Default::default()
        };
        let blocks = convert_with(
            &mut doc,
            &offline(),
            options,
            "<table align='center'><caption>Totals</caption><tr><td>1</td></tr></table>",
        );
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_table());
        let caption = paragraph(&blocks[1]);
        assert_eq!(caption.inner_text(), " Totals");
        assert_eq!(caption.props.style.as_deref(), Some("Caption"));
        assert_eq!(caption.props.justification, Some(Justification::Center));
        assert!(caption
            .runs()
            .any(|r| r.content == vec![RunContent::FieldCode(" SEQ TABLE \\* ARABIC ".into())]));
    }

    #[test]
    fn test_td_outside_table_is_a_space() {
        let tokens = vec![
            HtmlToken::Text("a".into()),
            HtmlToken::open("td", Default::default()),
            HtmlToken::close("td"),
            HtmlToken::Text("b".into()),
        ];
        let mut doc = Document::new();
        let options = ConverterOptions::default();
        let fetcher = offline();
        let engine = Engine::new(
            &mut doc,
            &fetcher,
            &options,
            HtmlTokens::from_tokens(tokens),
        );
        assert_eq!(texts(&engine.run()), vec!["a b"]);
    }

    #[test]
    fn test_hyperlink() {
        let (mut doc, blocks) = convert("see <a href='www.example.com' title='tip'>the <b>site</b></a>");
        let p = paragraph(&blocks[0]);
        let Inline::Hyperlink(link) = &p.children[1] else {
            panic!("expected a hyperlink, got {:?}", p.children);
        };
        assert_eq!(link.tooltip.as_deref(), Some("tip"));
        let rel_id = link.rel_id.clone().unwrap();
        assert_eq!(doc.add_hyperlink("http://www.example.com"), rel_id);
        let runs: Vec<&Run> = link.children.iter().filter_map(Inline::as_run).collect();
        assert_eq!(runs[0].props.style.as_deref(), Some("Hyperlink"));
        assert!(runs[1].props.bold);
    }

    #[test]
    fn test_links_without_target_are_plain_text() {
        let (_, blocks) = convert("<a href='javascript:void(0)'>js</a> <a href='relative.html'>rel</a> <a>none</a>");
        let p = paragraph(&blocks[0]);
        assert!(p.children.iter().all(|i| matches!(i, Inline::Run(_))));
        assert_eq!(p.inner_text(), "js rel none");
    }

    #[test]
    fn test_anchor_links() {
        let (_, blocks) = convert("<a href='#part2'>jump</a>");
        let Inline::Hyperlink(link) = &paragraph(&blocks[0]).children[0] else {
            panic!("expected a hyperlink");
        };
        assert_eq!(link.anchor.as_deref(), Some("part2"));
        assert_eq!(link.rel_id, None);

        let mut doc = Document::new();
        let options = ConverterOptions {
            exclude_link_anchor: true,
            ..Default::default()
        };
        let blocks = convert_with(&mut doc, &offline(), options, "<a href='#part2'>jump</a>");
        assert!(matches!(paragraph(&blocks[0]).children[0], Inline::Run(_)));
    }

    #[test]
    fn test_image_inside_link_gets_click_action() {
        let mut doc = Document::new();
        let blocks = convert_with(
            &mut doc,
            &png_fetcher(),
            ConverterOptions::default(),
            "<a href='http://example.com'><img src='a.png' alt='logo'></a>after",
        );
        assert_eq!(texts(&blocks).len(), 2);
        let Inline::Hyperlink(link) = &paragraph(&blocks[0]).children[0] else {
            panic!("expected a hyperlink");
        };
        let Some(RunContent::Drawing(drawing)) = link.children[0].as_run().and_then(|r| r.content.first()) else {
            panic!("expected a drawing");
        };
        let click = drawing.link_click.as_ref().unwrap();
        assert_eq!(Some(&click.rel_id), link.rel_id.as_ref());
        assert_eq!(click.tooltip.as_deref(), Some("logo"));
    }

    #[test]
    fn test_horizontal_rule() {
        let (_, blocks) = convert("<p style='border-bottom:1px solid black'>a</p><hr><hr style='border:2pt dashed red'>");
        let first = paragraph(&blocks[1]);
        let top = first.props.borders.as_ref().and_then(|b| b.top.clone()).unwrap();
        assert_eq!(top, BorderLine::sized(BorderStyle::Single, 4));
        assert_eq!(first.props.spacing.as_ref().and_then(|s| s.before), Some(240));
        let second = paragraph(&blocks[2]);
        let top = second.props.borders.as_ref().and_then(|b| b.top.clone()).unwrap();
        assert_eq!(top.style, BorderStyle::Dashed);
        assert_eq!(top.size, Some(16));
        assert_eq!(top.color.as_deref(), Some("FF0000"));
        assert_eq!(second.props.spacing, None);
    }

    #[test]
    fn test_quote_chars() {
        let (_, blocks) = convert("He said <q>hi</q>.");
        let p = paragraph(&blocks[0]);
        assert_eq!(p.inner_text(), "He said \u{201c}hi\u{201d}.");
        let quoted: Vec<&Run> = p.runs().filter(|r| r.props.style.is_some()).collect();
        assert_eq!(quoted.len(), 3);
        assert_eq!(quoted[0].props.style.as_deref(), Some("QuoteChar"));
    }

    #[test]
    fn test_blockquote_with_cite_endnote() {
        let mut doc = Document::new();
        let options = ConverterOptions {
            acronym_position: AcronymPosition::DocumentEnd,
            ..Default::default()
        };
        let blocks = convert_with(
            &mut doc,
            &offline(),
            options,
            "<blockquote cite='http://example.com/src'>Quoted</blockquote>",
        );
        let p = paragraph(&blocks[0]);
        assert_eq!(p.props.style.as_deref(), Some("IntenseQuote"));
        let last = p.runs().last().unwrap();
        assert_eq!(last.content, vec![RunContent::NoteReference(NoteKind::Endnote, 1)]);
        let notes = doc.notes_xml(NoteKind::Endnote).unwrap();
        assert!(notes.contains("http://example.com/src"));
        assert!(doc.notes_xml(NoteKind::Footnote).is_none());
    }

    #[test]
    fn test_div_as_break_or_paragraph() {
        let (_, blocks) = convert("<div>a</div><div>b</div>");
        assert_eq!(blocks.len(), 1);
        let p = paragraph(&blocks[0]);
        assert_eq!(p.children.len(), 3);
        assert_eq!(p.children[1], Inline::Run(Run::new(RunContent::Break)));

        let (_, blocks) = convert("<div style='text-align:center'>a</div><div>b</div>");
        assert_eq!(texts(&blocks), vec!["a", "b"]);
        assert_eq!(paragraph(&blocks[0]).props.justification, Some(Justification::Center));

        let mut doc = Document::new();
        let options = ConverterOptions {
            consider_div_as_paragraph: true,
            ..Default::default()
        };
        let blocks = convert_with(&mut doc, &offline(), options, "<div>a</div><div>b</div>");
        assert_eq!(texts(&blocks), vec!["a", "b"]);
    }

    #[test]
    fn test_page_breaks() {
        let (_, blocks) = convert(
            "<p style='page-break-after:always'>one</p><p style='page-break-before:always'>two</p>",
        );
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            paragraph(&blocks[1]).children,
            vec![Inline::Run(Run::new(RunContent::PageBreak))]
        );
        let two: Vec<&RunContent> = paragraph(&blocks[2])
            .runs()
            .flat_map(|r| r.content.iter())
            .collect();
        assert_eq!(two[0], &RunContent::PageBreak);
        assert_eq!(two[1], &RunContent::LastRenderedPageBreak);
    }

    #[test]
    fn test_span_styles() {
        let (_, blocks) = convert(
            "<span style='font: italic bold 12pt Arial; text-decoration: underline'>x</span>\
             <font size='5' face='Verdana, sans-serif'>y</font>",
        );
        let runs: Vec<&Run> = paragraph(&blocks[0]).runs().collect();
        let x = &runs[0].props;
        assert!(x.italic && x.bold && x.underline);
        assert_eq!(x.size, Some(24));
        assert_eq!(x.fonts.as_deref(), Some("Arial"));
        let y = &runs[1].props;
        assert_eq!(y.size, Some(36));
        assert_eq!(y.fonts.as_deref(), Some("Verdana"));
    }

    #[test]
    fn test_nested_formatting_merges() {
        let (_, blocks) = convert("<span style='color:blue'><span style='font-weight:bold'>x</span></span>");
        let run = paragraph(&blocks[0]).runs().next().unwrap();
        assert!(run.props.bold);
        assert_eq!(run.props.color.as_deref(), Some("0000FF"));
    }

    #[test]
    fn test_figure_caption() {
        let (_, blocks) = convert("<figcaption>Chart</figcaption><figcaption>Map</figcaption>");
        let first = paragraph(&blocks[0]);
        assert_eq!(first.inner_text(), "Figure 1 Chart");
        assert!(first.props.keep_next);
        assert_eq!(paragraph(&blocks[1]).inner_text(), "Figure 2 Map");
    }

    #[test]
    fn test_pre_as_table() {
        let mut doc = Document::new();
        let options = ConverterOptions {
            render_pre_as_table: true,
            ..Default::default()
        };
        let blocks = convert_with(&mut doc, &offline(), options, "<pre>code</pre><p>after</p>");
        let t = table(&blocks[0]);
        assert_eq!(t.props.width, TableWidth::Pct(5000));
        assert_eq!(t.grid, vec![Some(5610)]);
        let cell = &t.rows[0].cells[0];
        assert!(cell.props.borders.as_ref().is_some_and(|b| b.left.is_some()));
        assert_eq!(paragraph(&cell.content[0]).inner_text(), "code");
        assert_eq!(paragraph(&blocks[1]).inner_text(), "after");
    }

    #[test]
    fn test_definition_list() {
        let (_, blocks) = convert("<dl><dt>Term</dt><dd>Meaning</dd></dl>");
        let dd = paragraph(&blocks[1]);
        assert_eq!(dd.props.indentation.as_ref().and_then(|i| i.first_line), Some(708));
        assert_eq!(dd.props.spacing.as_ref().and_then(|s| s.after), Some(0));
        assert_eq!(paragraph(&blocks[0]).props.spacing.as_ref().and_then(|s| s.after), Some(0));
    }

    #[test]
    fn test_body_orientation() {
        let (doc, _) = convert("<body style='page-orientation: landscape'><p>x</p></body>");
        assert!(doc.body_xml().contains(r#"w:orient="landscape""#));
    }

    #[test]
    fn test_strip_heading_number() {
        let mut children: Vec<Inline> = vec![Run::text("2.3.1. Details").into()];
        assert_eq!(strip_heading_number(&mut children), Some(3));
        assert_eq!(children[0].inner_text(), "Details");
        let mut plain: Vec<Inline> = vec![Run::text("2023 report").into()];
        assert_eq!(strip_heading_number(&mut plain), None);
    }
}
