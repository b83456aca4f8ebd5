//! The conversion engine: pulls tokens, dispatches them to the tag handlers
//! and assembles the output blocks.

mod handlers;

use log::{debug, info};

use crate::cascade::{ParagraphFragment, RunFragment, StyleCascade, TableCascade};
use crate::config::ConverterOptions;
use crate::document::Document;
use crate::error::Result;
use crate::fetch::{DefaultFetcher, Fetch};
use crate::image::ImagePipeline;
use crate::model::{Block, Inline, Paragraph, ParagraphProperties, Run, RunContent};
use crate::numbering::{NumberingAllocator, NumberingStore};
use crate::style::StyleFamily;
use crate::table::TableContext;
use crate::token::{HtmlTokens, TokenKind};

use handlers::TagKind;

/// Converts HTML into blocks of a target document.
///
/// Styles, numbering, notes, images and hyperlinks are registered in the
/// document while converting; the blocks themselves are returned by
/// [`HtmlConverter::convert`] or appended to the body by
/// [`HtmlConverter::parse_html`].
pub struct HtmlConverter<'d> {
    document: &'d mut Document,
    fetcher: Box<dyn Fetch + 'd>,
    pub options: ConverterOptions,
}

impl<'d> HtmlConverter<'d> {
    pub fn new(document: &'d mut Document) -> Self {
        Self::with_fetcher(document, Box::new(DefaultFetcher::new()))
    }

    pub fn with_fetcher(document: &'d mut Document, fetcher: Box<dyn Fetch + 'd>) -> Self {
        Self {
            document,
            fetcher,
            options: ConverterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConverterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn document(&self) -> &Document {
        self.document
    }

    pub fn convert(&mut self, html: &str) -> Vec<Block> {
        if html.trim().is_empty() {
            return Vec::new();
        }
        let tokens = HtmlTokens::parse(html);
        debug!("{} html tokens", tokens.len());
        Engine::new(self.document, self.fetcher.as_ref(), &self.options, tokens).run()
    }

    /// Converts `html` and appends the blocks to the document body.
    pub fn parse_html(&mut self, html: &str) {
        let blocks = self.convert(html);
        info!("appending {} blocks to the body", blocks.len());
        self.document.append_blocks(blocks);
    }

    /// Reloads the style catalog, e.g. after the styles part was edited.
    pub fn refresh_styles(&mut self) -> Result<()> {
        self.document.refresh_styles()
    }
}

/// State of one conversion call.
struct Engine<'a> {
    doc: &'a mut Document,
    fetcher: &'a dyn Fetch,
    options: &'a ConverterOptions,
    tokens: HtmlTokens,
    runs: StyleCascade<RunFragment>,
    paragraphs: StyleCascade<ParagraphFragment>,
    tables: TableCascade,
    table_ctx: TableContext,
    images: ImagePipeline,
    /// Created with the first list or numbered heading.
    numbering: Option<NumberingAllocator>,
    /// Inline content of the paragraph being built.
    pending: Vec<Inline>,
    /// Properties of the next emitted paragraph; list items park their
    /// numbering here until their first paragraph is flushed.
    paragraph: ParagraphProperties,
    /// Table depth at which `paragraph` was set.
    paragraph_depth: usize,
    blocks: Vec<Block>,
    /// Open `<pre>` elements.
    preformatted: u32,
    /// Run cascade depth at which each open `page-break-after` container
    /// was opened.
    breaks_after: Vec<usize>,
    default_paragraph_style: Option<String>,
}

impl<'a> Engine<'a> {
    fn new(
        doc: &'a mut Document,
        fetcher: &'a dyn Fetch,
        options: &'a ConverterOptions,
        tokens: HtmlTokens,
    ) -> Self {
        let default_paragraph_style = options
            .default_styles
            .paragraph
            .as_deref()
            .map(|name| doc.style_id(name, StyleFamily::Paragraph));
        Self {
            doc,
            fetcher,
            options,
            tokens,
            runs: StyleCascade::default(),
            paragraphs: StyleCascade::default(),
            tables: TableCascade::default(),
            table_ctx: TableContext::default(),
            images: ImagePipeline::new(options.base_image_url.clone()),
            numbering: None,
            pending: Vec::new(),
            paragraph: ParagraphProperties::default(),
            paragraph_depth: 0,
            blocks: Vec::new(),
            preformatted: 0,
            breaks_after: Vec::new(),
            default_paragraph_style,
        }
    }

    fn run(mut self) -> Vec<Block> {
        while self.tokens.move_next() {
            self.process_token();
        }
        while self.table_ctx.has_context() {
            self.close_table();
        }
        self.flush();
        tidy_blocks(&mut self.blocks);
        self.blocks
    }

    fn process_token(&mut self) {
        match self.tokens.kind() {
            Some(TokenKind::Text) => self.process_text(),
            Some(TokenKind::Open) => {
                let tag = TagKind::from_name(self.tokens.tag_name());
                self.open_tag(tag);
            }
            Some(TokenKind::Close) => {
                let tag = TagKind::from_name(self.tokens.tag_name());
                self.close_tag(tag);
            }
            None => {}
        }
    }

    /// Processes the tokens up to the close tag `end_tag` into a fresh inline
    /// buffer and returns it. The close tag is consumed.
    fn sub_convert(&mut self, end_tag: &str) -> Vec<Inline> {
        if self.tokens.is_self_closing() {
            return Vec::new();
        }
        let outer = std::mem::take(&mut self.pending);
        while self.tokens.move_next() {
            if self.tokens.kind() == Some(TokenKind::Close) && self.tokens.tag_name() == end_tag {
                break;
            }
            self.process_token();
        }
        std::mem::replace(&mut self.pending, outer)
    }

    fn process_text(&mut self) {
        let Some(text) = self.tokens.text().map(str::to_string) else {
            return;
        };
        if self.preformatted > 0 {
            let text = text.replace("\r\n", "\n");
            for (i, line) in text.split(['\n', '\r']).enumerate() {
                if i > 0 {
                    self.push_run(RunContent::Break);
                }
                if !line.is_empty() {
                    self.push_run(RunContent::Text(line.to_string()));
                }
            }
            return;
        }
        let mut text = collapse_whitespace(&text);
        if self.at_line_start() {
            text = text.trim_start_matches(' ').to_string();
        }
        if !text.is_empty() {
            self.push_run(RunContent::Text(text));
        }
    }

    /// True when leading whitespace of new text would be redundant.
    fn at_line_start(&self) -> bool {
        match self.pending.last() {
            None => true,
            Some(Inline::Run(run)) => match run.content.last() {
                Some(RunContent::Text(t)) => t.ends_with(' '),
                Some(RunContent::Break) => true,
                _ => false,
            },
            Some(_) => false,
        }
    }

    fn ends_with_break(&self) -> bool {
        matches!(
            self.pending.last(),
            Some(Inline::Run(run)) if matches!(run.content.last(), Some(RunContent::Break))
        )
    }

    /// A run carrying the formatting of the open tags.
    fn new_run(&self, content: RunContent) -> Run {
        let mut run = Run::new(content);
        self.runs.apply_tags(&mut run.props);
        run
    }

    fn push_run(&mut self, content: RunContent) {
        let run = self.new_run(content);
        self.pending.push(run.into());
    }

    /// Closes the paragraph being built; nothing is emitted when it has no
    /// content. Every block-level emission goes through here first so the
    /// inline content keeps its place in document order.
    fn flush(&mut self) {
        let mut children = std::mem::take(&mut self.pending);
        if self.preformatted == 0 {
            trim_trailing_space(&mut children);
        }
        if children.is_empty() {
            return;
        }
        let props = self.take_paragraph_props();
        let paragraph = self.finish_paragraph(Paragraph { props, children });
        self.add_block(paragraph.into());
    }

    /// Parked paragraph properties. Paragraphs inside a table opened after
    /// they were set do not take them.
    fn take_paragraph_props(&mut self) -> ParagraphProperties {
        if self.table_ctx.depth() == self.paragraph_depth {
            std::mem::take(&mut self.paragraph)
        } else {
            ParagraphProperties::default()
        }
    }

    /// Applies the open paragraph frames and the default paragraph style.
    fn finish_paragraph(&self, mut paragraph: Paragraph) -> Paragraph {
        self.paragraphs.apply_tags(&mut paragraph.props);
        if paragraph.props.style.is_none() {
            paragraph.props.style = self.default_paragraph_style.clone();
        }
        paragraph
    }

    /// Appends to the current table cell, or to the output when no table is open.
    fn add_block(&mut self, block: Block) {
        match self.table_ctx.current_cell() {
            Some(cell) => cell.content.push(block),
            None => self.blocks.push(block),
        }
    }

    fn last_block(&mut self) -> Option<&Block> {
        if self.table_ctx.has_context() {
            self.table_ctx.current_cell().and_then(|c| c.content.last())
        } else {
            self.blocks.last()
        }
    }

    fn in_list(&self) -> bool {
        self.numbering
            .as_ref()
            .is_some_and(NumberingAllocator::in_list)
    }

    /// The allocator together with the store it allocates into.
    fn lists(&mut self) -> (&mut NumberingAllocator, &mut NumberingStore) {
        let store = self.doc.numbering_mut();
        let numbering = self
            .numbering
            .get_or_insert_with(|| NumberingAllocator::new(&mut *store));
        (numbering, store)
    }
}

/// Collapses every run of ASCII whitespace to a single space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if matches!(ch, ' ' | '\t' | '\n' | '\r' | '\x0C') {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Drops trailing collapsed spaces and line breaks of a paragraph.
fn trim_trailing_space(children: &mut Vec<Inline>) {
    while let Some(Inline::Run(run)) = children.last_mut() {
        match run.content.last_mut() {
            Some(RunContent::Text(text)) => {
                let len = text.trim_end_matches(' ').len();
                if len > 0 {
                    text.truncate(len);
                    return;
                }
                run.content.pop();
            }
            Some(RunContent::Break) => {
                run.content.pop();
            }
            _ => return,
        }
        if !run.content.is_empty() {
            return;
        }
        children.pop();
    }
}

fn is_empty_paragraph(block: &Block) -> bool {
    matches!(block, Block::Paragraph(p) if !p.has_content())
}

/// Drops paragraphs without content, except a single one separating two
/// adjacent tables; one is added where two tables touch.
fn tidy_blocks(blocks: &mut Vec<Block>) {
    let mut out: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks.drain(..) {
        if is_empty_paragraph(&block) {
            if out.last().is_some_and(Block::is_table) {
                out.push(block);
            }
            continue;
        }
        let mut separator = None;
        while out.last().is_some_and(is_empty_paragraph) {
            separator = out.pop();
        }
        if block.is_table() && out.last().is_some_and(Block::is_table) {
            out.push(separator.unwrap_or_else(|| Paragraph::default().into()));
        }
        out.push(block);
    }
    while out.last().is_some_and(is_empty_paragraph) {
        out.pop();
    }
    *blocks = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::tests::{CountingFetcher, PNG_1X1};
    use crate::model::{NoteKind, Table};
    use crate::fetch::Resource;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    pub(super) fn offline() -> CountingFetcher {
        CountingFetcher {
            calls: Cell::new(0),
            resource: None,
        }
    }

    pub(super) fn png_fetcher() -> CountingFetcher {
        CountingFetcher {
            calls: Cell::new(0),
            resource: Some(Resource {
                bytes: PNG_1X1.to_vec(),
                content_type: None,
            }),
        }
    }

    pub(super) fn convert_with(
        doc: &mut Document,
        fetcher: &CountingFetcher,
        options: ConverterOptions,
        html: &str,
    ) -> Vec<Block> {
        let mut converter = HtmlConverter::with_fetcher(doc, Box::new(fetcher)).with_options(options);
        converter.convert(html)
    }

    pub(super) fn convert(html: &str) -> (Document, Vec<Block>) {
        let mut doc = Document::new();
        let blocks = convert_with(&mut doc, &offline(), ConverterOptions::default(), html);
        (doc, blocks)
    }

    pub(super) fn paragraph(block: &Block) -> &Paragraph {
        block.as_paragraph().expect("paragraph")
    }

    pub(super) fn table(block: &Block) -> &Table {
        block.as_table().expect("table")
    }

    pub(super) fn texts(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .filter_map(Block::as_paragraph)
            .map(Paragraph::inner_text)
            .collect()
    }

    #[test]
    fn test_bold_scenario() {
        let (_, blocks) = convert("<b>Bold</b>");
        assert_eq!(blocks.len(), 1);
        let p = paragraph(&blocks[0]);
        let runs: Vec<&Run> = p.runs().collect();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].props.bold);
        assert_eq!(runs[0].content, vec![RunContent::Text("Bold".into())]);
    }

    #[test]
    fn test_tags_are_case_insensitive() {
        let (_, blocks) = convert("<B>Bold</B> <EM>it</EM>");
        let p = paragraph(&blocks[0]);
        let runs: Vec<&Run> = p.runs().collect();
        assert!(runs[0].props.bold);
        assert!(runs[2].props.italic);
    }

    #[test]
    fn test_line_break_scenario() {
        let (_, blocks) = convert("Lorem<br/>Ipsum");
        assert_eq!(blocks.len(), 1);
        let p = paragraph(&blocks[0]);
        assert_eq!(p.children.len(), 3);
        assert_eq!(p.children[0], Inline::Run(Run::text("Lorem")));
        assert_eq!(p.children[1], Inline::Run(Run::new(RunContent::Break)));
        assert_eq!(p.children[2], Inline::Run(Run::text("Ipsum")));
    }

    #[test]
    fn test_empty_input() {
        for html in ["", "   \n\t ", "<p> </p>", "<div>\n</div>"] {
            let (_, blocks) = convert(html);
            assert!(blocks.is_empty(), "{html:?}");
        }
    }

    #[test]
    fn test_whitespace_collapses() {
        let (_, blocks) = convert("<p>  Hello \n\n  <i>big</i>   world  </p>");
        assert_eq!(texts(&blocks), vec!["Hello big world"]);
    }

    #[test]
    fn test_pre_keeps_spaces_and_breaks_lines() {
        let (_, blocks) = convert("<pre>a  b\nc</pre>");
        let p = paragraph(&blocks[0]);
        assert_eq!(
            p.children,
            vec![
                Run::text("a  b").into(),
                Run::new(RunContent::Break).into(),
                Run::text("c").into(),
            ]
        );
    }

    #[test]
    fn test_paragraphs_follow_document_order() {
        let (_, blocks) = convert("intro<p>one</p>tail<h1>Title</h1>");
        assert_eq!(texts(&blocks), vec!["intro", "one", "tail", "Title"]);
    }

    #[test]
    fn test_failed_image_leaves_other_content() {
        let mut doc = Document::new();
        let fetcher = offline();
        let blocks = convert_with(
            &mut doc,
            &fetcher,
            ConverterOptions::default(),
            "<p>before <img src='http://example.com/a.png'> after</p><p>next</p>",
        );
        assert_eq!(fetcher.calls.get(), 1);
        assert_eq!(texts(&blocks), vec!["before after", "next"]);
        let has_drawing = blocks
            .iter()
            .filter_map(Block::as_paragraph)
            .flat_map(Paragraph::runs)
            .any(Run::has_drawing);
        assert!(!has_drawing);
    }

    #[test]
    fn test_image_is_fetched_once() {
        let mut doc = Document::new();
        let fetcher = png_fetcher();
        let blocks = convert_with(
            &mut doc,
            &fetcher,
            ConverterOptions::default(),
            "<img src='a.png' width='20'><img src='a.png' alt='again'>",
        );
        assert_eq!(fetcher.calls.get(), 1);
        let drawings: Vec<_> = paragraph(&blocks[0])
            .runs()
            .flat_map(|r| r.content.iter())
            .filter_map(|c| match c {
                RunContent::Drawing(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(drawings.len(), 2);
        assert_eq!(drawings[0].rel_id, drawings[1].rel_id);
        assert_eq!(drawings[0].width_emu, 20 * 9525);
        assert_eq!(drawings[0].height_emu, 20 * 9525);
        assert_eq!(drawings[1].width_emu, 9525);
        assert_eq!(drawings[1].description, "again");
        assert_ne!(drawings[0].doc_pr_id, drawings[1].doc_pr_id);
    }

    #[test]
    fn test_parse_html_keeps_section_last() {
        let mut doc = Document::new();
        let fetcher = offline();
        {
            let mut converter = HtmlConverter::with_fetcher(&mut doc, Box::new(&fetcher));
            converter.parse_html("<p>first</p>");
            converter.parse_html("<p>second</p>");
        }
        assert_eq!(doc.blocks().len(), 2);
        let body = doc.body_xml();
        assert!(body.trim_end().ends_with("</w:sectPr>"));
        assert!(body.find("first").unwrap() < body.find("second").unwrap());
    }

    #[test]
    fn test_footnote_for_abbreviation() {
        let (doc, blocks) = convert("<abbr title='HyperText Markup Language'>HTML</abbr> rocks");
        let p = paragraph(&blocks[0]);
        let reference = p
            .runs()
            .flat_map(|r| r.content.iter())
            .find_map(|c| match c {
                RunContent::NoteReference(kind, id) => Some((*kind, *id)),
                _ => None,
            });
        assert_eq!(reference, Some((NoteKind::Footnote, 1)));
        let notes = doc.notes_xml(NoteKind::Footnote).unwrap();
        assert!(notes.contains("HyperText Markup Language"));
        assert_eq!(p.inner_text(), "HTML rocks");
    }

    #[test]
    fn test_tidy_keeps_separator_between_tables() {
        let mut blocks: Vec<Block> = vec![
            Paragraph::default().into(),
            Block::Table(Table::default()),
            Block::Table(Table::default()),
            Paragraph::default().into(),
            Paragraph::new(vec![Run::text("x").into()]).into(),
            Paragraph::default().into(),
        ];
        tidy_blocks(&mut blocks);
        assert_eq!(blocks.len(), 4);
        assert!(blocks[0].is_table());
        assert!(is_empty_paragraph(&blocks[1]));
        assert!(blocks[2].is_table());
        assert_eq!(paragraph(&blocks[3]).inner_text(), "x");
    }

    #[test]
    fn test_trailing_space_and_break_trimmed() {
        let mut children: Vec<Inline> = vec![
            Run::text("a ").into(),
            Run::new(RunContent::Break).into(),
            Run::text(" ").into(),
        ];
        trim_trailing_space(&mut children);
        assert_eq!(children, vec![Inline::Run(Run::text("a"))]);
    }

    #[test]
    fn test_default_paragraph_style_option() {
        let mut doc = Document::new();
        let mut options = ConverterOptions::default();
        options.default_styles.paragraph = Some("Quote".into());
        let blocks = convert_with(&mut doc, &offline(), options, "<p>x</p><h2>y</h2>");
        assert_eq!(paragraph(&blocks[0]).props.style.as_deref(), Some("Quote"));
        assert_eq!(paragraph(&blocks[1]).props.style.as_deref(), Some("Heading2"));
    }
}
