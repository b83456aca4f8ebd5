//! Output tree of the conversion: paragraphs, runs and tables ready to be
//! serialized as WordprocessingML.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justification {
    Left,
    Center,
    Right,
    Both,
}

impl Justification {
    pub fn as_str(self) -> &'static str {
        match self {
            Justification::Left => "left",
            Justification::Center => "center",
            Justification::Right => "right",
            Justification::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
}

impl VerticalAlign {
    pub fn as_str(self) -> &'static str {
        match self {
            VerticalAlign::Top => "top",
            VerticalAlign::Center => "center",
            VerticalAlign::Bottom => "bottom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalPosition {
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderStyle {
    None,
    Single,
    Dotted,
    Dashed,
    Double,
    ThreeDEngrave,
    ThreeDEmboss,
    Inset,
    Outset,
}

impl BorderStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            BorderStyle::None => "none",
            BorderStyle::Single => "single",
            BorderStyle::Dotted => "dotted",
            BorderStyle::Dashed => "dashed",
            BorderStyle::Double => "double",
            BorderStyle::ThreeDEngrave => "threeDEngrave",
            BorderStyle::ThreeDEmboss => "threeDEmboss",
            BorderStyle::Inset => "inset",
            BorderStyle::Outset => "outset",
        }
    }
}

/// One border line; `size` is in eighths of a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderLine {
    pub style: BorderStyle,
    pub size: Option<u32>,
    pub color: Option<String>,
}

impl BorderLine {
    pub fn new(style: BorderStyle) -> Self {
        Self {
            style,
            size: None,
            color: None,
        }
    }

    pub fn sized(style: BorderStyle, size: u32) -> Self {
        Self {
            style,
            size: Some(size),
            color: None,
        }
    }

    pub fn none() -> Self {
        Self::new(BorderStyle::None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Borders {
    pub top: Option<BorderLine>,
    pub left: Option<BorderLine>,
    pub bottom: Option<BorderLine>,
    pub right: Option<BorderLine>,
    pub inside_h: Option<BorderLine>,
    pub inside_v: Option<BorderLine>,
}

impl Borders {
    pub fn is_empty(&self) -> bool {
        *self == Borders::default()
    }

    pub fn all(line: BorderLine) -> Self {
        Self {
            top: Some(line.clone()),
            left: Some(line.clone()),
            bottom: Some(line.clone()),
            right: Some(line.clone()),
            inside_h: Some(line.clone()),
            inside_v: Some(line),
        }
    }
}

/// Clear shading with a fill color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shading {
    pub fill: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProperties {
    pub style: Option<String>,
    pub fonts: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub small_caps: bool,
    pub strike: bool,
    pub underline: bool,
    pub color: Option<String>,
    /// Half-points.
    pub size: Option<u32>,
    pub shading: Option<Shading>,
    pub vertical_align: Option<VerticalPosition>,
    pub border: Option<BorderLine>,
}

impl RunProperties {
    pub fn is_empty(&self) -> bool {
        *self == RunProperties::default()
    }

    pub fn styled(style: impl Into<String>) -> Self {
        Self {
            style: Some(style.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Footnote,
    Endnote,
}

/// Click action of an image nested in a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClick {
    pub rel_id: String,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawing {
    pub rel_id: String,
    pub width_emu: i64,
    pub height_emu: i64,
    pub doc_pr_id: u32,
    pub picture_id: u32,
    pub name: String,
    pub description: String,
    pub link_click: Option<LinkClick>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunContent {
    Text(String),
    Break,
    PageBreak,
    LastRenderedPageBreak,
    NoteReference(NoteKind, i32),
    NoteReferenceMark(NoteKind),
    SeparatorMark,
    ContinuationSeparatorMark,
    FieldBegin,
    FieldCode(String),
    FieldEnd,
    Drawing(Drawing),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Run {
    pub props: RunProperties,
    pub content: Vec<RunContent>,
}

impl Run {
    pub fn new(content: RunContent) -> Self {
        Self {
            props: RunProperties::default(),
            content: vec![content],
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(RunContent::Text(text.into()))
    }

    pub fn with_props(props: RunProperties, content: RunContent) -> Self {
        Self {
            props,
            content: vec![content],
        }
    }

    pub fn has_drawing(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, RunContent::Drawing(_)))
    }

    pub fn inner_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                RunContent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hyperlink {
    pub rel_id: Option<String>,
    pub anchor: Option<String>,
    pub tooltip: Option<String>,
    pub children: Vec<Inline>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleField {
    pub instruction: String,
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Run(Run),
    Hyperlink(Hyperlink),
    SimpleField(SimpleField),
}

impl Inline {
    pub fn as_run(&self) -> Option<&Run> {
        match self {
            Inline::Run(r) => Some(r),
            _ => None,
        }
    }

    pub fn inner_text(&self) -> String {
        match self {
            Inline::Run(r) => r.inner_text(),
            Inline::Hyperlink(h) => h.children.iter().map(Inline::inner_text).collect(),
            Inline::SimpleField(f) => f.runs.iter().map(Run::inner_text).collect(),
        }
    }
}

impl From<Run> for Inline {
    fn from(run: Run) -> Self {
        Inline::Run(run)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indentation {
    pub left: Option<i64>,
    pub right: Option<i64>,
    pub first_line: Option<i64>,
    pub hanging: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spacing {
    pub before: Option<u32>,
    pub after: Option<u32>,
    /// Line spacing in 240ths of a line.
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberingRef {
    pub level: u32,
    pub num_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphProperties {
    pub style: Option<String>,
    pub keep_next: bool,
    pub numbering: Option<NumberingRef>,
    pub borders: Option<Borders>,
    pub spacing: Option<Spacing>,
    pub indentation: Option<Indentation>,
    pub justification: Option<Justification>,
}

impl ParagraphProperties {
    pub fn is_empty(&self) -> bool {
        *self == ParagraphProperties::default()
    }

    pub fn styled(style: impl Into<String>) -> Self {
        Self {
            style: Some(style.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub props: ParagraphProperties,
    pub children: Vec<Inline>,
}

impl Paragraph {
    pub fn new(children: Vec<Inline>) -> Self {
        Self {
            props: ParagraphProperties::default(),
            children,
        }
    }

    pub fn with_props(props: ParagraphProperties) -> Self {
        Self {
            props,
            children: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.children.iter().filter_map(Inline::as_run)
    }

    pub fn inner_text(&self) -> String {
        self.children.iter().map(Inline::inner_text).collect()
    }
}

/// Width of a table or a cell; `Pct` is in fiftieths of a percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableWidth {
    Auto(i64),
    Dxa(i64),
    Pct(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellMargins {
    pub top: Option<TableWidth>,
    pub left: Option<TableWidth>,
    pub bottom: Option<TableWidth>,
    pub right: Option<TableWidth>,
}

impl CellMargins {
    pub fn is_empty(&self) -> bool {
        *self == CellMargins::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProperties {
    pub style: Option<String>,
    pub width: TableWidth,
    pub justification: Option<Justification>,
    pub borders: Option<Borders>,
    pub cell_spacing: Option<i64>,
    pub cell_margin: Option<CellMargins>,
}

impl Default for TableProperties {
    fn default() -> Self {
        Self {
            style: None,
            width: TableWidth::Auto(0),
            justification: None,
            borders: None,
            cell_spacing: None,
            cell_margin: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalMerge {
    Restart,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDirection {
    BottomToTopLeftToRight,
    TopToBottomRightToLeft,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCellProperties {
    pub width: Option<TableWidth>,
    pub grid_span: Option<u32>,
    pub v_merge: Option<VerticalMerge>,
    pub v_align: Option<VerticalAlign>,
    pub shading: Option<Shading>,
    pub borders: Option<Borders>,
    pub margins: Option<CellMargins>,
    pub text_direction: Option<TextDirection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCell {
    pub props: TableCellProperties,
    pub content: Vec<Block>,
}

impl TableCell {
    pub fn span(&self) -> u32 {
        self.props.grid_span.unwrap_or(1).max(1)
    }

    pub fn is_placeholder(&self) -> bool {
        self.props.v_merge == Some(VerticalMerge::Continue)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    /// Minimum height in twips.
    pub height: Option<u32>,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub props: TableProperties,
    /// One entry per grid column, with an optional width in twips.
    pub grid: Vec<Option<i64>>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

impl Block {
    pub fn as_paragraph(&self) -> Option<&Paragraph> {
        match self {
            Block::Paragraph(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Block::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Block::Table(_))
    }
}

impl From<Paragraph> for Block {
    fn from(p: Paragraph) -> Self {
        Block::Paragraph(p)
    }
}

/// Calls `f` on every paragraph of `blocks`, descending into table cells.
pub fn for_each_paragraph<'a>(blocks: &'a [Block], f: &mut impl FnMut(&'a Paragraph)) {
    for b in blocks {
        match b {
            Block::Paragraph(p) => f(p),
            Block::Table(t) => {
                for row in &t.rows {
                    for cell in &row.cells {
                        for_each_paragraph(&cell.content, f);
                    }
                }
            }
        }
    }
}
