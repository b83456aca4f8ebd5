//! WordprocessingML string builders for the output tree, plus the small
//! attribute readers shared by the part loaders.

use quick_xml::events::BytesStart;

use crate::model::{
    Block, BorderLine, Borders, CellMargins, Drawing, Hyperlink, Inline, NoteKind, Paragraph,
    ParagraphProperties, Run, RunContent, RunProperties, Shading, SimpleField, Table, TableCell,
    TableCellProperties, TableWidth, TextDirection, VerticalMerge, VerticalPosition,
};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters are not allowed in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            _ => out.push(ch),
        }
    }
    out
}

pub fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

pub fn attr_i64(e: &BytesStart<'_>, key: &[u8]) -> Option<i64> {
    attr_string(e, key).and_then(|v| v.trim().parse().ok())
}

fn width_attrs(width: TableWidth) -> String {
    match width {
        TableWidth::Auto(w) => format!(r#"w:w="{w}" w:type="auto""#),
        TableWidth::Dxa(w) => format!(r#"w:w="{w}" w:type="dxa""#),
        TableWidth::Pct(w) => format!(r#"w:w="{w}" w:type="pct""#),
    }
}

fn border_xml(out: &mut String, tag: &str, line: &BorderLine) {
    out.push_str(&format!(r#"<w:{tag} w:val="{}""#, line.style.as_str()));
    if let Some(size) = line.size {
        out.push_str(&format!(r#" w:sz="{size}""#));
    }
    out.push_str(r#" w:space="0""#);
    if let Some(color) = &line.color {
        out.push_str(&format!(r#" w:color="{}""#, xml_escape_text(color)));
    }
    out.push_str("/>");
}

/// Border sides in schema order; `inside` adds insideH/insideV for tables.
fn borders_xml(out: &mut String, container: &str, borders: &Borders, inside: bool) {
    out.push_str(&format!("<w:{container}>"));
    let mut sides = vec![
        ("top", &borders.top),
        ("left", &borders.left),
        ("bottom", &borders.bottom),
        ("right", &borders.right),
    ];
    if inside {
        sides.push(("insideH", &borders.inside_h));
        sides.push(("insideV", &borders.inside_v));
    }
    for (tag, line) in sides {
        if let Some(line) = line {
            border_xml(out, tag, line);
        }
    }
    out.push_str(&format!("</w:{container}>"));
}

fn shading_xml(out: &mut String, shading: &Shading) {
    out.push_str(r#"<w:shd w:val="clear""#);
    out.push_str(&format!(
        r#" w:color="{}""#,
        xml_escape_text(shading.color.as_deref().unwrap_or("auto"))
    ));
    out.push_str(&format!(r#" w:fill="{}"/>"#, xml_escape_text(&shading.fill)));
}

pub fn run_properties_xml(out: &mut String, props: &RunProperties) {
    if props.is_empty() {
        return;
    }
    out.push_str("<w:rPr>");
    if let Some(style) = &props.style {
        out.push_str(&format!(r#"<w:rStyle w:val="{}"/>"#, xml_escape_text(style)));
    }
    if let Some(font) = &props.fonts {
        let f = xml_escape_text(font);
        out.push_str(&format!(r#"<w:rFonts w:ascii="{f}" w:hAnsi="{f}"/>"#));
    }
    if props.bold {
        out.push_str("<w:b/>");
    }
    if props.italic {
        out.push_str("<w:i/>");
    }
    if props.small_caps {
        out.push_str("<w:smallCaps/>");
    }
    if props.strike {
        out.push_str("<w:strike/>");
    }
    if let Some(color) = &props.color {
        out.push_str(&format!(r#"<w:color w:val="{}"/>"#, xml_escape_text(color)));
    }
    if let Some(size) = props.size {
        out.push_str(&format!(r#"<w:sz w:val="{size}"/>"#));
    }
    if props.underline {
        out.push_str(r#"<w:u w:val="single"/>"#);
    }
    if let Some(border) = &props.border {
        border_xml(out, "bdr", border);
    }
    if let Some(shading) = &props.shading {
        shading_xml(out, shading);
    }
    if let Some(valign) = props.vertical_align {
        let v = match valign {
            VerticalPosition::Superscript => "superscript",
            VerticalPosition::Subscript => "subscript",
        };
        out.push_str(&format!(r#"<w:vertAlign w:val="{v}"/>"#));
    }
    out.push_str("</w:rPr>");
}

fn drawing_xml(out: &mut String, d: &Drawing) {
    let name = xml_escape_text(&d.name);
    let descr = xml_escape_text(&d.description);
    let click = d
        .link_click
        .as_ref()
        .map(|c| {
            let tooltip = c
                .tooltip
                .as_ref()
                .map(|t| format!(r#" tooltip="{}""#, xml_escape_text(t)))
                .unwrap_or_default();
            format!(
                r#"<a:hlinkClick xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" r:id="{}"{tooltip}/>"#,
                xml_escape_text(&c.rel_id)
            )
        })
        .unwrap_or_default();
    out.push_str(&format!(
        r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="19050" t="0" r="0" b="0"/><wp:docPr id="{doc_id}" name="Picture {pic_id}" descr="">{click}</wp:docPr><wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="{pic_id}" name="{name}" descr="{descr}"/><pic:cNvPicPr><a:picLocks noChangeAspect="1" noChangeArrowheads="1"/></pic:cNvPicPr></pic:nvPicPr><pic:blipFill><a:blip r:embed="{rel}"/><a:srcRect/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr bwMode="auto"><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#,
        cx = d.width_emu,
        cy = d.height_emu,
        doc_id = d.doc_pr_id,
        pic_id = d.picture_id,
        rel = xml_escape_text(&d.rel_id),
    ));
}

pub fn run_xml(out: &mut String, run: &Run) {
    out.push_str("<w:r>");
    run_properties_xml(out, &run.props);
    for c in &run.content {
        match c {
            RunContent::Text(t) => {
                out.push_str(r#"<w:t xml:space="preserve">"#);
                out.push_str(&xml_escape_text(t));
                out.push_str("</w:t>");
            }
            RunContent::Break => out.push_str("<w:br/>"),
            RunContent::PageBreak => out.push_str(r#"<w:br w:type="page"/>"#),
            RunContent::LastRenderedPageBreak => out.push_str("<w:lastRenderedPageBreak/>"),
            RunContent::NoteReference(NoteKind::Footnote, id) => {
                out.push_str(&format!(r#"<w:footnoteReference w:id="{id}"/>"#))
            }
            RunContent::NoteReference(NoteKind::Endnote, id) => {
                out.push_str(&format!(r#"<w:endnoteReference w:id="{id}"/>"#))
            }
            RunContent::NoteReferenceMark(NoteKind::Footnote) => out.push_str("<w:footnoteRef/>"),
            RunContent::NoteReferenceMark(NoteKind::Endnote) => out.push_str("<w:endnoteRef/>"),
            RunContent::SeparatorMark => out.push_str("<w:separator/>"),
            RunContent::ContinuationSeparatorMark => out.push_str("<w:continuationSeparator/>"),
            RunContent::FieldBegin => out.push_str(r#"<w:fldChar w:fldCharType="begin"/>"#),
            RunContent::FieldCode(code) => {
                out.push_str(r#"<w:instrText xml:space="preserve">"#);
                out.push_str(&xml_escape_text(code));
                out.push_str("</w:instrText>");
            }
            RunContent::FieldEnd => out.push_str(r#"<w:fldChar w:fldCharType="end"/>"#),
            RunContent::Drawing(d) => drawing_xml(out, d),
        }
    }
    out.push_str("</w:r>");
}

fn hyperlink_xml(out: &mut String, h: &Hyperlink) {
    out.push_str("<w:hyperlink");
    if let Some(id) = &h.rel_id {
        out.push_str(&format!(r#" r:id="{}""#, xml_escape_text(id)));
    }
    if let Some(anchor) = &h.anchor {
        out.push_str(&format!(r#" w:anchor="{}""#, xml_escape_text(anchor)));
    }
    if let Some(tooltip) = &h.tooltip {
        out.push_str(&format!(r#" w:tooltip="{}""#, xml_escape_text(tooltip)));
    }
    out.push_str(r#" w:history="1">"#);
    for child in &h.children {
        inline_xml(out, child);
    }
    out.push_str("</w:hyperlink>");
}

fn simple_field_xml(out: &mut String, f: &SimpleField) {
    out.push_str(&format!(
        r#"<w:fldSimple w:instr="{}">"#,
        xml_escape_text(&f.instruction)
    ));
    for r in &f.runs {
        run_xml(out, r);
    }
    out.push_str("</w:fldSimple>");
}

pub fn inline_xml(out: &mut String, inline: &Inline) {
    match inline {
        Inline::Run(r) => run_xml(out, r),
        Inline::Hyperlink(h) => hyperlink_xml(out, h),
        Inline::SimpleField(f) => simple_field_xml(out, f),
    }
}

pub fn paragraph_properties_xml(out: &mut String, props: &ParagraphProperties) {
    if props.is_empty() {
        return;
    }
    out.push_str("<w:pPr>");
    if let Some(style) = &props.style {
        out.push_str(&format!(r#"<w:pStyle w:val="{}"/>"#, xml_escape_text(style)));
    }
    if props.keep_next {
        out.push_str("<w:keepNext/>");
    }
    if let Some(num) = &props.numbering {
        out.push_str(&format!(
            r#"<w:numPr><w:ilvl w:val="{}"/><w:numId w:val="{}"/></w:numPr>"#,
            num.level, num.num_id
        ));
    }
    if let Some(borders) = &props.borders {
        borders_xml(out, "pBdr", borders, false);
    }
    if let Some(spacing) = &props.spacing {
        out.push_str("<w:spacing");
        if let Some(b) = spacing.before {
            out.push_str(&format!(r#" w:before="{b}""#));
        }
        if let Some(a) = spacing.after {
            out.push_str(&format!(r#" w:after="{a}""#));
        }
        if let Some(l) = spacing.line {
            out.push_str(&format!(r#" w:line="{l}" w:lineRule="auto""#));
        }
        out.push_str("/>");
    }
    if let Some(ind) = &props.indentation {
        out.push_str("<w:ind");
        if let Some(v) = ind.left {
            out.push_str(&format!(r#" w:left="{v}""#));
        }
        if let Some(v) = ind.right {
            out.push_str(&format!(r#" w:right="{v}""#));
        }
        if let Some(v) = ind.first_line {
            out.push_str(&format!(r#" w:firstLine="{v}""#));
        }
        if let Some(v) = ind.hanging {
            out.push_str(&format!(r#" w:hanging="{v}""#));
        }
        out.push_str("/>");
    }
    if let Some(jc) = props.justification {
        out.push_str(&format!(r#"<w:jc w:val="{}"/>"#, jc.as_str()));
    }
    out.push_str("</w:pPr>");
}

pub fn paragraph_xml(out: &mut String, p: &Paragraph) {
    out.push_str("<w:p>");
    paragraph_properties_xml(out, &p.props);
    for child in &p.children {
        inline_xml(out, child);
    }
    out.push_str("</w:p>");
}

fn cell_margins_xml(out: &mut String, container: &str, m: &CellMargins) {
    out.push_str(&format!("<w:{container}>"));
    for (tag, side) in [
        ("top", m.top),
        ("left", m.left),
        ("bottom", m.bottom),
        ("right", m.right),
    ] {
        if let Some(w) = side {
            out.push_str(&format!("<w:{tag} {}/>", width_attrs(w)));
        }
    }
    out.push_str(&format!("</w:{container}>"));
}

fn cell_properties_xml(out: &mut String, props: &TableCellProperties) {
    if *props == TableCellProperties::default() {
        return;
    }
    out.push_str("<w:tcPr>");
    if let Some(w) = props.width {
        out.push_str(&format!("<w:tcW {}/>", width_attrs(w)));
    }
    if let Some(span) = props.grid_span {
        out.push_str(&format!(r#"<w:gridSpan w:val="{span}"/>"#));
    }
    match props.v_merge {
        Some(VerticalMerge::Restart) => out.push_str(r#"<w:vMerge w:val="restart"/>"#),
        Some(VerticalMerge::Continue) => out.push_str("<w:vMerge/>"),
        None => {}
    }
    if let Some(borders) = &props.borders {
        borders_xml(out, "tcBorders", borders, false);
    }
    if let Some(shading) = &props.shading {
        shading_xml(out, shading);
    }
    if let Some(m) = &props.margins {
        cell_margins_xml(out, "tcMar", m);
    }
    if let Some(dir) = props.text_direction {
        let v = match dir {
            TextDirection::BottomToTopLeftToRight => "btLr",
            TextDirection::TopToBottomRightToLeft => "tbRl",
        };
        out.push_str(&format!(r#"<w:textDirection w:val="{v}"/>"#));
    }
    if let Some(v) = props.v_align {
        out.push_str(&format!(r#"<w:vAlign w:val="{}"/>"#, v.as_str()));
    }
    out.push_str("</w:tcPr>");
}

fn cell_xml(out: &mut String, cell: &TableCell) {
    out.push_str("<w:tc>");
    cell_properties_xml(out, &cell.props);
    for b in &cell.content {
        block_xml(out, b);
    }
    // A cell must end with a paragraph.
    if !matches!(cell.content.last(), Some(Block::Paragraph(_))) {
        out.push_str("<w:p/>");
    }
    out.push_str("</w:tc>");
}

pub fn table_xml(out: &mut String, t: &Table) {
    out.push_str("<w:tbl><w:tblPr>");
    if let Some(style) = &t.props.style {
        out.push_str(&format!(r#"<w:tblStyle w:val="{}"/>"#, xml_escape_text(style)));
    }
    out.push_str(&format!("<w:tblW {}/>", width_attrs(t.props.width)));
    if let Some(jc) = t.props.justification {
        out.push_str(&format!(r#"<w:jc w:val="{}"/>"#, jc.as_str()));
    }
    if let Some(spacing) = t.props.cell_spacing {
        out.push_str(&format!(r#"<w:tblCellSpacing w:w="{spacing}" w:type="dxa"/>"#));
    }
    if let Some(borders) = &t.props.borders {
        borders_xml(out, "tblBorders", borders, true);
    }
    if let Some(m) = &t.props.cell_margin {
        cell_margins_xml(out, "tblCellMar", m);
    }
    out.push_str("</w:tblPr><w:tblGrid>");
    for col in &t.grid {
        match col {
            Some(w) => out.push_str(&format!(r#"<w:gridCol w:w="{w}"/>"#)),
            None => out.push_str("<w:gridCol/>"),
        }
    }
    out.push_str("</w:tblGrid>");
    for row in &t.rows {
        out.push_str("<w:tr>");
        if let Some(h) = row.height {
            out.push_str(&format!(
                r#"<w:trPr><w:trHeight w:val="{h}" w:hRule="atLeast"/></w:trPr>"#
            ));
        }
        for cell in &row.cells {
            cell_xml(out, cell);
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
}

pub fn block_xml(out: &mut String, block: &Block) {
    match block {
        Block::Paragraph(p) => paragraph_xml(out, p),
        Block::Table(t) => table_xml(out, t),
    }
}

pub fn blocks_xml(blocks: &[Block]) -> String {
    let mut out = String::new();
    for b in blocks {
        block_xml(&mut out, b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Justification, NumberingRef, TableRow};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape() {
        assert_eq!(xml_escape_text("a<b & \"c\"\u{1}"), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_paragraph_with_bold_run() {
        let mut run = Run::text("Bold");
        run.props.bold = true;
        let mut p = Paragraph::new(vec![run.into()]);
        p.props.justification = Some(Justification::Center);
        p.props.numbering = Some(NumberingRef { level: 0, num_id: 3 });
        let mut out = String::new();
        paragraph_xml(&mut out, &p);
        assert_eq!(
            out,
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Bold</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_table_cell_ends_with_paragraph() {
        let table = Table {
            grid: vec![None],
            rows: vec![TableRow {
                height: None,
                cells: vec![TableCell::default()],
            }],
            ..Default::default()
        };
        let mut out = String::new();
        table_xml(&mut out, &table);
        assert!(out.contains("<w:tblW w:w=\"0\" w:type=\"auto\"/>"));
        assert!(out.contains("<w:tc><w:p/></w:tc>"));
        assert!(out.contains("<w:gridCol/>"));
    }
}
