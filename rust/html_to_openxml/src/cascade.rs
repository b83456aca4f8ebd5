//! Per-scope style stacks. Each open tag pushes a frame of fragments; the
//! top frame of every still-open tag is applied to new elements.

use crate::model::{
    BorderLine, Borders, Indentation, Justification, ParagraphProperties, RunProperties, Shading,
    Spacing, TableCellProperties, VerticalAlign, VerticalPosition,
};

/// One formatting directive contributed by an open tag.
pub trait Fragment: Clone {
    type Target;

    /// Sets the property on `target` unless it already holds a value.
    fn apply(&self, target: &mut Self::Target);
}

#[derive(Debug, Clone)]
struct Frame<F> {
    tag: String,
    fragments: Vec<F>,
}

#[derive(Debug, Clone)]
pub struct StyleCascade<F> {
    frames: Vec<Frame<F>>,
}

impl<F> Default for StyleCascade<F> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<F: Fragment> StyleCascade<F> {
    pub fn begin_tag(&mut self, tag: &str, fragments: Vec<F>) {
        self.frames.push(Frame {
            tag: tag.to_string(),
            fragments,
        });
    }

    /// Like `begin_tag`, but the new frame also carries the fragments of the
    /// innermost open frame of the same tag.
    pub fn merge_tag(&mut self, tag: &str, mut fragments: Vec<F>) {
        if let Some(frame) = self.frames.iter().rev().find(|f| f.tag == tag) {
            fragments.extend(frame.fragments.iter().cloned());
        }
        self.begin_tag(tag, fragments);
    }

    /// Pops the innermost frame of `tag`. Returns false when none is open.
    pub fn end_tag(&mut self, tag: &str) -> bool {
        match self.frames.iter().rposition(|f| f.tag == tag) {
            Some(idx) => {
                self.frames.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Applies the top frame of each open tag, innermost first.
    pub fn apply_tags(&self, target: &mut F::Target) {
        let mut seen: Vec<&str> = Vec::new();
        for frame in self.frames.iter().rev() {
            if seen.contains(&frame.tag.as_str()) {
                continue;
            }
            seen.push(&frame.tag);
            for fragment in &frame.fragments {
                fragment.apply(target);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFragment {
    Bold,
    Italic,
    SmallCaps,
    Strike,
    Underline,
    Color(String),
    /// Half-points.
    Size(u32),
    Fonts(String),
    Shading(String),
    VerticalAlign(VerticalPosition),
    Style(String),
    Border(BorderLine),
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &T) {
    if slot.is_none() {
        *slot = Some(value.clone());
    }
}

impl Fragment for RunFragment {
    type Target = RunProperties;

    fn apply(&self, p: &mut RunProperties) {
        match self {
            RunFragment::Bold => p.bold = true,
            RunFragment::Italic => p.italic = true,
            RunFragment::SmallCaps => p.small_caps = true,
            RunFragment::Strike => p.strike = true,
            RunFragment::Underline => p.underline = true,
            RunFragment::Color(c) => fill(&mut p.color, c),
            RunFragment::Size(s) => fill(&mut p.size, s),
            RunFragment::Fonts(f) => fill(&mut p.fonts, f),
            RunFragment::Shading(fill_color) => fill(
                &mut p.shading,
                &Shading {
                    fill: fill_color.clone(),
                    color: Some("auto".into()),
                },
            ),
            RunFragment::VerticalAlign(v) => fill(&mut p.vertical_align, v),
            RunFragment::Style(s) => fill(&mut p.style, s),
            RunFragment::Border(b) => fill(&mut p.border, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParagraphFragment {
    Style(String),
    Justification(Justification),
    KeepNext,
    Indentation(Indentation),
    Spacing(Spacing),
    Borders(Borders),
}

impl Fragment for ParagraphFragment {
    type Target = ParagraphProperties;

    fn apply(&self, p: &mut ParagraphProperties) {
        match self {
            ParagraphFragment::Style(s) => fill(&mut p.style, s),
            ParagraphFragment::Justification(j) => fill(&mut p.justification, j),
            ParagraphFragment::KeepNext => p.keep_next = true,
            ParagraphFragment::Indentation(ind) => {
                let target = p.indentation.get_or_insert_with(Indentation::default);
                target.left = target.left.or(ind.left);
                target.right = target.right.or(ind.right);
                target.first_line = target.first_line.or(ind.first_line);
                target.hanging = target.hanging.or(ind.hanging);
            }
            ParagraphFragment::Spacing(sp) => {
                let target = p.spacing.get_or_insert_with(Spacing::default);
                target.before = target.before.or(sp.before);
                target.after = target.after.or(sp.after);
                target.line = target.line.or(sp.line);
            }
            ParagraphFragment::Borders(b) => fill(&mut p.borders, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellFragment {
    Shading(String),
    VAlign(VerticalAlign),
}

impl Fragment for CellFragment {
    type Target = TableCellProperties;

    fn apply(&self, p: &mut TableCellProperties) {
        match self {
            CellFragment::Shading(fill_color) => fill(
                &mut p.shading,
                &Shading {
                    fill: fill_color.clone(),
                    color: Some("auto".into()),
                },
            ),
            CellFragment::VAlign(v) => fill(&mut p.v_align, v),
        }
    }
}

/// Table scope: cell properties plus the paragraph formatting inherited by
/// the paragraphs of a cell.
#[derive(Debug, Clone, Default)]
pub struct TableCascade {
    pub cells: StyleCascade<CellFragment>,
    pub paragraphs: StyleCascade<ParagraphFragment>,
}

impl TableCascade {
    pub fn begin_tag(&mut self, tag: &str, cells: Vec<CellFragment>, paragraphs: Vec<ParagraphFragment>) {
        self.cells.begin_tag(tag, cells);
        self.paragraphs.begin_tag(tag, paragraphs);
    }

    pub fn end_tag(&mut self, tag: &str) {
        self.cells.end_tag(tag);
        self.paragraphs.end_tag(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_tags_accumulate_flags() {
        let mut runs = StyleCascade::default();
        runs.begin_tag("b", vec![RunFragment::Bold]);
        runs.begin_tag("i", vec![RunFragment::Italic]);
        let mut props = RunProperties::default();
        runs.apply_tags(&mut props);
        assert!(props.bold && props.italic);

        runs.end_tag("i");
        let mut props = RunProperties::default();
        runs.apply_tags(&mut props);
        assert!(props.bold && !props.italic);
    }

    #[test]
    fn test_innermost_value_wins() {
        let mut runs = StyleCascade::default();
        runs.begin_tag("div", vec![RunFragment::Color("FF0000".into())]);
        runs.begin_tag("span", vec![RunFragment::Color("00FF00".into())]);
        let mut props = RunProperties::default();
        runs.apply_tags(&mut props);
        assert_eq!(props.color.as_deref(), Some("00FF00"));
    }

    #[test]
    fn test_only_top_frame_per_tag_applies() {
        let mut runs = StyleCascade::default();
        runs.begin_tag("span", vec![RunFragment::Bold]);
        runs.begin_tag("span", vec![RunFragment::Italic]);
        let mut props = RunProperties::default();
        runs.apply_tags(&mut props);
        assert!(!props.bold);
        assert!(props.italic);

        runs.end_tag("span");
        let mut props = RunProperties::default();
        runs.apply_tags(&mut props);
        assert!(props.bold);
    }

    #[test]
    fn test_merge_tag_keeps_outer_fragments() {
        let mut runs = StyleCascade::default();
        runs.begin_tag("span", vec![RunFragment::Bold]);
        runs.merge_tag("span", vec![RunFragment::Italic]);
        let mut props = RunProperties::default();
        runs.apply_tags(&mut props);
        assert!(props.bold && props.italic);
        runs.end_tag("span");
        runs.end_tag("span");
        assert!(runs.is_empty());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut runs = StyleCascade::default();
        runs.begin_tag("font", vec![RunFragment::Size(24), RunFragment::Fonts("Arial".into())]);
        runs.begin_tag("u", vec![RunFragment::Underline]);
        let mut once = RunProperties::default();
        runs.apply_tags(&mut once);
        let mut twice = once.clone();
        runs.apply_tags(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_existing_values_are_kept() {
        let mut paragraphs = StyleCascade::default();
        paragraphs.begin_tag(
            "p",
            vec![
                ParagraphFragment::Justification(Justification::Center),
                ParagraphFragment::Indentation(Indentation {
                    left: Some(720),
                    first_line: Some(360),
                    ..Default::default()
                }),
            ],
        );
        let mut props = ParagraphProperties {
            justification: Some(Justification::Right),
            indentation: Some(Indentation {
                left: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };
        paragraphs.apply_tags(&mut props);
        assert_eq!(props.justification, Some(Justification::Right));
        let ind = props.indentation.unwrap();
        assert_eq!(ind.left, Some(100));
        assert_eq!(ind.first_line, Some(360));
    }

    #[test]
    fn test_end_tag_without_frame() {
        let mut tables = TableCascade::default();
        tables.begin_tag("td", vec![CellFragment::VAlign(VerticalAlign::Top)], vec![]);
        assert!(!tables.cells.end_tag("tr"));
        tables.end_tag("td");
        assert!(tables.cells.is_empty() && tables.paragraphs.is_empty());
    }
}
