//! Numbering part model and the list-numbering allocator.
//!
//! Abstract definitions created here are always stored as one contiguous
//! block, ahead of every instance; Word falls back to "no list" otherwise.

use std::collections::HashMap;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::css::Unit;
use crate::error::{Error, Result};
use crate::model::{NumberingRef, ParagraphProperties};
use crate::xml::{attr_i64, attr_string, xml_escape_text, R_NS, W_NS};

pub const HEADING_NUMBERING_NAME: &str = "decimal-heading-multi";

const MAX_LEVELS: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub index: u32,
    pub start: Option<u32>,
    /// `w:numFmt` value, e.g. `decimal` or `bullet`.
    pub format: String,
    pub text: String,
    /// Left and hanging indentation in twips.
    pub indent: Option<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractNum {
    pub id: u32,
    pub name: Option<String>,
    pub multi_level: bool,
    pub levels: Vec<Level>,
    /// Source markup of a definition read from an existing part.
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingInstance {
    pub id: u32,
    pub abstract_id: u32,
    pub start_override: Option<u32>,
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberingEntry {
    Abstract(AbstractNum),
    Instance(NumberingInstance),
    /// Any other child of `w:numbering`, kept verbatim.
    Other(String),
}

/// Ordered content of `word/numbering.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberingStore {
    entries: Vec<NumberingEntry>,
    root_open: Option<String>,
}

impl NumberingStore {
    pub fn entries(&self) -> &[NumberingEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn abstracts(&self) -> impl Iterator<Item = &AbstractNum> {
        self.entries.iter().filter_map(|e| match e {
            NumberingEntry::Abstract(a) => Some(a),
            _ => None,
        })
    }

    pub fn instances(&self) -> impl Iterator<Item = &NumberingInstance> {
        self.entries.iter().filter_map(|e| match e {
            NumberingEntry::Instance(n) => Some(n),
            _ => None,
        })
    }

    pub fn find_abstract(&self, id: u32) -> Option<&AbstractNum> {
        self.abstracts().find(|a| a.id == id)
    }

    fn abstract_mut(&mut self, id: u32) -> Option<&mut AbstractNum> {
        self.entries.iter_mut().find_map(|e| match e {
            NumberingEntry::Abstract(a) if a.id == id => Some(a),
            _ => None,
        })
    }

    pub fn max_abstract_id(&self) -> Option<u32> {
        self.abstracts().map(|a| a.id).max()
    }

    pub fn max_instance_id(&self) -> u32 {
        self.instances().map(|n| n.id).max().unwrap_or(0)
    }

    /// Inserts definitions right after the last abstract definition, or
    /// before the first instance when there is none.
    pub fn insert_abstracts(&mut self, abstracts: Vec<AbstractNum>) {
        let at = self
            .entries
            .iter()
            .rposition(|e| matches!(e, NumberingEntry::Abstract(_)))
            .map(|i| i + 1)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| matches!(e, NumberingEntry::Instance(_)))
            })
            .unwrap_or(self.entries.len());
        let tail = self.entries.split_off(at);
        self.entries
            .extend(abstracts.into_iter().map(NumberingEntry::Abstract));
        self.entries.extend(tail);
    }

    /// Adds an instance after the last existing one.
    pub fn push_instance(&mut self, instance: NumberingInstance) {
        let at = self
            .entries
            .iter()
            .rposition(|e| {
                matches!(e, NumberingEntry::Instance(_) | NumberingEntry::Abstract(_))
            })
            .map_or(self.entries.len(), |i| i + 1);
        self.entries.insert(at, NumberingEntry::Instance(instance));
    }

    pub fn parse(xml: &str) -> Result<Self> {
        parse_numbering_xml(xml)
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        match &self.root_open {
            Some(root) => out.push_str(root),
            None => out.push_str(&format!(
                r#"<w:numbering xmlns:w="{W_NS}" xmlns:r="{R_NS}">"#
            )),
        }
        for entry in &self.entries {
            match entry {
                NumberingEntry::Abstract(a) => match &a.raw {
                    Some(raw) => out.push_str(raw),
                    None => abstract_xml(&mut out, a),
                },
                NumberingEntry::Instance(n) => match &n.raw {
                    Some(raw) => out.push_str(raw),
                    None => instance_xml(&mut out, n),
                },
                NumberingEntry::Other(raw) => out.push_str(raw),
            }
        }
        out.push_str("</w:numbering>");
        out
    }
}

fn level_xml(out: &mut String, l: &Level) {
    out.push_str(&format!(r#"<w:lvl w:ilvl="{}">"#, l.index));
    if let Some(start) = l.start {
        out.push_str(&format!(r#"<w:start w:val="{start}"/>"#));
    }
    out.push_str(&format!(
        r#"<w:numFmt w:val="{}"/><w:lvlText w:val="{}"/><w:lvlJc w:val="left"/>"#,
        xml_escape_text(&l.format),
        xml_escape_text(&l.text)
    ));
    if let Some((left, hanging)) = l.indent {
        out.push_str(&format!(
            r#"<w:pPr><w:ind w:left="{left}" w:hanging="{hanging}"/></w:pPr>"#
        ));
    }
    out.push_str("</w:lvl>");
}

fn abstract_xml(out: &mut String, a: &AbstractNum) {
    out.push_str(&format!(r#"<w:abstractNum w:abstractNumId="{}">"#, a.id));
    let kind = if a.multi_level { "multilevel" } else { "singleLevel" };
    out.push_str(&format!(r#"<w:multiLevelType w:val="{kind}"/>"#));
    if let Some(name) = &a.name {
        out.push_str(&format!(r#"<w:name w:val="{}"/>"#, xml_escape_text(name)));
    }
    for l in &a.levels {
        level_xml(out, l);
    }
    out.push_str("</w:abstractNum>");
}

fn instance_xml(out: &mut String, n: &NumberingInstance) {
    out.push_str(&format!(
        r#"<w:num w:numId="{}"><w:abstractNumId w:val="{}"/>"#,
        n.id, n.abstract_id
    ));
    if let Some(start) = n.start_override {
        out.push_str(&format!(
            r#"<w:lvlOverride w:ilvl="0"><w:startOverride w:val="{start}"/></w:lvlOverride>"#
        ));
    }
    out.push_str("</w:num>");
}

enum Parsing {
    Abstract(AbstractNum),
    Instance(NumberingInstance),
    Other,
}

fn to_u32(v: Option<i64>) -> Option<u32> {
    v.and_then(|v| u32::try_from(v).ok())
}

fn read_child(e: &BytesStart<'_>, current: &mut Parsing) {
    match current {
        Parsing::Abstract(a) => match e.name().as_ref() {
            b"w:multiLevelType" => {
                a.multi_level = attr_string(e, b"w:val").is_some_and(|v| v != "singleLevel");
            }
            b"w:name" => a.name = attr_string(e, b"w:val"),
            b"w:lvl" => a.levels.push(Level {
                index: to_u32(attr_i64(e, b"w:ilvl")).unwrap_or(0),
                start: None,
                format: "decimal".into(),
                text: String::new(),
                indent: None,
            }),
            b"w:start" => {
                if let Some(l) = a.levels.last_mut() {
                    l.start = to_u32(attr_i64(e, b"w:val"));
                }
            }
            b"w:numFmt" => {
                if let (Some(l), Some(v)) = (a.levels.last_mut(), attr_string(e, b"w:val")) {
                    l.format = v;
                }
            }
            b"w:lvlText" => {
                if let (Some(l), Some(v)) = (a.levels.last_mut(), attr_string(e, b"w:val")) {
                    l.text = v;
                }
            }
            b"w:ind" => {
                if let Some(l) = a.levels.last_mut() {
                    let left = attr_i64(e, b"w:left").or_else(|| attr_i64(e, b"w:start"));
                    if let Some(left) = left {
                        l.indent = Some((left, attr_i64(e, b"w:hanging").unwrap_or(0)));
                    }
                }
            }
            _ => {}
        },
        Parsing::Instance(n) => match e.name().as_ref() {
            b"w:abstractNumId" => n.abstract_id = to_u32(attr_i64(e, b"w:val")).unwrap_or(0),
            b"w:startOverride" => n.start_override = to_u32(attr_i64(e, b"w:val")),
            _ => {}
        },
        Parsing::Other => {}
    }
}

fn begin_entry(e: &BytesStart<'_>) -> Parsing {
    match e.name().as_ref() {
        b"w:abstractNum" => Parsing::Abstract(AbstractNum {
            id: to_u32(attr_i64(e, b"w:abstractNumId")).unwrap_or(0),
            name: None,
            multi_level: false,
            levels: Vec::new(),
            raw: None,
        }),
        b"w:num" => Parsing::Instance(NumberingInstance {
            id: to_u32(attr_i64(e, b"w:numId")).unwrap_or(0),
            abstract_id: 0,
            start_override: None,
            raw: None,
        }),
        _ => Parsing::Other,
    }
}

fn finish_entry(parsing: Parsing, raw: &str) -> NumberingEntry {
    let raw = raw.trim().to_string();
    match parsing {
        Parsing::Abstract(mut a) => {
            a.raw = Some(raw);
            NumberingEntry::Abstract(a)
        }
        Parsing::Instance(mut n) => {
            n.raw = Some(raw);
            NumberingEntry::Instance(n)
        }
        Parsing::Other => NumberingEntry::Other(raw),
    }
}

/// Reads a numbering part, keeping the markup of every entry so untouched
/// entries are written back unchanged.
pub fn parse_numbering_xml(xml: &str) -> Result<NumberingStore> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut store = NumberingStore::default();
    let mut depth = 0usize;
    let mut entry_start = 0usize;
    let mut current = Parsing::Other;

    loop {
        let before = reader.buffer_position();
        let event = reader.read_event_into(&mut buf);
        let after = reader.buffer_position();
        match event {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                match depth {
                    1 => store.root_open = Some(xml[before..after].trim().to_string()),
                    2 => {
                        entry_start = before;
                        current = begin_entry(e);
                    }
                    _ => read_child(e, &mut current),
                }
            }
            Ok(Event::Empty(ref e)) => match depth {
                0 => {
                    let root = xml[before..after].trim();
                    let root = root.strip_suffix("/>").unwrap_or(root);
                    store.root_open = Some(format!("{}>", root.trim_end()));
                }
                1 => {
                    let entry = begin_entry(e);
                    store.entries.push(finish_entry(entry, &xml[before..after]));
                }
                _ => read_child(e, &mut current),
            },
            Ok(Event::End(_)) => {
                if depth == 2 {
                    let parsing = std::mem::replace(&mut current, Parsing::Other);
                    store
                        .entries
                        .push(finish_entry(parsing, &xml[entry_start..after]));
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::xml("word/numbering.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(store)
}

fn seed(id: u32, name: &str, format: &str, text: &str, start: bool, indent: bool) -> AbstractNum {
    AbstractNum {
        id,
        name: Some(name.to_string()),
        multi_level: false,
        levels: vec![Level {
            index: 0,
            start: start.then_some(1),
            format: format.to_string(),
            text: text.to_string(),
            indent: indent.then_some((420, 360)),
        }],
        raw: None,
    }
}

fn seed_definitions(first_id: u32) -> Vec<AbstractNum> {
    let table: [(&str, &str, &str, bool); 8] = [
        ("decimal", "decimal", "%1.", true),
        ("disc", "bullet", "\u{2022}", false),
        ("square", "bullet", "\u{25aa}", false),
        ("circle", "bullet", "o", false),
        ("upper-alpha", "upperLetter", "%1.", true),
        ("lower-alpha", "lowerLetter", "%1.", true),
        ("upper-roman", "upperRoman", "%1.", true),
        ("lower-roman", "lowerRoman", "%1.", true),
    ];
    let mut seeds: Vec<AbstractNum> = table
        .iter()
        .zip(first_id..)
        .map(|(&(name, format, text, start), id)| seed(id, name, format, text, start, true))
        .collect();
    seeds.push(seed(
        first_id + 8,
        HEADING_NUMBERING_NAME,
        "decimal",
        "%1.",
        true,
        false,
    ));
    seeds
}

/// Maps a CSS `list-style-type` (or `<ol type>`) to a seed name.
pub fn list_type_name(value: &str) -> Option<&'static str> {
    let name = match value.trim() {
        "1" => "decimal",
        "a" => "lower-alpha",
        "A" => "upper-alpha",
        "i" => "lower-roman",
        "I" => "upper-roman",
        other => match other.to_ascii_lowercase().as_str() {
            "decimal" => "decimal",
            "disc" => "disc",
            "square" => "square",
            "circle" => "circle",
            "upper-alpha" | "upper-latin" => "upper-alpha",
            "lower-alpha" | "lower-latin" => "lower-alpha",
            "upper-roman" => "upper-roman",
            "lower-roman" => "lower-roman",
            _ => return None,
        },
    };
    Some(name)
}

/// Allocates numbering instances while lists are opened and closed.
#[derive(Debug)]
pub struct NumberingAllocator {
    known: HashMap<String, u32>,
    next_instance_id: u32,
    level_depth: u32,
    first_item: bool,
    /// (instance id, abstract id) per open list; the bottom entry is "no list".
    instances: Vec<(u32, Option<u32>)>,
    /// One shared instance per (depth, definition) for unordered lists.
    bullet_instances: HashMap<(u32, u32), u32>,
    list_classes: Vec<Vec<String>>,
    heading_instance: Option<u32>,
}

impl NumberingAllocator {
    /// Seeds the list definitions into `store`, reusing a previous seeding.
    pub fn new(store: &mut NumberingStore) -> Self {
        let names: HashMap<String, u32> = store
            .abstracts()
            .filter_map(|a| a.name.as_ref().map(|n| (n.to_ascii_lowercase(), a.id)))
            .collect();
        let seeds = seed_definitions(0);
        let reusable = store.abstracts().count() >= seeds.len()
            && seeds
                .iter()
                .filter_map(|s| s.name.as_deref())
                .all(|n| names.contains_key(n));

        let known = if reusable {
            debug!("reusing list definitions already present in the document");
            names
        } else {
            let first_id = store.max_abstract_id().map_or(0, |m| m + 1);
            let seeds = seed_definitions(first_id);
            let known = seeds
                .iter()
                .filter_map(|s| s.name.clone().map(|n| (n, s.id)))
                .collect();
            store.insert_abstracts(seeds);
            known
        };

        let base = store.max_instance_id();
        Self {
            known,
            next_instance_id: base,
            level_depth: 0,
            first_item: false,
            instances: vec![(base, None)],
            bullet_instances: HashMap::new(),
            list_classes: Vec::new(),
            heading_instance: None,
        }
    }

    /// Current nesting depth, 1 inside a top-level list.
    pub fn level_depth(&self) -> u32 {
        self.level_depth
    }

    pub fn set_level_depth(&mut self, depth: u32) {
        self.level_depth = depth;
    }

    pub fn instance_id(&self) -> u32 {
        self.instances.last().map_or(0, |&(id, _)| id)
    }

    pub fn in_list(&self) -> bool {
        self.level_depth > 0
    }

    /// Classes declared on the innermost open list.
    pub fn current_list_classes(&self) -> &[String] {
        self.list_classes.last().map_or(&[], Vec::as_slice)
    }

    fn abstract_for(&self, list_type: Option<&str>, ordered: bool) -> u32 {
        let fallback = if ordered { "decimal" } else { "disc" };
        list_type
            .map(str::to_ascii_lowercase)
            .and_then(|t| self.known.get(&t).copied())
            .or_else(|| self.known.get(fallback).copied())
            .unwrap_or(0)
    }

    fn new_instance(&mut self, store: &mut NumberingStore, abstract_id: u32) -> u32 {
        self.next_instance_id += 1;
        let id = self.next_instance_id;
        store.push_instance(NumberingInstance {
            id,
            abstract_id,
            start_override: Some(1),
            raw: None,
        });
        id
    }

    pub fn begin_list(
        &mut self,
        store: &mut NumberingStore,
        list_type: Option<&str>,
        ordered: bool,
        classes: Vec<String>,
    ) -> u32 {
        let id = self.create_list(store, list_type, ordered);
        self.list_classes.push(classes);
        id
    }

    pub fn create_list(
        &mut self,
        store: &mut NumberingStore,
        list_type: Option<&str>,
        ordered: bool,
    ) -> u32 {
        let abstract_id = self.abstract_for(list_type, ordered);
        let parent_abstract = self.instances.last().and_then(|&(_, a)| a);

        self.first_item = true;
        self.level_depth += 1;

        let mut instance = self.instance_id();
        if self.level_depth > 1 && parent_abstract == Some(abstract_id) && ordered {
            // Same definition one level deeper: numbering restarts through the level.
            self.ensure_multilevel(store, abstract_id, false);
        } else if ordered {
            instance = self.new_instance(store, abstract_id);
        } else {
            let key = (self.level_depth, abstract_id);
            instance = match self.bullet_instances.get(&key) {
                Some(&id) => id,
                None => {
                    let id = self.new_instance(store, abstract_id);
                    self.bullet_instances.insert(key, id);
                    id
                }
            };
        }

        self.instances.push((instance, Some(abstract_id)));
        instance
    }

    pub fn end_list(&mut self) {
        self.level_depth = self.level_depth.saturating_sub(1);
        if self.instances.len() > 1 {
            self.instances.pop();
        }
        self.first_item = true;
        self.list_classes.pop();
    }

    /// Instance of the current list item. The first item of a list carrying
    /// a fixed left margin gets a copy of the definition with that indent.
    pub fn process_item(&mut self, store: &mut NumberingStore, margin_left: Option<Unit>) -> u32 {
        if !self.first_item {
            return self.instance_id();
        }
        self.first_item = false;

        let Some(margin) = margin_left.filter(Unit::is_fixed) else {
            return self.instance_id();
        };
        let left = margin.in_dxa();
        if left <= 0 {
            return self.instance_id();
        }
        let Some(&(_, Some(abstract_id))) = self.instances.last() else {
            return self.instance_id();
        };
        let Some(first) = store
            .find_abstract(abstract_id)
            .and_then(|a| a.levels.first())
            .cloned()
        else {
            return self.instance_id();
        };

        let clone_id = store.max_abstract_id().map_or(0, |m| m + 1);
        store.insert_abstracts(vec![AbstractNum {
            id: clone_id,
            name: None,
            multi_level: false,
            levels: vec![Level {
                index: 0,
                start: Some(1),
                indent: Some((left, 360)),
                ..first
            }],
            raw: None,
        }]);
        let instance = self.new_instance(store, clone_id);
        if let Some(top) = self.instances.last_mut() {
            *top = (instance, Some(clone_id));
        }
        instance
    }

    /// Promotes a single-level definition to nine levels.
    fn ensure_multilevel(&self, store: &mut NumberingStore, abstract_id: u32, cascading: bool) {
        let Some(abs) = store.abstract_mut(abstract_id) else {
            return;
        };
        if abs.multi_level {
            return;
        }
        let format = abs
            .levels
            .first()
            .map_or_else(|| "decimal".to_string(), |l| l.format.clone());
        abs.multi_level = true;
        abs.raw = None;
        for i in 2..=MAX_LEVELS {
            let (text, indent) = if cascading {
                ((1..=i).map(|l| format!("%{l}.")).collect(), None)
            } else {
                (format!("%{i}."), Some((720 * i64::from(i), 360)))
            };
            abs.levels.push(Level {
                index: i - 1,
                start: Some(1),
                format: format.clone(),
                text,
                indent,
            });
        }
    }

    pub fn heading_numbering_id(&mut self, store: &mut NumberingStore) -> u32 {
        if let Some(id) = self.heading_instance {
            return id;
        }
        let abstract_id = self.abstract_for(Some(HEADING_NUMBERING_NAME), true);
        let existing = store
            .instances()
            .find(|n| n.abstract_id == abstract_id)
            .map(|n| n.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.new_instance(store, abstract_id);
                self.ensure_multilevel(store, abstract_id, true);
                id
            }
        };
        self.heading_instance = Some(id);
        id
    }

    /// Numbers a heading paragraph at `indent_level` (1-based) and resets
    /// list nesting for the lists that follow.
    pub fn apply_heading_numbering(
        &mut self,
        store: &mut NumberingStore,
        props: &mut ParagraphProperties,
        indent_level: u32,
    ) {
        let num_id = self.heading_numbering_id(store);
        props.numbering = Some(NumberingRef {
            level: indent_level.saturating_sub(1).min(MAX_LEVELS - 1),
            num_id,
        });
        self.first_item = true;
        self.level_depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn abstract_ids(store: &NumberingStore) -> Vec<u32> {
        store.abstracts().map(|a| a.id).collect()
    }

    #[test]
    fn test_seeding_empty_store() {
        let mut store = NumberingStore::default();
        let alloc = NumberingAllocator::new(&mut store);
        assert_eq!(abstract_ids(&store), (0..9).collect::<Vec<_>>());
        assert_eq!(alloc.instance_id(), 0);
        assert_eq!(
            store.find_abstract(8).unwrap().name.as_deref(),
            Some(HEADING_NUMBERING_NAME)
        );
    }

    #[test]
    fn test_seeding_twice_reuses_definitions() {
        let mut store = NumberingStore::default();
        let mut alloc = NumberingAllocator::new(&mut store);
        alloc.begin_list(&mut store, None, true, vec![]);
        let reparsed = NumberingStore::parse(&store.to_xml()).unwrap();
        let mut store = reparsed;
        let mut alloc = NumberingAllocator::new(&mut store);
        assert_eq!(store.abstracts().count(), 9);
        // Instance ids continue after the existing ones.
        assert_eq!(alloc.begin_list(&mut store, None, true, vec![]), 2);
    }

    #[test]
    fn test_seeds_stay_contiguous() {
        let xml = format!(
            r#"<w:numbering xmlns:w="{W_NS}"><w:abstractNum w:abstractNumId="4"><w:multiLevelType w:val="hybridMultilevel"/><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1)"/></w:lvl></w:abstractNum><w:num w:numId="7"><w:abstractNumId w:val="4"/></w:num></w:numbering>"#
        );
        let mut store = NumberingStore::parse(&xml).unwrap();
        let mut alloc = NumberingAllocator::new(&mut store);
        assert_eq!(alloc.begin_list(&mut store, None, true, vec![]), 8);
        let kinds: Vec<char> = store
            .entries()
            .iter()
            .map(|e| match e {
                NumberingEntry::Abstract(_) => 'a',
                NumberingEntry::Instance(_) => 'n',
                NumberingEntry::Other(_) => 'o',
            })
            .collect();
        assert_eq!(kinds.iter().collect::<String>(), "aaaaaaaaaann");
        assert_eq!(abstract_ids(&store), (4..14).collect::<Vec<_>>());
        assert!(store.find_abstract(4).unwrap().multi_level);
        assert!(store.to_xml().contains(r#"<w:lvlText w:val="%1)"/>"#));
    }

    #[test]
    fn test_ordered_items_share_instance() {
        let mut store = NumberingStore::default();
        let mut alloc = NumberingAllocator::new(&mut store);
        let id = alloc.begin_list(&mut store, None, true, vec![]);
        assert_eq!(id, 1);
        assert_eq!(alloc.process_item(&mut store, None), 1);
        assert_eq!(alloc.process_item(&mut store, None), 1);
        assert_eq!(alloc.level_depth(), 1);
        alloc.end_list();
        assert_eq!(alloc.level_depth(), 0);
        assert_eq!(alloc.begin_list(&mut store, None, true, vec![]), 2);
    }

    #[test]
    fn test_nested_ordered_list_promotes_multilevel() {
        let mut store = NumberingStore::default();
        let mut alloc = NumberingAllocator::new(&mut store);
        let outer = alloc.begin_list(&mut store, Some("decimal"), true, vec![]);
        let inner = alloc.begin_list(&mut store, Some("decimal"), true, vec![]);
        assert_eq!(outer, inner);
        let decimal = store.find_abstract(0).unwrap();
        assert!(decimal.multi_level);
        assert_eq!(decimal.levels.len(), 9);
        assert_eq!(decimal.levels[2].text, "%3.");
        assert_eq!(decimal.levels[2].indent, Some((2160, 360)));
    }

    #[test]
    fn test_unordered_lists_share_instance_per_depth() {
        let mut store = NumberingStore::default();
        let mut alloc = NumberingAllocator::new(&mut store);
        let first = alloc.begin_list(&mut store, None, false, vec![]);
        let nested = alloc.begin_list(&mut store, None, false, vec![]);
        alloc.end_list();
        alloc.end_list();
        let second = alloc.begin_list(&mut store, Some("DISC"), false, vec![]);
        assert_ne!(first, nested);
        assert_eq!(first, second);
        assert_eq!(store.instances().count(), 2);
    }

    #[test]
    fn test_item_margin_clones_definition() {
        let mut store = NumberingStore::default();
        let mut alloc = NumberingAllocator::new(&mut store);
        let list = alloc.begin_list(&mut store, Some("lower-roman"), true, vec![]);
        let item = alloc.process_item(&mut store, Some(Unit::px(48.0)));
        assert_ne!(list, item);
        let clone = store.abstracts().last().unwrap();
        assert_eq!(clone.id, 9);
        assert_eq!(clone.levels[0].format, "lowerRoman");
        assert_eq!(clone.levels[0].indent, Some((720, 360)));
        // The original definition is untouched.
        assert_eq!(store.find_abstract(7).unwrap().levels[0].indent, Some((420, 360)));
        assert_eq!(alloc.process_item(&mut store, Some(Unit::px(48.0))), item);
    }

    #[test]
    fn test_heading_numbering() {
        let mut store = NumberingStore::default();
        let mut alloc = NumberingAllocator::new(&mut store);
        let mut props = ParagraphProperties::default();
        alloc.apply_heading_numbering(&mut store, &mut props, 3);
        assert_eq!(props.numbering, Some(NumberingRef { level: 2, num_id: 1 }));
        let heading = store.find_abstract(8).unwrap();
        assert_eq!(heading.levels[2].text, "%1.%2.%3.");
        assert_eq!(heading.levels[2].indent, None);

        let mut again = ParagraphProperties::default();
        alloc.apply_heading_numbering(&mut store, &mut again, 1);
        assert_eq!(again.numbering, Some(NumberingRef { level: 0, num_id: 1 }));
        assert_eq!(store.instances().count(), 1);
    }

    #[test]
    fn test_list_type_names() {
        assert_eq!(list_type_name("I"), Some("upper-roman"));
        assert_eq!(list_type_name("Lower-Latin"), Some("lower-alpha"));
        assert_eq!(list_type_name("none"), None);
    }
}
