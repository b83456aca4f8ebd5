//! Flattened HTML token stream with a pull cursor.
//!
//! The markup is parsed with html5ever into an `RcDom`, which repairs
//! malformed input the way browsers do, then walked depth-first into
//! open/close/text tokens.

use std::collections::HashMap;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::css::{parse_color, Color, StyleDeclarations, Unit};

lazy_static! {
    static ref NO_ATTRIBUTES: HtmlAttributes = HtmlAttributes::default();
    static ref NO_STYLES: StyleDeclarations = StyleDeclarations::default();
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Attributes of one tag, names lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlAttributes {
    map: HashMap<String, String>,
}

impl HtmlAttributes {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.map.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn get_unit(&self, name: &str) -> Option<Unit> {
        self.get(name).and_then(Unit::parse)
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_color(&self, name: &str) -> Option<Color> {
        self.get(name).and_then(parse_color)
    }

    pub fn classes(&self) -> Vec<String> {
        self.get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HtmlAttributes {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut attrs = HtmlAttributes::default();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlToken {
    Open {
        name: String,
        attrs: HtmlAttributes,
        styles: StyleDeclarations,
        self_closing: bool,
    },
    Close {
        name: String,
    },
    Text(String),
}

impl HtmlToken {
    pub fn open(name: &str, attrs: HtmlAttributes) -> Self {
        let styles = attrs
            .get("style")
            .map(StyleDeclarations::parse)
            .unwrap_or_default();
        let name = name.to_ascii_lowercase();
        let self_closing = VOID_ELEMENTS.contains(&name.as_str());
        HtmlToken::Open {
            name,
            attrs,
            styles,
            self_closing,
        }
    }

    pub fn close(name: &str) -> Self {
        HtmlToken::Close {
            name: name.to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    Text,
}

#[derive(Debug, Clone, Default)]
pub struct HtmlTokens {
    tokens: Vec<HtmlToken>,
    pos: Option<usize>,
}

impl HtmlTokens {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        let mut tokens = Vec::new();
        for child in dom.document.children.borrow().iter() {
            walk(child, &mut tokens);
        }
        Self::from_tokens(tokens)
    }

    pub fn from_tokens(tokens: Vec<HtmlToken>) -> Self {
        Self { tokens, pos: None }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens consumed so far.
    pub fn position(&self) -> usize {
        self.pos.map_or(0, |p| p + 1)
    }

    pub fn move_next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p + 1);
        if next < self.tokens.len() {
            self.pos = Some(next);
            true
        } else {
            self.pos = Some(self.tokens.len());
            false
        }
    }

    pub fn current(&self) -> Option<&HtmlToken> {
        self.pos.and_then(|p| self.tokens.get(p))
    }

    pub fn kind(&self) -> Option<TokenKind> {
        self.current().map(|t| match t {
            HtmlToken::Open { .. } => TokenKind::Open,
            HtmlToken::Close { .. } => TokenKind::Close,
            HtmlToken::Text(_) => TokenKind::Text,
        })
    }

    pub fn tag_name(&self) -> &str {
        match self.current() {
            Some(HtmlToken::Open { name, .. }) | Some(HtmlToken::Close { name }) => name,
            _ => "",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self.current() {
            Some(HtmlToken::Text(t)) => Some(t),
            _ => None,
        }
    }

    pub fn attributes(&self) -> &HtmlAttributes {
        match self.current() {
            Some(HtmlToken::Open { attrs, .. }) => attrs,
            _ => &NO_ATTRIBUTES,
        }
    }

    pub fn styles(&self) -> &StyleDeclarations {
        match self.current() {
            Some(HtmlToken::Open { styles, .. }) => styles,
            _ => &NO_STYLES,
        }
    }

    pub fn is_self_closing(&self) -> bool {
        matches!(
            self.current(),
            Some(HtmlToken::Open {
                self_closing: true,
                ..
            })
        )
    }

    /// From an open tag, moves onto its matching close tag, skipping
    /// everything in between.
    pub fn skip_until_end(&mut self) {
        if self.kind() != Some(TokenKind::Open) || self.is_self_closing() {
            return;
        }
        let name = self.tag_name().to_string();
        let mut depth = 0usize;
        while self.move_next() {
            match self.current() {
                Some(HtmlToken::Open {
                    name: n,
                    self_closing: false,
                    ..
                }) if *n == name => depth += 1,
                Some(HtmlToken::Close { name: n }) if *n == name => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }
}

fn walk(node: &Handle, out: &mut Vec<HtmlToken>) {
    match &node.data {
        NodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            if let Some(HtmlToken::Text(prev)) = out.last_mut() {
                prev.push_str(&text);
            } else {
                out.push(HtmlToken::Text(text));
            }
        }
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.to_string();
            let mut attributes = HtmlAttributes::default();
            for attr in attrs.borrow().iter() {
                attributes.insert(&attr.name.local, &attr.value);
            }
            let token = HtmlToken::open(&tag, attributes);
            let void = matches!(
                token,
                HtmlToken::Open {
                    self_closing: true,
                    ..
                }
            );
            out.push(token);
            if void {
                return;
            }
            for child in node.children.borrow().iter() {
                walk(child, out);
            }
            out.push(HtmlToken::close(&tag));
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                walk(child, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(tokens: &mut HtmlTokens) -> Vec<String> {
        let mut out = Vec::new();
        while tokens.move_next() {
            out.push(match tokens.current() {
                Some(HtmlToken::Open { name, .. }) => format!("<{name}>"),
                Some(HtmlToken::Close { name }) => format!("</{name}>"),
                Some(HtmlToken::Text(t)) => t.clone(),
                None => unreachable!(),
            });
        }
        out
    }

    #[test]
    fn test_parse_wraps_body() {
        let mut tokens = HtmlTokens::parse("<b>Bold</b>");
        assert_eq!(
            names(&mut tokens),
            vec!["<html>", "<head>", "</head>", "<body>", "<b>", "Bold", "</b>", "</body>", "</html>"]
        );
    }

    #[test]
    fn test_void_elements_have_no_close() {
        let mut tokens = HtmlTokens::parse("Lorem<br/>Ipsum<img src='x.png'>");
        let all = names(&mut tokens);
        assert!(all.contains(&"<br>".to_string()));
        assert!(!all.contains(&"</br>".to_string()));
        assert!(!all.contains(&"</img>".to_string()));
    }

    #[test]
    fn test_attributes_and_styles() {
        let mut tokens = HtmlTokens::parse(r#"<p CLASS="a b" style="Color: red" data-x=" 3 ">x</p>"#);
        while tokens.move_next() && tokens.tag_name() != "p" {}
        assert_eq!(tokens.attributes().classes(), vec!["a", "b"]);
        assert_eq!(tokens.attributes().get_int("data-x"), Some(3));
        assert_eq!(tokens.styles().get("color"), Some("red"));
    }

    #[test]
    fn test_entities_are_decoded() {
        let mut tokens = HtmlTokens::parse("a &amp; b &lt;c&gt;");
        let texts: Vec<String> = names(&mut tokens)
            .into_iter()
            .filter(|t| !t.starts_with('<'))
            .collect();
        assert_eq!(texts, vec!["a & b <c>"]);
    }

    #[test]
    fn test_skip_until_end_handles_nesting() {
        let mut tokens = HtmlTokens::from_tokens(vec![
            HtmlToken::open("div", HtmlAttributes::default()),
            HtmlToken::open("div", HtmlAttributes::default()),
            HtmlToken::Text("inner".into()),
            HtmlToken::close("div"),
            HtmlToken::close("div"),
            HtmlToken::Text("after".into()),
        ]);
        assert!(tokens.move_next());
        tokens.skip_until_end();
        assert_eq!(tokens.kind(), Some(TokenKind::Close));
        assert_eq!(tokens.position(), 5);
        assert!(tokens.move_next());
        assert_eq!(tokens.text(), Some("after"));
        assert!(!tokens.move_next());
    }
}
