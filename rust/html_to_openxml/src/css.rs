//! Value parsers for the subset of CSS and HTML presentational attributes the
//! converter honors.

use std::collections::HashMap;

use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{ParserOptions, StyleAttribute};
use lightningcss::traits::Parse;
use lightningcss::values::color::CssColor;
use log::debug;

use crate::model::{BorderLine, BorderStyle, Justification, VerticalAlign};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitMetric {
    Auto,
    Percent,
    Pixel,
    Point,
    Pica,
    Em,
    Ex,
    Centimeter,
    Millimeter,
    Inch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub metric: UnitMetric,
    pub value: f64,
}

impl Unit {
    pub const AUTO: Unit = Unit {
        metric: UnitMetric::Auto,
        value: 0.0,
    };

    pub fn new(metric: UnitMetric, value: f64) -> Self {
        Self { metric, value }
    }

    pub fn px(value: f64) -> Self {
        Self::new(UnitMetric::Pixel, value)
    }

    /// Parses `12px`, `1.5em`, `50%`, `auto`. A bare number is read as pixels.
    pub fn parse(s: &str) -> Option<Unit> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() {
            return None;
        }
        if s == "auto" {
            return Some(Unit::AUTO);
        }
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (num, suffix) = s.split_at(split);
        let value: f64 = num.parse().ok()?;
        let metric = match suffix.trim() {
            "" | "px" => UnitMetric::Pixel,
            "%" => UnitMetric::Percent,
            "pt" => UnitMetric::Point,
            "pc" => UnitMetric::Pica,
            "em" | "rem" => UnitMetric::Em,
            "ex" => UnitMetric::Ex,
            "cm" => UnitMetric::Centimeter,
            "mm" => UnitMetric::Millimeter,
            "in" => UnitMetric::Inch,
            _ => return None,
        };
        Some(Unit::new(metric, value))
    }

    /// An absolute length (neither `auto` nor a percentage).
    pub fn is_fixed(&self) -> bool {
        !matches!(self.metric, UnitMetric::Auto | UnitMetric::Percent)
    }

    pub fn is_auto(&self) -> bool {
        self.metric == UnitMetric::Auto
    }

    pub fn in_points(&self) -> f64 {
        match self.metric {
            UnitMetric::Auto | UnitMetric::Percent => 0.0,
            UnitMetric::Pixel => self.value * 0.75,
            UnitMetric::Point => self.value,
            UnitMetric::Pica => self.value * 12.0,
            UnitMetric::Em => self.value * 12.0,
            UnitMetric::Ex => self.value * 6.0,
            UnitMetric::Centimeter => self.value * 72.0 / 2.54,
            UnitMetric::Millimeter => self.value * 72.0 / 25.4,
            UnitMetric::Inch => self.value * 72.0,
        }
    }

    pub fn in_px(&self) -> f64 {
        match self.metric {
            UnitMetric::Pixel => self.value,
            _ => self.in_points() / 0.75,
        }
    }

    /// Twentieths of a point.
    pub fn in_dxa(&self) -> i64 {
        (self.in_points() * 20.0).round() as i64
    }

    pub fn in_emus(&self) -> i64 {
        match self.metric {
            UnitMetric::Pixel => (self.value * 9525.0).round() as i64,
            _ => (self.in_points() * 12700.0).round() as i64,
        }
    }

    pub fn in_half_points(&self) -> u32 {
        (self.in_points() * 2.0).round().max(0.0) as u32
    }

    /// Eighths of a point, clamped to what Word accepts for border widths.
    pub fn in_eighth_points(&self) -> u32 {
        ((self.in_points() * 8.0).round() as i64).clamp(2, 96) as u32
    }
}

/// `font-size` values: lengths plus the absolute keywords.
pub fn parse_font_size(s: &str) -> Option<Unit> {
    let pt = match s.trim().to_ascii_lowercase().as_str() {
        "xx-small" => 7.0,
        "x-small" => 7.5,
        "small" => 10.0,
        "medium" => 12.0,
        "large" => 13.5,
        "x-large" => 18.0,
        "xx-large" => 24.0,
        _ => return Unit::parse(s).filter(|u| u.is_fixed()),
    };
    Some(Unit::new(UnitMetric::Point, pt))
}

/// Legacy `<font size="1..7">`, relative `+1`/`-1` against the default size 3.
pub fn parse_html_font_size(s: &str) -> Option<Unit> {
    let t = s.trim();
    let n: i32 = if let Some(rest) = t.strip_prefix('+') {
        3 + rest.parse::<i32>().ok()?
    } else if let Some(rest) = t.strip_prefix('-') {
        3 - rest.parse::<i32>().ok()?
    } else {
        match t.parse::<i32>() {
            Ok(v) => v,
            Err(_) => return parse_font_size(t),
        }
    };
    let pt = match n.clamp(1, 7) {
        1 => 7.5,
        2 => 10.0,
        3 => 12.0,
        4 => 13.5,
        5 => 18.0,
        6 => 24.0,
        _ => 36.0,
    };
    Some(Unit::new(UnitMetric::Point, pt))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// A CSS color as RGB; `transparent` and non-sRGB colors yield `None`.
pub fn parse_color(s: &str) -> Option<Color> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("transparent") {
        return None;
    }
    match CssColor::parse_string(s).ok()? {
        CssColor::RGBA(rgba) => Some(Color {
            r: rgba.red,
            g: rgba.green,
            b: rgba.blue,
        }),
        _ => None,
    }
}

pub fn parse_align(s: &str) -> Option<Justification> {
    match s.trim().to_ascii_lowercase().as_str() {
        "left" | "start" => Some(Justification::Left),
        "center" | "middle" => Some(Justification::Center),
        "right" | "end" => Some(Justification::Right),
        "justify" => Some(Justification::Both),
        _ => None,
    }
}

pub fn parse_valign(s: &str) -> Option<VerticalAlign> {
    match s.trim().to_ascii_lowercase().as_str() {
        "top" => Some(VerticalAlign::Top),
        "middle" | "center" => Some(VerticalAlign::Center),
        "bottom" => Some(VerticalAlign::Bottom),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margin {
    pub top: Option<Unit>,
    pub right: Option<Unit>,
    pub bottom: Option<Unit>,
    pub left: Option<Unit>,
}

impl Margin {
    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.right.is_none() && self.bottom.is_none() && self.left.is_none()
    }

    /// 1 to 4 values shorthand, in CSS order (top, right, bottom, left).
    pub fn parse(s: &str) -> Margin {
        let units: Vec<Option<Unit>> = s.split_whitespace().map(Unit::parse).collect();
        let (top, right, bottom, left) = match units.len() {
            1 => (units[0], units[0], units[0], units[0]),
            2 => (units[0], units[1], units[0], units[1]),
            3 => (units[0], units[1], units[2], units[1]),
            4 => (units[0], units[1], units[2], units[3]),
            _ => return Margin::default(),
        };
        Margin {
            top,
            right,
            bottom,
            left,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SideBorder {
    pub style: BorderStyle,
    pub width: Unit,
    pub color: Option<Color>,
}

impl SideBorder {
    pub fn is_valid(&self) -> bool {
        self.style != BorderStyle::None
    }

    pub fn parse(s: &str) -> Option<SideBorder> {
        let mut style = None;
        let mut width = None;
        let mut color = None;
        for token in s.split_whitespace() {
            let lower = token.to_ascii_lowercase();
            if let Some(st) = parse_border_style(&lower) {
                style = Some(st);
            } else if let Some(w) = parse_border_width(&lower) {
                width = Some(w);
            } else if let Some(c) = parse_color(&lower) {
                color = Some(c);
            }
        }
        let style = style?;
        Some(SideBorder {
            style,
            width: width.unwrap_or(Unit::px(1.0)),
            color,
        })
    }

    pub fn to_line(&self) -> BorderLine {
        BorderLine {
            style: self.style,
            size: Some(self.width.in_eighth_points()),
            color: self.color.map(Color::to_hex),
        }
    }
}

fn parse_border_style(s: &str) -> Option<BorderStyle> {
    Some(match s {
        "none" | "hidden" => BorderStyle::None,
        "solid" => BorderStyle::Single,
        "dotted" => BorderStyle::Dotted,
        "dashed" => BorderStyle::Dashed,
        "double" => BorderStyle::Double,
        "groove" => BorderStyle::ThreeDEngrave,
        "ridge" => BorderStyle::ThreeDEmboss,
        "inset" => BorderStyle::Inset,
        "outset" => BorderStyle::Outset,
        _ => return None,
    })
}

fn parse_border_width(s: &str) -> Option<Unit> {
    match s {
        "thin" => Some(Unit::px(1.0)),
        "medium" => Some(Unit::px(3.0)),
        "thick" => Some(Unit::px(5.0)),
        _ => Unit::parse(s).filter(|u| u.is_fixed()),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Border {
    pub top: Option<SideBorder>,
    pub right: Option<SideBorder>,
    pub bottom: Option<SideBorder>,
    pub left: Option<SideBorder>,
}

impl Border {
    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.right.is_none() && self.bottom.is_none() && self.left.is_none()
    }

    pub fn sides(&self) -> [(&'static str, Option<&SideBorder>); 4] {
        [
            ("top", self.top.as_ref()),
            ("left", self.left.as_ref()),
            ("bottom", self.bottom.as_ref()),
            ("right", self.right.as_ref()),
        ]
    }

    /// Valid sides mapped to border lines; `None` when no side is valid.
    pub fn to_borders(&self) -> Option<crate::model::Borders> {
        let line = |side: &Option<SideBorder>| {
            side.as_ref()
                .filter(|s| s.is_valid())
                .map(SideBorder::to_line)
        };
        let borders = crate::model::Borders {
            top: line(&self.top),
            left: line(&self.left),
            bottom: line(&self.bottom),
            right: line(&self.right),
            inside_h: None,
            inside_v: None,
        };
        if borders.is_empty() {
            None
        } else {
            Some(borders)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlFont {
    pub style: Option<FontStyle>,
    pub small_caps: bool,
    pub weight: Option<FontWeight>,
    pub size: Option<Unit>,
    pub family: Option<String>,
}

impl HtmlFont {
    pub fn is_empty(&self) -> bool {
        *self == HtmlFont::default()
    }

    /// `font` shorthand: `[style] [variant] [weight] size[/line-height] family[, family]*`.
    pub fn parse(s: &str) -> HtmlFont {
        let mut font = HtmlFont::default();
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let mut i = 0;
        while i < tokens.len() {
            let lower = tokens[i].to_ascii_lowercase();
            match lower.as_str() {
                "italic" | "oblique" => font.style = Some(FontStyle::Italic),
                "small-caps" => font.small_caps = true,
                "normal" => {}
                w if parse_font_weight(w).is_some() => font.weight = parse_font_weight(w),
                other => {
                    let size_part = other.split('/').next().unwrap_or(other);
                    if let Some(size) = parse_font_size(size_part) {
                        font.size = Some(size);
                        // A detached `/ line-height` follows the size.
                        let rest = match tokens.get(i + 1) {
                            Some(&"/") => i + 3,
                            Some(t) if t.starts_with('/') => i + 2,
                            _ => i + 1,
                        };
                        let family = tokens.get(rest..).unwrap_or_default().join(" ");
                        font.family = first_family(&family);
                        break;
                    }
                    font.family = first_family(&tokens[i..].join(" "));
                    break;
                }
            }
            i += 1;
        }
        font
    }
}

fn parse_font_weight(s: &str) -> Option<FontWeight> {
    match s {
        "bold" | "bolder" => Some(FontWeight::Bold),
        "lighter" => Some(FontWeight::Normal),
        n => match n.parse::<u32>() {
            Ok(v) if v >= 600 => Some(FontWeight::Bold),
            Ok(_) => Some(FontWeight::Normal),
            Err(_) => None,
        },
    }
}

/// First entry of a font family list, unquoted.
pub fn first_family(s: &str) -> Option<String> {
    let first = s.split(',').next()?.trim();
    let unquoted = first.trim_matches(|c: char| c == '"' || c == '\'').trim();
    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextDecoration {
    pub underline: bool,
    pub line_through: bool,
}

pub fn parse_text_decoration(s: &str) -> TextDecoration {
    let mut deco = TextDecoration::default();
    for token in s.split_whitespace() {
        match token.to_ascii_lowercase().as_str() {
            "underline" => deco.underline = true,
            "line-through" => deco.line_through = true,
            _ => {}
        }
    }
    deco
}

/// Inline `style` attribute, keys lower-cased, later declarations win and
/// `!important` ones win over the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclarations {
    map: HashMap<String, String>,
}

impl StyleDeclarations {
    pub fn parse(style: &str) -> Self {
        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        let attribute = match StyleAttribute::parse(style, options) {
            Ok(attribute) => attribute,
            Err(err) => {
                debug!("unparsable style attribute '{style}': {err}");
                return Self::default();
            }
        };
        let block = &attribute.declarations;
        let mut map = HashMap::new();
        for property in block.declarations.iter().chain(&block.important_declarations) {
            let Ok(value) = property.value_to_css_string(PrinterOptions::default()) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let key = property.property_id().name().to_ascii_lowercase();
            map.insert(key, value.to_string());
        }
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn get_lower(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_ascii_lowercase())
    }

    pub fn get_unit(&self, key: &str) -> Option<Unit> {
        self.get(key).and_then(Unit::parse)
    }

    pub fn get_color(&self, key: &str) -> Option<Color> {
        self.get(key).and_then(parse_color)
    }

    /// `margin`/`padding` shorthand overridden by the `-top`... longhands.
    pub fn get_margin(&self, key: &str) -> Margin {
        let mut margin = self.get(key).map(Margin::parse).unwrap_or_default();
        let side = |name: &str| self.get_unit(&format!("{key}-{name}"));
        if let Some(u) = side("top") {
            margin.top = Some(u);
        }
        if let Some(u) = side("right") {
            margin.right = Some(u);
        }
        if let Some(u) = side("bottom") {
            margin.bottom = Some(u);
        }
        if let Some(u) = side("left") {
            margin.left = Some(u);
        }
        margin
    }

    pub fn get_side_border(&self, key: &str) -> Option<SideBorder> {
        self.get(key).and_then(SideBorder::parse)
    }

    /// `border` shorthand overridden by the per-side shorthands.
    pub fn get_border(&self, key: &str) -> Border {
        let all = self.get_side_border(key);
        let side = |name: &str| {
            self.get_side_border(&format!("{key}-{name}"))
                .or_else(|| all.clone())
        };
        Border {
            top: side("top"),
            right: side("right"),
            bottom: side("bottom"),
            left: side("left"),
        }
    }

    /// `font` shorthand overridden by the `font-*` longhands.
    pub fn get_font(&self, key: &str) -> HtmlFont {
        let mut font = self.get(key).map(HtmlFont::parse).unwrap_or_default();
        if let Some(v) = self.get_lower("font-style") {
            font.style = match v.as_str() {
                "italic" | "oblique" => Some(FontStyle::Italic),
                "normal" => Some(FontStyle::Normal),
                _ => font.style,
            };
        }
        if let Some(v) = self.get_lower("font-variant") {
            font.small_caps = v == "small-caps";
        }
        if let Some(v) = self.get_lower("font-weight") {
            if let Some(w) = parse_font_weight(&v) {
                font.weight = Some(w);
            }
        }
        if let Some(v) = self.get("font-size").and_then(parse_font_size) {
            font.size = Some(v);
        }
        if let Some(v) = self.get("font-family").and_then(first_family) {
            font.family = Some(v);
        }
        font
    }

    pub fn get_text_decoration(&self, key: &str) -> TextDecoration {
        self.get(key).map(parse_text_decoration).unwrap_or_default()
    }
}
