//! Low-level nom parser functions for CSS-like declaration literals.
//!
//! The stylesheet parser proper is an external collaborator; these parsers
//! cover the declaration snippets the registry itself owns (built-in tag
//! defaults) and give tests a compact way to build property bags.

use crate::dimension::{Dim, Unit};
use crate::property::{PropValue, StyleProps};
use bindery_types::{sym, Color, Sym};
use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1, take_while_m_n};
use nom::character::complete::{char, space0};
use nom::combinator::{map, map_res, opt, recognize};
use nom::sequence::{pair, tuple};
use nom::IResult;
use thiserror::Error;

/// Errors that can occur during declaration parsing.
#[derive(Error, Debug, Clone)]
pub enum StyleParseError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Invalid value for '{property}': {value}")]
    InvalidValue { property: String, value: String },
}

fn parse_f64(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(pair(
            opt(alt((char('+'), char('-')))),
            alt((
                recognize(tuple((
                    take_while_m_n(1, 10, |c: char| c.is_ascii_digit()),
                    opt(tuple((
                        char('.'),
                        take_while_m_n(1, 10, |c: char| c.is_ascii_digit()),
                    ))),
                ))),
                recognize(tuple((
                    char('.'),
                    take_while_m_n(1, 10, |c: char| c.is_ascii_digit()),
                ))),
            )),
        )),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn parse_unit(input: &str) -> IResult<&str, Unit> {
    alt((
        map(tag_no_case("rem"), |_| Unit::Rem),
        map(tag_no_case("em"), |_| Unit::Em),
        map(tag_no_case("ex"), |_| Unit::Ex),
        map(tag_no_case("ratio"), |_| Unit::Ratio),
        map(char('%'), |_| Unit::Percent),
        map(tag_no_case("px"), |_| Unit::Px),
        map(tag_no_case("pt"), |_| Unit::Pt),
        map(tag_no_case("cm"), |_| Unit::Cm),
        map(tag_no_case("mm"), |_| Unit::Mm),
        map(tag_no_case("in"), |_| Unit::In),
        map(tag_no_case("lh"), |_| Unit::Lh),
    ))(input)
}

/// Parses a dimension value; a bare number reads as a unitless ratio.
pub fn parse_dim(input: &str) -> IResult<&str, Dim> {
    let (input, value) = parse_f64(input)?;
    let (input, unit) = opt(parse_unit)(input)?;
    Ok((input, Dim::new(value, unit.unwrap_or(Unit::Ratio))))
}

fn parse_hex_color(input: &str) -> IResult<&str, Color> {
    let (rest, raw) = recognize(pair(
        char('#'),
        take_while1(|c: char| c.is_ascii_hexdigit()),
    ))(input)?;
    match Color::parse_hex(raw) {
        Ok(color) => Ok((rest, color)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn keyword_value(word: &str) -> Option<PropValue> {
    let s = match word {
        "normal" => sym::NORMAL,
        "italic" => sym::ITALIC,
        "bold" => sym::BOLD,
        "line-through" => sym::LINE_THROUGH,
        "underline" => sym::UNDERLINE,
        "left" => sym::LEFT,
        "right" => sym::RIGHT,
        "center" => sym::CENTER,
        "justify" => sym::JUSTIFY,
        "pre" => sym::PRE,
        _ => return None,
    };
    Some(PropValue::symbol(s))
}

/// Maps a CSS property name to its schema symbol.
pub fn property_key(name: &str) -> Option<Sym> {
    let key = match name {
        "font-family" => sym::FONT_FAMILY,
        "font-size" => sym::FONT_SIZE,
        "font-style" => sym::FONT_STYLE,
        "font-weight" => sym::FONT_WEIGHT,
        "line-height" => sym::LINE_HEIGHT,
        "color" => sym::COLOR,
        "background-color" => sym::BACKGROUND_COLOR,
        "text-align" => sym::TEXT_ALIGN,
        "text-indent" => sym::TEXT_INDENT,
        "text-decoration" => sym::TEXT_DECORATION,
        "margin-top" => sym::MARGIN_TOP,
        "margin-bottom" => sym::MARGIN_BOTTOM,
        "margin-left" => sym::MARGIN_LEFT,
        "margin-right" => sym::MARGIN_RIGHT,
        "padding-top" => sym::PADDING_TOP,
        "padding-bottom" => sym::PADDING_BOTTOM,
        "padding-left" => sym::PADDING_LEFT,
        "padding-right" => sym::PADDING_RIGHT,
        "baseline-shift" => sym::BASELINE_SHIFT,
        "white-space" => sym::WHITE_SPACE,
        "letter-spacing" => sym::LETTER_SPACING,
        "dropcap" => sym::DROPCAP,
        "float" => sym::FLOAT,
        "content" => sym::CONTENT,
        "width" => sym::WIDTH,
        "height" => sym::HEIGHT,
        _ => return None,
    };
    Some(key)
}

fn parse_value(property: &str, raw: &str) -> Result<PropValue, StyleParseError> {
    let raw = raw.trim();

    if let Ok(("", color)) = parse_hex_color(raw) {
        return Ok(PropValue::Color(color));
    }
    if let Ok(("", dim)) = parse_dim(raw) {
        return Ok(PropValue::Dim(dim));
    }
    if let Some(v) = keyword_value(raw) {
        return Ok(v);
    }
    match raw {
        "true" => return Ok(PropValue::Bool(true)),
        "false" => return Ok(PropValue::Bool(false)),
        "" => {
            return Err(StyleParseError::InvalidValue {
                property: property.to_string(),
                value: raw.to_string(),
            });
        }
        _ => {}
    }
    // Anything else (font family names etc.) is carried verbatim.
    Ok(PropValue::Str(raw.to_string()))
}

fn parse_property_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)
}

/// Parses a `name: value; name: value` declaration list into a property bag.
pub fn parse_declarations(input: &str) -> Result<StyleProps, StyleParseError> {
    let mut props = StyleProps::new();
    for decl in input.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let (rest, name) = parse_property_name(decl)
            .map_err(|_| StyleParseError::Parse(format!("bad declaration: '{decl}'")))?;
        let (value_part, _) = pair(space0::<&str, nom::error::Error<&str>>, char(':'))(rest)
            .map_err(|_| StyleParseError::Parse(format!("missing ':' in '{decl}'")))?;
        let key = property_key(name)
            .ok_or_else(|| StyleParseError::UnknownProperty(name.to_string()))?;
        props.insert(key, parse_value(name, value_part)?);
    }
    Ok(props)
}
