//! Inbound peer messages.
//!
//! Peers identify themselves with a flat JSON object such as
//! `{"command":"identify","device_type":"blitz","device_name":"Blitz-01","version":"1.2"}`.
//! Top-level string and scalar members are tokenized. Nested objects and
//! arrays are skipped without being looked into, and trailing NUL bytes
//! left by C peers are ignored. Anything else is passed through as opaque
//! data.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    error::{Error, ErrorKind},
    multi::separated_list0,
    sequence::{delimited, separated_pair},
    IResult, Parser,
};
use tracing::debug;

use crate::models::DeviceType;

#[derive(Debug, Clone, PartialEq)]
enum FieldValue<'a> {
    Text(String),
    /// Number, boolean or null, kept as its literal text.
    Scalar(&'a str),
    /// Object or array, kept as its raw text.
    Nested(&'a str),
}

/// Fields announced by an identifying peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub device_type: DeviceType,
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Identify(Identification),
    /// Any other payload; the registry only records activity.
    Other,
}

/// Classify a payload received from a peer.
pub fn parse(payload: &[u8]) -> Inbound {
    let Ok(text) = std::str::from_utf8(payload) else {
        debug!(len = payload.len(), "Inbound payload is not UTF-8");
        return Inbound::Other;
    };

    let text = text.trim_end_matches('\0');
    let fields = match parse_object(text) {
        Ok((_, fields)) => fields,
        Err(_) => {
            debug!(len = payload.len(), "Inbound payload is not a JSON object");
            return Inbound::Other;
        }
    };

    let text_field = |key: &str| {
        fields.iter().find_map(|(k, v)| match v {
            FieldValue::Text(s) if k == key => Some(s.clone()),
            _ => None,
        })
    };

    if text_field("command").as_deref() != Some("identify") {
        return Inbound::Other;
    }

    Inbound::Identify(Identification {
        device_type: DeviceType::from_token(text_field("device_type").as_deref()),
        name: text_field("device_name"),
        version: text_field("version"),
    })
}

fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

fn parse_object(input: &str) -> IResult<&str, Vec<(String, FieldValue<'_>)>> {
    all_consuming(delimited(
        (ws, char('{'), ws),
        separated_list0((ws, char(','), ws), parse_member),
        (ws, char('}'), ws),
    ))
    .parse(input)
}

fn parse_member(input: &str) -> IResult<&str, (String, FieldValue<'_>)> {
    separated_pair(parse_string, (ws, char(':'), ws), parse_value).parse(input)
}

fn parse_value(input: &str) -> IResult<&str, FieldValue<'_>> {
    alt((
        map(parse_string, FieldValue::Text),
        map(skip_nested, FieldValue::Nested),
        map(
            take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')),
            FieldValue::Scalar,
        ),
    ))
    .parse(input)
}

/// Consume one balanced object or array, honoring strings and escapes.
fn skip_nested(input: &str) -> IResult<&str, &str> {
    if !input.starts_with(['{', '[']) {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Char)));
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    let end = i + c.len_utf8();
                    return Ok((&input[end..], &input[..end]));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Eof)))
}

fn parse_string(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('"').parse(input)?;
    let mut out = String::new();

    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(nom::Err::Error(Error::new(rest, ErrorKind::Char))),
            Some('"') => return Ok((chars.as_str(), out)),
            Some('\\') => {
                let escaped = match chars.next() {
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some('/') => '/',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('b') => '\u{8}',
                    Some('f') => '\u{c}',
                    Some('u') => {
                        let tail = chars.as_str();
                        let code = tail
                            .get(..4)
                            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                            .ok_or_else(|| nom::Err::Error(Error::new(tail, ErrorKind::HexDigit)))?;
                        chars = tail[4..].chars();
                        char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
                    }
                    _ => return Err(nom::Err::Error(Error::new(rest, ErrorKind::Escaped))),
                };
                out.push(escaped);
            }
            Some(c) => out.push(c),
        }
        rest = chars.as_str();
    }
}
