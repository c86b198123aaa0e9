//! Decoding of raw client and upstream bytes into structured messages.
//!
//! Text is decoded one byte per character (ISO-8859-1), so any byte sequence
//! decodes and arbitrary bytes early in a body can never fail the parse.

use crate::request::HTTPRequest;
use crate::response::HTTPResponse;
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

/// Header fields in arrival order. A repeated field name overwrites the
/// earlier value in place, so only the last duplicate is kept.
///
/// Non-200 bodies are read line by line into here as well, so inserts go
/// through a name index rather than a scan of every field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    fields: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Headers {
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.index.get(key) {
            Some(&at) => self.fields[at].1 = value.to_string(),
            None => {
                self.index.insert(key.to_string(), self.fields.len());
                self.fields.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Case-sensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&at| self.fields[at].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Request(HTTPRequest),
    Response(HTTPResponse),
    /// Empty first line, or one that does not split into three fields.
    Malformed { line: String },
}

/// Decode bytes as ISO-8859-1.
pub fn decode_latin1(buf: &[u8]) -> String {
    buf.iter().map(|&b| char::from(b)).collect()
}

/// Write text back out one byte per character, the inverse of
/// [`decode_latin1`]. Characters above U+00FF become `?`.
pub fn encode_latin1(text: &str, buf: &mut BytesMut) {
    buf.reserve(text.len());
    for c in text.chars() {
        buf.put_u8(u8::try_from(c).unwrap_or(b'?'));
    }
}

/// Parse a raw buffer into a request or response.
///
/// The first line alone decides the kind: a first token starting with `http`
/// (any case) is a status line, anything else a request line.
pub fn parse_message(buf: &[u8]) -> ParsedMessage {
    let (first_line, rest) = split_first_line(buf);
    let first_line = decode_latin1(first_line);

    let (first, second, third) = match split_fields(&first_line) {
        Some(fields) => fields,
        None => return ParsedMessage::Malformed { line: first_line },
    };
    let is_status_line = first
        .get(..4)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("http"));
    // Only a reason phrase may be empty.
    if third.is_empty() && !is_status_line {
        return ParsedMessage::Malformed { line: first_line };
    }

    if is_status_line {
        let mut response = HTTPResponse {
            version: first.to_string(),
            status_code: second.to_string(),
            status_text: third.to_string(),
            headers: Headers::default(),
        };
        // 200 bodies are relayed opaquely and never scanned.
        if response.status_code != "200" {
            response.headers = parse_headers(&decode_latin1(rest));
        }
        ParsedMessage::Response(response)
    } else {
        ParsedMessage::Request(HTTPRequest {
            method: first.to_string(),
            path: second.to_string(),
            protocol: third.to_string(),
            headers: parse_headers(&decode_latin1(rest)),
        })
    }
}

fn split_first_line(buf: &[u8]) -> (&[u8], &[u8]) {
    match buf.iter().position(|&b| b == b'\n') {
        Some(end) => {
            let line = &buf[..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            (line, &buf[end + 1..])
        }
        None => (buf, &[]),
    }
}

/// Split on whitespace at most twice. The third field keeps any inner
/// whitespace, e.g. a multi-word reason phrase, and is empty when the line
/// ends right after the second separator (`HTTP/1.1 200 `).
fn split_fields(line: &str) -> Option<(&str, &str, &str)> {
    let (first, rest) = line.trim_start().split_once(char::is_whitespace)?;
    let (second, rest) = rest.trim_start().split_once(char::is_whitespace)?;
    Some((first, second, rest.trim()))
}

/// Every remaining non-empty line with a colon becomes a header; lines
/// without one are skipped.
fn parse_headers(text: &str) -> Headers {
    let mut headers = Headers::default();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim(), value.trim());
        }
    }
    headers
}
