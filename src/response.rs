use crate::message::Headers;
use bytes::{BufMut, Bytes, BytesMut};

/// An upstream response, as far as the proxy needs to look into it.
#[derive(Debug, Clone, PartialEq)]
pub struct HTTPResponse {
    pub version: String,
    /// Kept as received; compared as text, never parsed as a number.
    pub status_code: String,
    pub status_text: String,
    /// Empty for `200` responses, whose body is never scanned.
    pub headers: Headers,
}

impl HTTPResponse {
    /// Get the value of a specific key in the headers.
    ///
    /// Return `None` if the key isn't found.
    pub fn get_header_value<'a>(&'a self, key: &str) -> Option<&'a str> {
        self.headers.get(key)
    }

    /// `200` and `404` end a bounce chain and are relayed as-is.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status_code.as_str(), "200" | "404")
    }

    pub fn is_redirect(&self) -> bool {
        self.status_code == "301"
    }
}

fn get_status_description(status_code: u16) -> &'static str {
    match status_code {
        200 => "200 OK",
        301 => "301 Moved Permanently",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        501 => "501 Not Implemented",
        502 => "502 Bad Gateway",
        _ => "500 Internal Server Error",
    }
}

/// Build a status-only HTTP/1.0 message the proxy answers with itself.
pub fn build_status_message(status_code: u16) -> Bytes {
    let status_line = format!("HTTP/1.0 {}\r\n\r\n", get_status_description(status_code));
    let mut buf = BytesMut::with_capacity(status_line.len());
    buf.put(status_line.as_bytes());
    buf.freeze()
}
