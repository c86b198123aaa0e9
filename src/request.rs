use crate::message::{encode_latin1, Headers};
use bytes::{BufMut, Bytes, BytesMut};

/// The struct for HTTP Request
#[derive(Debug, Clone, PartialEq)]
pub struct HTTPRequest {
    /// HTTP method of this request. Only GET is ever forwarded.
    pub method: String,
    /// The request target as the client sent it.
    ///
    /// Usually `/<host>/<rest>` for a fresh navigation, or a resource path
    /// relative to the previously resolved host.
    pub path: String,
    /// The protocol named on the request line, HTTP/1.0 or HTTP/1.1.
    pub protocol: String,
    /// HTTP Headers. Lookup is case-sensitive, last duplicate wins.
    pub headers: Headers,
}

impl HTTPRequest {
    /// Get the value of a specific key in the headers.
    ///
    /// Return `None` if the key isn't found.
    pub fn get_header_value<'a>(&'a self, key: &str) -> Option<&'a str> {
        self.headers.get(key)
    }

    /// A request is a new navigation unless the browser marks it same-origin.
    pub fn is_new_host(&self) -> bool {
        self.get_header_value("Sec-Fetch-Site") != Some("same-origin")
    }

    /// Whether the `Host` header names the proxy itself.
    pub fn targets_localhost(&self) -> bool {
        self.get_header_value("Host")
            .map(|host| {
                host.get(..9)
                    .map_or(false, |prefix| prefix.eq_ignore_ascii_case("localhost"))
            })
            .unwrap_or(false)
    }

    /// False for bare hits on the proxy (`/` or `/favicon.ico` on localhost),
    /// which carry no encoded target host.
    pub fn has_valid_path_host(&self) -> bool {
        !self.targets_localhost() || !matches!(self.path.as_str(), "/" | "/favicon.ico")
    }

    /// Build the GET sent upstream.
    ///
    /// HTTP/1.0 keeps upstreams from answering with chunked or persistent
    /// connections. `path` and `host` are written back byte for byte as
    /// they were decoded.
    pub fn build_forward_message(path: &str, host: &str) -> Bytes {
        let mut buf = BytesMut::with_capacity(path.len() + host.len() + 32);
        buf.put_slice(b"GET ");
        encode_latin1(path, &mut buf);
        buf.put_slice(b" HTTP/1.0\r\nHost: ");
        encode_latin1(host, &mut buf);
        buf.put_slice(b"\r\n\r\n");
        buf.freeze()
    }
}
