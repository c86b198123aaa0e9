//! Working out which upstream host a message is aimed at.
//!
//! Clients talk to the proxy's own address, so the real destination has to be
//! encoded somewhere:
//!
//! 1. **New host**: the first request of a navigation carries the target as
//!    the first path segment, `/<host>/<rest-of-path>`.
//! 2. **Same origin**: follow-up requests for resources of that page keep
//!    their path and go to the host the session resolved last.
//! 3. **Absolute form**: a client configured to use us as its HTTP proxy
//!    sends `http://<host>/<path>`.
//!
//! Redirect targets (`Location` headers) are split the same way as the
//! absolute form.

use crate::error::{ProxyError, Result};
use crate::request::HTTPRequest;
use bytes::Bytes;
use tracing::trace;
use url::Url;

/// Port used toward upstreams unless the authority names one.
pub const DEFAULT_PORT: u16 = 80;

/// A resolved upstream destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The authority as resolved, sent verbatim in the `Host` header.
    pub host: String,
    pub path: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, path: impl Into<String>, port: Option<u16>) -> Self {
        let host = host.into();
        let port = port.or_else(|| authority_port(&host)).unwrap_or(DEFAULT_PORT);
        Target {
            host,
            path: path.into(),
            port,
        }
    }

    /// The synthesized GET for this target.
    pub fn build_request(&self) -> Bytes {
        HTTPRequest::build_forward_message(&self.path, &self.host)
    }
}

/// Resolve a client request to its upstream target.
///
/// `port` overrides the port derived from the resolved authority.
pub fn resolve(
    path: &str,
    host_header: Option<&str>,
    is_new_host: bool,
    last_host: Option<&str>,
    port: Option<u16>,
) -> Result<Target> {
    let (host, resolved_path) = if is_absolute_form(path) {
        let (host, rest) = clean_redirect(path);
        (host, non_empty_path(rest))
    } else if is_new_host {
        split_new_host_path(path)
    } else {
        match last_host {
            Some(host) => (host.to_string(), path.to_string()),
            None => {
                return Err(ProxyError::MissingHostContext {
                    path: path.to_string(),
                })
            }
        }
    };

    if host.is_empty() {
        return Err(ProxyError::MissingHostContext {
            path: path.to_string(),
        });
    }

    trace!(
        path,
        host_header = ?host_header,
        is_new_host,
        resolved_host = %host,
        resolved_path = %resolved_path,
        "resolved request target"
    );
    Ok(Target::new(host, resolved_path, port))
}

/// Split `/<host>/<rest>` into `(host, /<rest>)`.
///
/// A path that is only the host segment gets a trailing `/`, so
/// `/example.com` resolves to `("example.com", "/")`.
pub fn split_new_host_path(path: &str) -> (String, String) {
    let mut path = path.to_string();
    let split_at = match path.get(1..).and_then(|tail| tail.find('/')) {
        Some(index) => index + 1,
        None => {
            path.push('/');
            path.len() - 1
        }
    };
    let host = path.get(1..split_at).unwrap_or_default().to_string();
    (host, path[split_at..].to_string())
}

/// Split a `Location` URL into `(host, path)`.
///
/// Anything up to and including `://` is dropped; the remainder splits at its
/// first `/`. Without a `/` the path is empty.
pub fn clean_redirect(location: &str) -> (String, String) {
    let rest = match location.find("://") {
        Some(index) => &location[index + 3..],
        None => location,
    };
    match rest.find('/') {
        Some(index) => (rest[..index].to_string(), rest[index..].to_string()),
        None => (rest.to_string(), String::new()),
    }
}

/// An empty request target is sent as `/`.
pub fn non_empty_path(path: String) -> String {
    if path.is_empty() {
        String::from("/")
    } else {
        path
    }
}

fn is_absolute_form(path: &str) -> bool {
    path.get(..7)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("http://"))
}

/// Port named in a `host:port` authority, if any.
fn authority_port(authority: &str) -> Option<u16> {
    Url::parse(&format!("http://{}/", authority))
        .ok()
        .and_then(|url| url.port())
}
