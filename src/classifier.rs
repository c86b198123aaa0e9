//! Deciding what to do with a parsed message.
//!
//! Classification is a pure function of the message and the host the session
//! resolved last; the caller owns that host and stores whatever comes back in
//! [`Classification::resolved_host`].

use crate::error::ProxyError;
use crate::message::ParsedMessage;
use crate::request::HTTPRequest;
use crate::resolver::{self, Target};
use crate::response::HTTPResponse;
use bytes::Bytes;
use tracing::debug;

#[derive(Debug)]
pub enum Outcome {
    /// Relay the message bytes unchanged.
    PassThrough,
    /// Send `request` to `host:port` and classify whatever comes back.
    Forward {
        request: Bytes,
        host: String,
        port: u16,
    },
    /// Answer the client with [`ProxyError::to_response`].
    Error(ProxyError),
}

impl Outcome {
    fn forward(target: Target) -> Self {
        Outcome::Forward {
            request: target.build_request(),
            host: target.host,
            port: target.port,
        }
    }
}

#[derive(Debug)]
pub struct Classification {
    pub outcome: Outcome,
    /// Set whenever a target host was resolved.
    pub resolved_host: Option<String>,
}

impl From<Outcome> for Classification {
    fn from(outcome: Outcome) -> Self {
        let resolved_host = match &outcome {
            Outcome::Forward { host, .. } => Some(host.clone()),
            _ => None,
        };
        Classification {
            outcome,
            resolved_host,
        }
    }
}

/// Classify one message against the session's last resolved host.
pub fn classify(message: &ParsedMessage, last_host: Option<&str>) -> Classification {
    let outcome = match message {
        ParsedMessage::Malformed { line } => Outcome::Error(ProxyError::MalformedHeader {
            line: line.clone(),
        }),
        ParsedMessage::Request(request) => classify_request(request, last_host),
        ParsedMessage::Response(response) => classify_response(response, last_host),
    };
    debug!(?outcome, "classified message");
    outcome.into()
}

fn classify_request(request: &HTTPRequest, last_host: Option<&str>) -> Outcome {
    let is_new_host = request.is_new_host();
    debug!(
        method = %request.method,
        path = %request.path,
        protocol = %request.protocol,
        headers = request.headers.len(),
        is_new_host,
        "client request"
    );

    if is_new_host && !request.has_valid_path_host() {
        return Outcome::Error(ProxyError::MissingHostContext {
            path: request.path.clone(),
        });
    }
    if request.method != "GET" {
        return Outcome::Error(ProxyError::UnsupportedMethod {
            method: request.method.clone(),
        });
    }

    match resolver::resolve(
        &request.path,
        request.get_header_value("Host"),
        is_new_host,
        last_host,
        None,
    ) {
        Ok(target) => Outcome::forward(target),
        Err(err) => Outcome::Error(err),
    }
}

fn classify_response(response: &HTTPResponse, last_host: Option<&str>) -> Outcome {
    debug!(
        version = %response.version,
        status = %response.status_code,
        reason = %response.status_text,
        "upstream response"
    );
    if response.is_terminal() {
        return Outcome::PassThrough;
    }
    if !response.is_redirect() {
        return Outcome::Error(ProxyError::UnsupportedStatus {
            code: response.status_code.clone(),
        });
    }

    let location = match response.get_header_value("Location") {
        Some(location) => location,
        None => return Outcome::Error(ProxyError::MissingLocation),
    };
    let (host, path) = resolver::clean_redirect(location);
    // A relative Location stays on the host that sent it.
    let host = match (host.is_empty(), last_host) {
        (false, _) => host,
        (true, Some(last)) => last.to_string(),
        (true, None) => return Outcome::Error(ProxyError::MissingLocation),
    };
    Outcome::forward(Target::new(host, resolver::non_empty_path(path), None))
}
