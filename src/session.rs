//! Per-connection state and the request/response bounce loop.

use crate::classifier::{classify, Classification, Outcome};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::message::parse_message;
use crate::utils::read_http_request;
use bytes::Bytes;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Where forwarded requests go.
pub trait Upstream {
    /// Send `request` to `host:port` and return the complete response.
    fn exchange(
        &self,
        host: &str,
        port: u16,
        request: &[u8],
    ) -> impl Future<Output = Result<Bytes>> + Send;
}

/// One client connection.
pub struct Session<U> {
    upstream: U,
    last_target_host: Option<String>,
    max_redirects: usize,
    max_request_bytes: usize,
}

impl<U: Upstream> Session<U> {
    pub fn new(upstream: U, config: &ProxyConfig) -> Self {
        Session {
            upstream,
            last_target_host: None,
            max_redirects: config.max_redirects,
            max_request_bytes: config.max_request_bytes,
        }
    }

    /// Host of the most recent successful resolution on this connection.
    pub fn last_target_host(&self) -> Option<&str> {
        self.last_target_host.as_deref()
    }

    /// Serve client messages until the client closes the connection.
    pub async fn handle<S>(&mut self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(message) = read_http_request(stream, self.max_request_bytes).await? {
            let reply = self.bounce(message).await;
            stream.write_all(&reply).await?;
            stream.flush().await?;
        }
        Ok(())
    }

    /// Run one client message through the bounce chain and return the bytes
    /// to relay back.
    pub async fn bounce(&mut self, message: Bytes) -> Bytes {
        let mut message = message;
        let mut forwards = 0usize;

        loop {
            let parsed = parse_message(&message);
            let Classification {
                outcome,
                resolved_host,
            } = classify(&parsed, self.last_target_host());
            if let Some(host) = resolved_host {
                self.last_target_host = Some(host);
            }

            match outcome {
                Outcome::PassThrough => return message,
                Outcome::Error(err) => return self.reject(err),
                Outcome::Forward {
                    request,
                    host,
                    port,
                } => {
                    // The first forward is the client's own request; every
                    // later one follows a redirect.
                    if forwards > self.max_redirects {
                        return self.reject(ProxyError::TooManyRedirects {
                            limit: self.max_redirects,
                        });
                    }
                    forwards += 1;

                    info!(%host, port, hop = forwards, "forwarding request");
                    message = match self.upstream.exchange(&host, port, &request).await {
                        Ok(response) => response,
                        Err(err) => return self.reject(err),
                    };
                }
            }
        }
    }

    fn reject(&self, err: ProxyError) -> Bytes {
        if err.is_upstream_failure() {
            warn!(error = %err, "upstream exchange failed");
        } else if err.status_code() == 502 {
            warn!(error = %err, "giving up on upstream response");
        } else {
            debug!(error = %err, "answering with error");
        }
        err.to_response()
    }
}
