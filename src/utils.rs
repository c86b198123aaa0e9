use crate::error::{ProxyError, Result};
use crate::session::Upstream;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};
use url::{Host, Url};

type ChunkedBuffer = [u8; 4096];

/// Upstream reached over a fresh TCP connection per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpUpstream;

impl Upstream for TcpUpstream {
    async fn exchange(&self, host: &str, port: u16, request: &[u8]) -> Result<Bytes> {
        do_request(host, port, request).await
    }
}

/// Send the request to its destination and return everything it answered.
pub async fn do_request(host: &str, port: u16, request: &[u8]) -> Result<Bytes> {
    let unreachable = |source: io::Error| ProxyError::UpstreamUnreachable {
        host: host.to_string(),
        port,
        source,
    };

    let addr = lookup_an_address(host, port).await.map_err(unreachable)?;
    debug!(host, %addr, "connecting upstream");
    let mut socket = TcpStream::connect(addr).await.map_err(unreachable)?;
    socket.write_all(request).await.map_err(unreachable)?;

    let response = read_http_response(&mut socket).await.map_err(unreachable)?;
    if response.is_empty() {
        return Err(ProxyError::EmptyUpstreamResponse {
            host: host.to_string(),
        });
    }
    Ok(response)
}

/// Find the address of the host.
///
/// `host` may carry its own `:port`; `port` is used for the connection either way.
async fn lookup_an_address(host: &str, port: u16) -> io::Result<std::net::SocketAddr> {
    let url = Url::parse(&format!("http://{}/", host))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let hostname = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no host in {:?}", host),
            ))
        }
    };
    let addr = tokio::net::lookup_host((hostname.as_str(), port))
        .await?
        .next();
    addr.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} did not resolve to any address", hostname),
        )
    })
}

/// Read the upstream response until the server closes the connection.
async fn read_http_response<Stream>(socket: &mut Stream) -> io::Result<Bytes>
where
    Stream: AsyncRead + Unpin,
{
    let mut body_buffer = BytesMut::new();
    loop {
        let mut buffer: ChunkedBuffer = [0; 4096];
        let c_size = socket.read(&mut buffer).await?;
        if c_size == 0 {
            break;
        }
        body_buffer.put(&buffer[..c_size]);
    }
    trace!(bytes = body_buffer.len(), "upstream response drained");
    Ok(body_buffer.freeze())
}

/// Read one client message from the socket.
///
/// Stops at the end of the header block, at `max_bytes`, or at EOF. Returns
/// `None` when the client closed the connection before sending anything.
pub async fn read_http_request<Stream>(socket: &mut Stream, max_bytes: usize) -> Result<Option<Bytes>>
where
    Stream: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::new();
    loop {
        let mut chunked_buffer: ChunkedBuffer = [0; 4096];
        let c_size = socket.read(&mut chunked_buffer).await?;
        if c_size == 0 {
            break;
        }
        buffer.put(&chunked_buffer[..c_size]);
        if has_header_end(&buffer) || buffer.len() >= max_bytes {
            break;
        }
    }

    if buffer.is_empty() {
        Ok(None)
    } else {
        Ok(Some(buffer.freeze()))
    }
}

fn has_header_end(buf: &[u8]) -> bool {
    buf.windows(4).any(|window| window == b"\r\n\r\n")
        || buf.windows(2).any(|window| window == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// Serve one connection: capture the request head, answer, and close.
    async fn start_backend(response: &'static [u8]) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_http_request(&mut socket, 8192)
                .await
                .unwrap()
                .unwrap_or_default();
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            request.to_vec()
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_do_request_reads_until_close() {
        let (port, backend) =
            start_backend(b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nhello").await;
        let request = b"GET / HTTP/1.0\r\nHost: 127.0.0.1\r\n\r\n";

        let response = do_request("127.0.0.1", port, request).await.unwrap();
        assert_eq!(
            &response[..],
            b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nhello"
        );
        assert_eq!(backend.await.unwrap(), request.to_vec());
    }

    #[tokio::test]
    async fn test_do_request_uses_given_port_for_host_with_port() {
        let (port, backend) = start_backend(b"HTTP/1.0 404 Not Found\r\n\r\n").await;
        let host = format!("127.0.0.1:{}", port);
        let response = do_request(&host, port, b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        assert!(response.starts_with(b"HTTP/1.0 404"));
        backend.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_upstream_response() {
        let (port, backend) = start_backend(b"").await;
        let err = do_request("127.0.0.1", port, b"GET / HTTP/1.0\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::EmptyUpstreamResponse { .. }));
        backend.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = do_request("127.0.0.1", port, b"GET / HTTP/1.0\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable { .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_lookup_an_address_strips_authority_port() {
        let addr = lookup_an_address("127.0.0.1:8080", 9000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse::<std::net::SocketAddr>().unwrap());

        let addr = lookup_an_address("[::1]", 80).await.unwrap();
        assert_eq!(addr, "[::1]:80".parse::<std::net::SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_invalid_host_is_unreachable() {
        let err = do_request("bad host name", 80, b"GET / HTTP/1.0\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_read_http_request_stops_at_header_end() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let request = read_http_request(&mut server, 8192).await.unwrap().unwrap();
        assert_eq!(&request[..], b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");

        drop(client);
        assert!(read_http_request(&mut server, 8192).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_http_request_respects_limit() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"GET /aaaaaaaaaaaaaaaa").await.unwrap();
        let request = read_http_request(&mut server, 16).await.unwrap().unwrap();
        assert_eq!(&request[..], b"GET /aaaaaaaaaaaaaaaa");
    }
}
