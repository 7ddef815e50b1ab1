//! Upstream connection and request forwarding
//!
//! Dials the backend a route points at (plain TCP, or TLS for `https`),
//! replays the client request and reads the complete response so it can be
//! rewritten before reaching the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::http::headers::HeaderMap;
use crate::http::parser::{ParseError, decode_chunked, find_headers_end, is_chunked, parse_header_lines};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::proxy::resolver::Scheme;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Largest response head accepted from a backend.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Sends requests to the backend chosen by the resolver.
#[derive(Clone)]
pub struct Forwarder {
    /// Connection timeout duration
    connection_timeout: Duration,

    /// Request timeout duration
    request_timeout: Duration,

    tls: TlsConnector,
}

impl Forwarder {
    pub fn new(connection_timeout: Duration, request_timeout: Duration) -> anyhow::Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self::with_tls_config(
            connection_timeout,
            request_timeout,
            Arc::new(config),
        ))
    }

    /// Uses a caller-supplied TLS client configuration, e.g. with private
    /// roots for internal backends.
    pub fn with_tls_config(
        connection_timeout: Duration,
        request_timeout: Duration,
        tls: Arc<ClientConfig>,
    ) -> Self {
        Self {
            connection_timeout,
            request_timeout,
            tls: TlsConnector::from(tls),
        }
    }

    /// Forwards `request` to `backend` and returns the full response.
    ///
    /// `client_scheme` and `peer` describe the client side and end up in the
    /// `X-Forwarded-*` headers.
    pub async fn forward(
        &self,
        request: &Request,
        backend: &Url,
        client_scheme: Scheme,
        peer: SocketAddr,
    ) -> Result<Response> {
        let host = backend
            .host_str()
            .ok_or_else(|| ProxyError::upstream("backend URL missing host"))?;
        let port = backend.port_or_known_default().unwrap_or(80);
        // Url keeps IPv6 literals bracketed
        let bare_host = host.trim_start_matches('[').trim_end_matches(']');

        let stream = timeout(
            self.connection_timeout,
            TcpStream::connect((bare_host, port)),
        )
        .await
        .map_err(|_| ProxyError::Timeout(format!("connecting to {}:{}", host, port)))?
        .map_err(|e| ProxyError::upstream(format!("failed to connect to {}:{}: {}", host, port, e)))?;

        tracing::trace!(backend = %backend, "Connected to backend");

        let bytes = self.build_http_request(request, client_scheme, peer);
        let head_only = request.method == Method::HEAD;

        let round_trip = async {
            if backend.scheme() == "https" {
                let name = ServerName::try_from(bare_host.to_string())
                    .map_err(|e| ProxyError::upstream(format!("invalid server name {}: {}", host, e)))?;
                let tls = self
                    .tls
                    .connect(name, stream)
                    .await
                    .map_err(|e| ProxyError::upstream(format!("TLS handshake with {} failed: {}", host, e)))?;
                exchange(tls, &bytes, head_only).await
            } else {
                exchange(stream, &bytes, head_only).await
            }
        };

        timeout(self.request_timeout, round_trip)
            .await
            .map_err(|_| ProxyError::Timeout(format!("waiting for {}", backend)))?
    }

    /// Build HTTP request bytes to send to backend.
    ///
    /// The client's `Host` header is kept so name-based backends still see
    /// the virtual host.
    pub fn build_http_request(&self, request: &Request, client_scheme: Scheme, peer: SocketAddr) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(512 + request.body.len());

        let path = if request.path.is_empty() {
            "/"
        } else {
            &request.path
        };

        buffer.extend_from_slice(format!("{} {} HTTP/1.1\r\n", request.method.as_str(), path).as_bytes());

        let mut headers = request.headers.clone();
        headers.strip_hop_by_hop();

        let forwarded_for = match headers.get("X-Forwarded-For") {
            Some(existing) => format!("{}, {}", existing, peer.ip()),
            None => peer.ip().to_string(),
        };
        headers.set("X-Forwarded-For", forwarded_for);
        if let Some(host) = request.host() {
            headers.set("X-Forwarded-Host", host);
        }
        headers.set("X-Forwarded-Proto", client_scheme.as_str());

        // body was de-chunked on the way in
        headers.set("Content-Length", request.body.len().to_string());
        if request.body.is_empty() && matches!(request.method, Method::GET | Method::HEAD) {
            headers.remove("Content-Length");
        }

        // Add Connection: close for simplicity
        headers.set("Connection", "close");

        for (key, value) in headers.iter() {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        buffer.extend_from_slice(b"\r\n");
        buffer.extend_from_slice(&request.body);

        buffer
    }
}

async fn exchange<S>(mut stream: S, request: &[u8], head_only: bool) -> Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(request)
        .await
        .map_err(|e| ProxyError::upstream(format!("failed to send request: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| ProxyError::upstream(format!("failed to send request: {}", e)))?;

    tracing::trace!("Request sent to backend");

    read_http_response(&mut stream, head_only).await
}

/// Reads and parses a complete HTTP response from the backend.
pub async fn read_http_response<S>(stream: &mut S, head_only: bool) -> Result<Response>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    let headers_end = loop {
        if let Some(end) = find_headers_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(ProxyError::upstream("response headers too large"));
        }

        let n = read_some(stream, &mut buffer).await?;
        if n == 0 {
            return Err(ProxyError::upstream(
                "connection closed before complete response received",
            ));
        }
    };

    let head = buffer.split_to(headers_end + 4);
    let (status, mut headers) = parse_response_head(&head)?;

    let body = if head_only || status.is_bodyless() {
        Vec::new()
    } else if is_chunked(&headers) {
        read_chunked_body(stream, &mut buffer).await?
    } else if let Some(length) = content_length(&headers)? {
        read_sized_body(stream, &mut buffer, length).await?
    } else {
        read_to_close(stream, &mut buffer).await?
    };

    headers.strip_hop_by_hop();
    if !head_only && !status.is_bodyless() {
        headers.set("Content-Length", body.len().to_string());
    }

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn parse_response_head(head: &[u8]) -> Result<(StatusCode, HeaderMap)> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ProxyError::upstream("invalid UTF-8 in response headers"))?;

    let mut lines = text.split("\r\n");

    let status_line = lines.next().ok_or_else(|| ProxyError::upstream("empty response"))?;
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next();
    let code: u16 = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| ProxyError::upstream(format!("invalid status line: {}", status_line)))?;

    let headers = parse_header_lines(lines)
        .map_err(|e| ProxyError::upstream(format!("invalid response header: {:?}", e)))?;

    Ok((StatusCode::from_u16(code), headers))
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>> {
    headers
        .get("Content-Length")
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ProxyError::upstream(format!("invalid Content-Length: {}", v)))
        })
        .transpose()
}

async fn read_sized_body<S>(stream: &mut S, buffer: &mut BytesMut, length: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    while buffer.len() < length {
        if read_some(stream, buffer).await? == 0 {
            return Err(ProxyError::upstream(
                "connection closed before complete body received",
            ));
        }
    }
    Ok(buffer.split_to(length).to_vec())
}

async fn read_chunked_body<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    loop {
        match decode_chunked(buffer) {
            Ok((body, _consumed)) => return Ok(body),
            Err(ParseError::Incomplete) => {}
            Err(e) => return Err(ProxyError::upstream(format!("invalid chunked body: {:?}", e))),
        }

        if read_some(stream, buffer).await? == 0 {
            return Err(ProxyError::upstream(
                "connection closed inside chunked body",
            ));
        }
    }
}

async fn read_to_close<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    while read_some(stream, buffer).await? > 0 {}
    Ok(buffer.split().to_vec())
}

/// One read into `buffer`. A TLS peer that closes without `close_notify`
/// reads as end of stream.
async fn read_some<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    buffer.reserve(BUFFER_SIZE);
    match stream.read_buf(buffer).await {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
        Err(e) => Err(ProxyError::upstream(format!("failed to read response: {}", e))),
    }
}
