//! Branding injection for proxied HTML
//!
//! Entries may carry a custom stylesheet and favicon. When a backend answers
//! with HTML for such an entry, the body is decoded (gzip or identity), link
//! tags are spliced in before `</head>`, and the body is re-encoded with the
//! same content coding. Everything happens on request-local buffers: the
//! response is only touched once the new body is complete.

use std::io::{self, Read, Write};
use std::sync::LazyLock;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use regex::bytes::Regex;

use crate::error::{ProxyError, Result};
use crate::http::response::Response;
use crate::store::Entry;

const HEAD_CLOSE: &[u8] = b"</head>";

/// Largest decompressed page the rewriter will buffer.
pub const MAX_DECODED_BYTES: usize = 32 * 1024 * 1024;

static FAVICON_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<link rel="icon"[^>]*>"#).expect("favicon pattern compiles"));

/// Rewrites HTML responses to reference per-entry assets served from the
/// administrative host.
#[derive(Debug, Clone)]
pub struct ResponseRewriter {
    admin_host: String,
}

impl ResponseRewriter {
    pub fn new(admin_host: impl Into<String>) -> Self {
        Self {
            admin_host: admin_host.into(),
        }
    }

    /// Applies the entry's branding to `response` in place.
    ///
    /// Non-HTML responses, responses without a body and entries without
    /// assets pass through untouched. On error the response is left exactly
    /// as it was.
    pub fn rewrite(&self, response: &mut Response, entry: &Entry) -> Result<()> {
        if response.status.is_bodyless() || response.body.is_empty() {
            return Ok(());
        }
        if !is_html(response) || !entry.has_branding() {
            return Ok(());
        }

        let gzipped = is_gzip(response);
        let decoded = if gzipped {
            gunzip(&response.body)?
        } else {
            response.body.clone()
        };

        let edited = self.inject(decoded, entry);

        let encoded = if gzipped { gzip(&edited)? } else { edited };

        response.headers.set("Content-Length", encoded.len().to_string());
        response.body = encoded;

        tracing::debug!(
            id = %entry.id,
            host = %entry.host,
            bytes = response.body.len(),
            gzip = gzipped,
            "Injected branding"
        );
        Ok(())
    }

    fn inject(&self, mut body: Vec<u8>, entry: &Entry) -> Vec<u8> {
        if !entry.custom_css.is_empty() {
            let tag = format!(
                r#"<link rel="stylesheet" type="text/css" href="{}">"#,
                self.asset_url(entry, &entry.custom_css)
            );
            body = insert_before_head_close(body, tag.as_bytes());
        }

        if !entry.custom_favicon.is_empty() {
            body = FAVICON_LINK.replace_all(&body, &b""[..]).into_owned();
            let tag = format!(
                r#"<link rel="icon" type="image/x-icon" href="{}">"#,
                self.asset_url(entry, &entry.custom_favicon)
            );
            body = insert_before_head_close(body, tag.as_bytes());
        }

        body
    }

    /// Public URL of an uploaded asset.
    pub fn asset_url(&self, entry: &Entry, asset: &str) -> String {
        format!(
            "https://{}/api/files/{}/{}",
            self.admin_host,
            entry.files_path(),
            asset
        )
    }
}

fn is_html(response: &Response) -> bool {
    response
        .header("Content-Type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
}

fn is_gzip(response: &Response) -> bool {
    response
        .header("Content-Encoding")
        .is_some_and(|ce| ce.trim().eq_ignore_ascii_case("gzip"))
}

/// Inserts `tag` before the first `</head>`. Bodies without one are
/// returned unchanged.
fn insert_before_head_close(mut body: Vec<u8>, tag: &[u8]) -> Vec<u8> {
    if let Some(at) = body.windows(HEAD_CLOSE.len()).position(|w| w == HEAD_CLOSE) {
        body.splice(at..at, tag.iter().copied());
    }
    body
}

fn gunzip(body: &[u8]) -> Result<Vec<u8>> {
    gunzip_limited(body, MAX_DECODED_BYTES)
}

/// Decodes every gzip member in `body`, failing once the output would
/// exceed `limit` bytes.
fn gunzip_limited(body: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(body).take(limit as u64 + 1);
    let mut out = Vec::with_capacity(body.len().saturating_mul(4).min(limit));
    decoder.read_to_end(&mut out).map_err(ProxyError::BodyRead)?;
    if out.len() > limit {
        return Err(ProxyError::BodyRead(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decoded body exceeds {} bytes", limit),
        )));
    }
    Ok(out)
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body).map_err(ProxyError::BodyWrite)?;
    encoder.finish().map_err(ProxyError::BodyWrite)
}
