//! Tests for HTML branding injection

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use hostgate::error::ProxyError;
use hostgate::http::response::{Response, ResponseBuilder, StatusCode};
use hostgate::proxy::rewriter::ResponseRewriter;
use hostgate::store::Entry;

const ADMIN: &str = "admin.example.com";
const PAGE: &str = r#"<html><head><title>t</title><link rel="icon" href="/old.ico"></head><body>hi</body></html>"#;

fn branded(css: &str, favicon: &str) -> Entry {
    let mut entry = Entry::new("rec1", "app.example.com", "10.0.0.1");
    entry.custom_css = css.to_string();
    entry.custom_favicon = favicon.to_string();
    entry
}

fn html_response(body: &[u8], gzip: bool) -> Response {
    let mut builder = ResponseBuilder::new(StatusCode::Ok).header("Content-Type", "text/html; charset=utf-8");
    if gzip {
        builder = builder.header("Content-Encoding", "gzip");
    }
    builder.body(body.to_vec()).build()
}

fn gz(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn gunzip(data: &[u8]) -> String {
    let mut out = String::new();
    MultiGzDecoder::new(data).read_to_string(&mut out).unwrap();
    out
}

fn content_length(response: &Response) -> usize {
    response.header("Content-Length").unwrap().parse().unwrap()
}

#[test]
fn test_css_injected_before_head_close() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = html_response(PAGE.as_bytes(), false);

    rewriter.rewrite(&mut response, &branded("style.css", "")).unwrap();

    let body = String::from_utf8(response.body.clone()).unwrap();
    let tag = r#"<link rel="stylesheet" type="text/css" href="https://admin.example.com/api/files/proxies/rec1/style.css">"#;
    assert_eq!(body.matches("rel=\"stylesheet\"").count(), 1);
    assert!(body.contains(&format!("{}</head>", tag)));
    // favicon untouched when no custom favicon
    assert!(body.contains(r#"<link rel="icon" href="/old.ico">"#));
    assert_eq!(content_length(&response), response.body.len());
}

#[test]
fn test_favicon_replaces_existing_icons() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let page = r#"<html><head><link rel="icon" href="/a.ico"><link rel="icon" type="image/png" href="/b.png"></head></html>"#;
    let mut response = html_response(page.as_bytes(), false);

    rewriter.rewrite(&mut response, &branded("", "fav.ico")).unwrap();

    let body = String::from_utf8(response.body.clone()).unwrap();
    assert!(!body.contains("/a.ico"));
    assert!(!body.contains("/b.png"));
    assert_eq!(body.matches(r#"<link rel="icon""#).count(), 1);
    assert!(body.contains(
        r#"<link rel="icon" type="image/x-icon" href="https://admin.example.com/api/files/proxies/rec1/fav.ico"></head>"#
    ));
    assert_eq!(content_length(&response), response.body.len());
}

#[test]
fn test_css_and_favicon_together() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = html_response(PAGE.as_bytes(), false);

    rewriter.rewrite(&mut response, &branded("style.css", "fav.ico")).unwrap();

    let body = String::from_utf8(response.body).unwrap();
    let css = body.find("style.css").unwrap();
    let icon = body.find("fav.ico").unwrap();
    let head_close = body.find("</head>").unwrap();
    assert!(css < icon && icon < head_close);
    assert!(!body.contains("/old.ico"));
}

#[test]
fn test_no_branding_is_byte_identical() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let original = html_response(PAGE.as_bytes(), false);
    let mut response = original.clone();

    rewriter.rewrite(&mut response, &branded("", "")).unwrap();

    assert_eq!(response.body, original.body);
    assert_eq!(response.headers, original.headers);
}

#[test]
fn test_no_branding_skips_invalid_gzip() {
    // nothing is decoded when there is nothing to inject
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = html_response(b"not gzip at all", true);

    assert!(rewriter.rewrite(&mut response, &branded("", "")).is_ok());
    assert_eq!(response.body, b"not gzip at all");
}

#[test]
fn test_non_html_passes_through() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "application/json")
        .body(b"{\"head\":\"</head>\"}".to_vec())
        .build();

    rewriter.rewrite(&mut response, &branded("style.css", "fav.ico")).unwrap();
    assert_eq!(response.body, b"{\"head\":\"</head>\"}");
}

#[test]
fn test_gzip_body_is_recompressed() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = html_response(&gz(PAGE.as_bytes()), true);

    rewriter.rewrite(&mut response, &branded("style.css", "fav.ico")).unwrap();

    assert_eq!(response.header("Content-Encoding"), Some("gzip"));
    assert_eq!(content_length(&response), response.body.len());
    let body = gunzip(&response.body);
    assert!(body.contains("proxies/rec1/style.css"));
    assert!(body.contains("proxies/rec1/fav.ico"));
}

#[test]
fn test_multi_member_gzip_is_read_to_the_end() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut body = gz(b"<html><head><title>t</title>");
    body.extend(gz(b"</head><body>tail</body></html>"));
    let mut response = html_response(&body, true);

    rewriter.rewrite(&mut response, &branded("style.css", "")).unwrap();

    let page = gunzip(&response.body);
    assert!(page.contains("proxies/rec1/style.css\"></head>"));
    assert!(page.ends_with("<body>tail</body></html>"));
    assert_eq!(content_length(&response), response.body.len());
}

#[test]
fn test_not_modified_with_gzip_encoding_passes_through() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = ResponseBuilder::new(StatusCode::NotModified)
        .header("Content-Type", "text/html")
        .header("Content-Encoding", "gzip")
        .build();
    let original = response.clone();

    rewriter.rewrite(&mut response, &branded("style.css", "fav.ico")).unwrap();

    assert_eq!(response.status, StatusCode::NotModified);
    assert!(response.body.is_empty());
    assert_eq!(response.headers, original.headers);
}

#[test]
fn test_empty_gzip_html_body_passes_through() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = html_response(b"", true);

    assert!(rewriter.rewrite(&mut response, &branded("style.css", "")).is_ok());
    assert!(response.body.is_empty());
}

#[test]
fn test_corrupt_gzip_leaves_response_untouched() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let original = html_response(b"\x1f\x8b\x08garbage", true);
    let mut response = original.clone();

    let err = rewriter.rewrite(&mut response, &branded("style.css", "")).unwrap_err();

    assert!(matches!(err, ProxyError::BodyRead(_)));
    assert_eq!(err.status_code(), StatusCode::BadGateway);
    assert_eq!(response.body, original.body);
    assert_eq!(response.headers, original.headers);
}

#[test]
fn test_html_without_head_is_unchanged_but_valid() {
    let rewriter = ResponseRewriter::new(ADMIN);
    let mut response = html_response(b"<p>fragment</p>", false);

    rewriter.rewrite(&mut response, &branded("style.css", "")).unwrap();

    assert_eq!(response.body, b"<p>fragment</p>");
    assert_eq!(content_length(&response), response.body.len());
}

#[test]
fn test_asset_url() {
    let rewriter = ResponseRewriter::new(ADMIN);
    assert_eq!(
        rewriter.asset_url(&branded("", ""), "logo.svg"),
        "https://admin.example.com/api/files/proxies/rec1/logo.svg"
    );
}
