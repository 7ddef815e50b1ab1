use hostgate::http::parser::{ParseError, parse_http_request};
use hostgate::http::request::Method;

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.host(), Some("example.com"));
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.body, b"hello".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_lowercase_content_length() {
    let req = b"POST /api HTTP/1.1\r\ncontent-length: 3\r\n\r\nabcXYZ";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, b"abc".to_vec());
    assert_eq!(&req[consumed..], b"XYZ");
}

#[test]
fn test_parse_chunked_request_body() {
    let req = b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, b"abcde".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_repeated_headers_are_kept() {
    let req = b"GET / HTTP/1.1\r\nCookie: a=1\r\nCookie: b=2\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    let cookies: Vec<&str> = parsed.headers.get_all("cookie").collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /dns/update?ip=203.0.113.5&domain=home HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.path, "/dns/update?ip=203.0.113.5&domain=home");
    assert_eq!(parsed.path_only(), "/dns/update");
    let params = parsed.query_params();
    assert_eq!(params.get("ip").map(String::as_str), Some("203.0.113.5"));
    assert_eq!(params.get("domain").map(String::as_str), Some("home"));
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    assert!(matches!(parse_http_request(req), Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    assert!(matches!(parse_http_request(req), Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_invalid_http_method() {
    let req = b"INVALID / HTTP/1.1\r\n\r\n";
    assert!(matches!(parse_http_request(req), Err(ParseError::InvalidMethod)));
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    assert!(matches!(parse_http_request(req), Err(ParseError::InvalidHeader)));
}

#[test]
fn test_parse_invalid_content_length() {
    let req = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
    assert!(matches!(
        parse_http_request(req),
        Err(ParseError::InvalidContentLength)
    ));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let (parsed, _) = parse_http_request(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, expected_method);
        assert_eq!(parsed.method.as_str(), method_str);
    }
}
