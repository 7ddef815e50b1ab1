use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    InvalidChunk,
    Incomplete,
}

pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Look for header/body separator
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let headers = parse_header_lines(lines)?;

    // Body
    let (body, body_consumed) = if is_chunked(&headers) {
        decode_chunked(body_bytes)?
    } else {
        let content_length = headers
            .get("Content-Length")
            .map(|v| v.trim().parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
            .transpose()?
            .unwrap_or(0);

        if body_bytes.len() < content_length {
            return Err(ParseError::Incomplete);
        }
        (body_bytes[..content_length].to_vec(), content_length)
    };

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    let total_consumed = headers_end + 4 + body_consumed;
    Ok((request, total_consumed))
}

/// Parses `Name: value` lines until the first empty line.
pub fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.append(key.trim(), value.trim());
    }

    Ok(headers)
}

pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all("Transfer-Encoding")
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Decodes a chunked body from the start of `buf`.
///
/// Returns the decoded payload and the number of bytes consumed, trailers
/// included. Trailer fields are discarded.
pub fn decode_chunked(buf: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = find_crlf(&buf[pos..]).ok_or(ParseError::Incomplete)?;
        let size_line =
            std::str::from_utf8(&buf[pos..pos + line_end]).map_err(|_| ParseError::InvalidChunk)?;
        let size_str = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunk)?;
        pos += line_end + 2;

        if size == 0 {
            // trailers end with an empty line
            loop {
                let end = find_crlf(&buf[pos..]).ok_or(ParseError::Incomplete)?;
                pos += end + 2;
                if end == 0 {
                    return Ok((body, pos));
                }
            }
        }

        if buf.len() < pos + size + 2 {
            return Err(ParseError::Incomplete);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        pos += size;

        if &buf[pos..pos + 2] != b"\r\n" {
            return Err(ParseError::InvalidChunk);
        }
        pos += 2;
    }
}

pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn decode_chunked_with_extension_and_trailer() {
        let raw = b"4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nExpires: never\r\n\r\nNEXT";
        let (body, consumed) = decode_chunked(raw).unwrap();
        assert_eq!(body, b"Wikipedia");
        assert_eq!(&raw[consumed..], b"NEXT");
    }

    #[test]
    fn decode_chunked_incomplete() {
        assert_eq!(decode_chunked(b"5\r\nab"), Err(ParseError::Incomplete));
    }

    #[test]
    fn decode_chunked_rejects_bad_size() {
        assert_eq!(decode_chunked(b"zz\r\n"), Err(ParseError::InvalidChunk));
    }
}
