use std::collections::HashMap;
use std::io::{self, Read};
use thiserror::Error;

/// Upper bound on the request header block.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

const SUPPORTED_METHOD: &str = "GET";
const SUPPORTED_VERSIONS: [&str; 2] = ["HTTP/1.0", "HTTP/1.1"];

/// Client-side protocol errors. All of them are answered with 400.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request header exceeds {0} bytes")]
    HeaderTooLarge(usize),
    #[error("malformed request line `{0}`")]
    MalformedRequestLine(String),
    #[error("method `{0}` is not supported")]
    UnsupportedMethod(String),
    #[error("protocol version `{0}` is not supported")]
    UnsupportedVersion(String),
    #[error("malformed query parameter `{0}`")]
    MalformedQuery(String),
    #[error("malformed percent-encoding in `{0}`")]
    BadEncoding(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RequestError {
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// Read bytes until the blank line ending the header block.
///
/// Accepts `\r\n\r\n` as well as bare `\n\n` (and mixtures such as
/// `\n\r\n`). Returns `Ok(None)` when the peer closes the stream before the
/// block is complete. Bytes after the terminator are discarded.
pub fn read_request_header<R: Read>(
    reader: &mut R,
    limit: usize,
) -> Result<Option<Vec<u8>>, RequestError> {
    let mut header = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    // 0: inside a line, 1: after CR, 2: after line end, 3: after line end + CR
    let mut state = 0u8;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for &byte in &chunk[..n] {
            header.push(byte);
            if header.len() > limit {
                return Err(RequestError::HeaderTooLarge(limit));
            }
            state = match (state, byte) {
                (2 | 3, b'\n') => return Ok(Some(header)),
                (_, b'\n') => 2,
                (2, b'\r') => 3,
                (_, b'\r') => 1,
                _ => 0,
            };
        }
    }
}

/// Header lines with continuation lines folded into their predecessor.
pub fn header_lines(raw: &[u8]) -> Vec<String> {
    // header bytes are ISO-8859-1
    let text: String = raw.iter().map(|&b| char::from(b)).collect();
    let mut lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(previous) = lines.last_mut() {
                previous.push(' ');
                previous.push_str(line.trim());
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

/// Request line and headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Request target as sent, including any query string.
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Cookies from every `Cookie` header. Surrounding quotes are removed.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| parse_cookies(v))
            .collect()
    }

    /// `Host` header without the port.
    pub fn host(&self) -> Option<&str> {
        let host = self.header("host")?.trim();
        let name = if host.starts_with('[') {
            host.split_inclusive(']').next().unwrap_or(host)
        } else {
            host.split(':').next().unwrap_or(host)
        };
        (!name.is_empty()).then_some(name)
    }
}

/// Parse a raw header block.
pub fn parse_request(raw: &[u8]) -> Result<RequestHead, RequestError> {
    let mut lines = header_lines(raw).into_iter();
    let request_line = lines.next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let [method, target, version] = parts.as_slice() else {
        return Err(RequestError::MalformedRequestLine(request_line));
    };
    if *method != SUPPORTED_METHOD {
        return Err(RequestError::UnsupportedMethod(method.to_string()));
    }
    if !SUPPORTED_VERSIONS.contains(version) {
        return Err(RequestError::UnsupportedVersion(version.to_string()));
    }
    if !target.starts_with('/') {
        return Err(RequestError::MalformedRequestLine(request_line.clone()));
    }

    let headers = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    Ok(RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
    })
}

/// Parse a `Cookie` header value.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name, value.to_string()))
        })
        .collect()
}

/// Split a request target into path and optional query string.
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

fn has_valid_escapes(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Percent-decode one URL component. `+` is a space only in query strings.
pub fn decode_component(text: &str, plus_is_space: bool) -> Result<String, RequestError> {
    if !has_valid_escapes(text) {
        return Err(RequestError::BadEncoding(text.to_string()));
    }
    let text = if plus_is_space {
        text.replace('+', " ")
    } else {
        text.to_string()
    };
    urlencoding::decode(&text)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| RequestError::BadEncoding(text.clone()))
}

/// Parse `a=1&b=2` into a map. Empty segments are skipped; a pair without
/// `=` or with an empty name is an error.
pub fn parse_query_params(query: Option<&str>) -> Result<HashMap<String, String>, RequestError> {
    let mut params = HashMap::new();
    let Some(query) = query else {
        return Ok(params);
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(RequestError::MalformedQuery(pair.to_string()));
        };
        let key = decode_component(key, true)?;
        if key.is_empty() {
            return Err(RequestError::MalformedQuery(pair.to_string()));
        }
        params.insert(key, decode_component(value, true)?);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_terminators() {
        for raw in [
            "GET / HTTP/1.1\r\nHost: x\r\n\r\nBODY",
            "GET / HTTP/1.1\nHost: x\n\nBODY",
            "GET / HTTP/1.1\nHost: x\r\n\r\nBODY",
        ] {
            let header = read_request_header(&mut Cursor::new(raw), MAX_HEADER_BYTES)
                .unwrap()
                .unwrap();
            assert!(!String::from_utf8(header).unwrap().contains("BODY"), "{raw:?}");
        }
    }

    #[test]
    fn test_stream_ends_before_terminator() {
        let result = read_request_header(&mut Cursor::new("GET / HTTP/1.1\r\n"), 64).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_header_limit() {
        let raw = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(100));
        assert!(matches!(
            read_request_header(&mut Cursor::new(raw), 32),
            Err(RequestError::HeaderTooLarge(32))
        ));
    }

    #[test]
    fn test_folded_header() {
        let lines = header_lines(b"GET / HTTP/1.1\r\nX-Long: a\r\n  b\r\n\r\n");
        assert_eq!(lines, vec!["GET / HTTP/1.1", "X-Long: a b"]);
    }

    #[test]
    fn test_parse_cookies_strips_quotes() {
        let cookies = parse_cookies("sid=\"ABC\"; theme=dark");
        assert_eq!(cookies.get("sid").map(String::as_str), Some("ABC"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn test_host_without_port() {
        let head = parse_request(b"GET / HTTP/1.0\r\nHost: example.org:8080\r\n\r\n").unwrap();
        assert_eq!(head.host(), Some("example.org"));
    }

    #[test]
    fn test_query_params() {
        let params = parse_query_params(Some("name=J%C3%BCrgen&x=a+b&&empty=")).unwrap();
        assert_eq!(params["name"], "Jürgen");
        assert_eq!(params["x"], "a b");
        assert_eq!(params["empty"], "");
        assert!(parse_query_params(Some("novalue")).is_err());
        assert!(parse_query_params(Some("=1")).is_err());
        assert!(parse_query_params(Some("a=%zz")).is_err());
    }

    #[test]
    fn test_rejects_method_and_version() {
        assert!(matches!(
            parse_request(b"POST / HTTP/1.1\r\n\r\n"),
            Err(RequestError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            parse_request(b"GET / HTTP/2.0\r\n\r\n"),
            Err(RequestError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            parse_request(b"GET /\r\n\r\n"),
            Err(RequestError::MalformedRequestLine(_))
        ));
    }
}
