//! On-disk snapshot record codec.
//!
//! A record is gzip-compressed text with three header lines followed by the
//! raw body:
//!
//! ```text
//! REQUEST_URL
//! STATUS_CODE,ERROR_MESSAGE
//! HEADERS_JSON
//! BODY...
//! ```
//!
//! The body is written byte-for-byte, so payloads in any declared charset
//! survive a round trip unchanged. Header values are stored as ISO-8859-1
//! text (one char per byte) and a repeated header becomes a JSON array.

use std::io::{Read, Write};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{Map, Value};

use super::error::CacheError;
use super::response::CachedResponse;

/// Serialize and compress a response.
pub fn encode(response: &CachedResponse) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    encoder.write_all(single_line(&response.url).as_bytes())?;
    encoder.write_all(b"\n")?;

    let message = response.error.as_deref().map(single_line).unwrap_or_default();
    writeln!(encoder, "{},{}", response.status, message)?;

    let headers = serde_json::to_vec(&headers_to_json(&response.headers))?;
    encoder.write_all(&headers)?;
    encoder.write_all(b"\n")?;

    encoder.write_all(&response.body)?;
    encoder.finish()
}

/// Decompress and parse a record.
pub fn decode(compressed: &[u8]) -> Result<CachedResponse, CacheError> {
    let mut raw = Vec::new();
    GzDecoder::new(compressed).read_to_end(&mut raw)?;

    let (url, rest) = split_line(&raw).ok_or_else(|| malformed("missing url line"))?;
    let (status_line, rest) = split_line(rest).ok_or_else(|| malformed("missing status line"))?;
    let (headers_line, body) = split_line(rest).ok_or_else(|| malformed("missing headers line"))?;

    let url = String::from_utf8(url.to_vec()).map_err(|_| malformed("url is not utf-8"))?;

    let status_line = std::str::from_utf8(status_line).map_err(|_| malformed("status is not utf-8"))?;
    let (code, message) = status_line
        .split_once(',')
        .ok_or_else(|| malformed("status line has no separator"))?;
    let status: u16 = code
        .trim()
        .parse()
        .map_err(|_| malformed(&format!("invalid status code {:?}", code)))?;

    let headers: Map<String, Value> =
        serde_json::from_slice(headers_line).map_err(|e| malformed(&e.to_string()))?;

    let mut response = CachedResponse::new(url, status, json_to_headers(headers)?, body.to_vec());
    if !message.is_empty() {
        response.error = Some(message.to_string());
    }
    Ok(response)
}

fn headers_to_json(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(latin1_decode(v.as_bytes())))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        map.insert(name.as_str().to_string(), value);
    }
    map
}

fn json_to_headers(map: Map<String, Value>) -> Result<HeaderMap, CacheError> {
    let mut headers = HeaderMap::with_capacity(map.len());
    for (name, value) in map {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| malformed(&format!("invalid header name {:?}", name)))?;
        let values = match value {
            Value::Array(values) => values,
            single => vec![single],
        };
        for value in values {
            let bytes = match value {
                Value::String(s) => latin1_encode(&s)
                    .ok_or_else(|| malformed(&format!("header {} is not single-byte text", name)))?,
                other => other.to_string().into_bytes(),
            };
            let value = HeaderValue::from_bytes(&bytes)
                .map_err(|_| malformed(&format!("invalid value for header {}", name)))?;
            headers.append(name.clone(), value);
        }
    }
    Ok(headers)
}

/// Header bytes as ISO-8859-1 text, one char per byte.
fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn latin1_encode(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(c).ok()).collect()
}

fn split_line(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    Some((&buf[..pos], &buf[pos + 1..]))
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

fn malformed(reason: &str) -> CacheError {
    CacheError::Record(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn sample() -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        headers.insert(header::SERVER, HeaderValue::from_static("origin"));
        CachedResponse::new("http://example.com/page", 200, headers, "<html>hi</html>\nmore\n")
    }

    #[test]
    fn record_round_trip() {
        let original = sample();
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn non_utf8_body_survives() {
        let mut response = sample();
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=iso-8859-1"),
        );
        response.body = vec![0xe9, 0x74, 0xe9, 0x0a, 0xff, 0x00].into();

        let decoded = decode(&encode(&response).unwrap()).unwrap();
        assert_eq!(decoded.body, response.body);
        assert_eq!(decoded.headers, response.headers);
    }

    #[test]
    fn error_message_is_kept() {
        let response = CachedResponse::new("http://example.com/missing", 404, HeaderMap::new(), "")
            .with_error("HTTP 404: Not Found");
        let decoded = decode(&encode(&response).unwrap()).unwrap();
        assert_eq!(decoded.status, 404);
        assert_eq!(decoded.error.as_deref(), Some("HTTP 404: Not Found"));
    }

    #[test]
    fn error_message_with_comma_and_newline() {
        let response = CachedResponse::new("http://example.com/", 500, HeaderMap::new(), "x")
            .with_error("bad, very\nbad");
        let decoded = decode(&encode(&response).unwrap()).unwrap();
        assert_eq!(decoded.error.as_deref(), Some("bad, very bad"));
        assert_eq!(decoded.body.as_ref(), b"x");
    }

    #[test]
    fn header_order_is_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert("x-zeta", HeaderValue::from_static("1"));
        headers.insert("x-alpha", HeaderValue::from_static("2"));
        let response = CachedResponse::new("http://example.com/", 200, headers, "");
        let decoded = decode(&encode(&response).unwrap()).unwrap();
        let names: Vec<_> = decoded.headers.keys().map(|k| k.as_str().to_string()).collect();
        assert_eq!(names, vec!["x-zeta", "x-alpha"]);
    }

    #[test]
    fn repeated_headers_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(header::SERVER, HeaderValue::from_static("origin"));
        let response = CachedResponse::new("http://example.com/", 200, headers, "");

        let decoded = decode(&encode(&response).unwrap()).unwrap();
        let cookies: Vec<_> = decoded.headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(decoded.headers, response.headers);
    }

    #[test]
    fn non_utf8_header_value_is_byte_exact() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_bytes(b"attachment; filename=caf\xe9.txt").unwrap(),
        );
        headers.insert("x-utf8", HeaderValue::from_bytes("naïve".as_bytes()).unwrap());
        let response = CachedResponse::new("http://example.com/", 200, headers, "");

        let decoded = decode(&encode(&response).unwrap()).unwrap();
        assert_eq!(
            decoded.headers[header::CONTENT_DISPOSITION].as_bytes(),
            b"attachment; filename=caf\xe9.txt"
        );
        assert_eq!(decoded.headers["x-utf8"].as_bytes(), "naïve".as_bytes());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"http://example.com/\n200,\n").unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(matches!(decode(&bytes), Err(CacheError::Record(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"not gzip at all").is_err());
    }
}
