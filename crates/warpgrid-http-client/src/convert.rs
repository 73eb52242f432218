//! Conversions between `http` types and the substrate's representations.
//!
//! Outbound: method, scheme, authority, path and headers of an
//! `http::Request`. Inbound: header entries and `Content-Length` of the
//! substrate's response.

use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};

use crate::config::HeaderEncoding;
use crate::error::{Error, Result};
use crate::substrate::{FieldEntries, Method, Scheme};

/// Map an `http::Method` onto the substrate's method.
///
/// The nine standard tokens match case-sensitively; anything else,
/// including `get`, is carried as [`Method::Other`].
pub fn method_to_substrate(method: &http::Method) -> Method {
    match method.as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "PATCH" => Method::Patch,
        "HEAD" => Method::Head,
        "OPTIONS" => Method::Options,
        "TRACE" => Method::Trace,
        "CONNECT" => Method::Connect,
        other => Method::Other(other.to_string()),
    }
}

/// Map a URI scheme string onto the substrate's scheme.
pub fn scheme_to_substrate(scheme: &str) -> Scheme {
    match scheme {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => Scheme::Other(other.to_string()),
    }
}

/// Extract the path and query from a URI, `/` when it has none.
pub fn path_with_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Extract the host and optional port from a URI, empty when it has none.
pub fn authority(uri: &Uri) -> String {
    uri.authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_default()
}

/// Lay out request headers as substrate field entries.
///
/// Keys appear once each, in first-insertion order. With
/// [`HeaderEncoding::Concatenate`] every value of a key is appended to a
/// single entry with no separator.
pub fn headers_to_fields(headers: &HeaderMap, encoding: HeaderEncoding) -> FieldEntries {
    let mut entries = Vec::with_capacity(headers.keys_len());
    for name in headers.keys() {
        let values = headers.get_all(name);
        match encoding {
            HeaderEncoding::Concatenate => {
                let mut value = Vec::new();
                for v in values {
                    value.extend_from_slice(v.as_bytes());
                }
                entries.push((name.as_str().to_string(), value));
            }
            HeaderEncoding::RepeatFields => {
                for v in values {
                    entries.push((name.as_str().to_string(), v.as_bytes().to_vec()));
                }
            }
        }
    }
    entries
}

/// Build a header map from substrate field entries.
///
/// Duplicate names become separate values of the same key.
pub fn headers_from_fields(entries: FieldEntries) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(entries.len());
    for (name, value) in entries {
        let header_name = HeaderName::from_bytes(name.as_bytes());
        let header_value = HeaderValue::from_bytes(&value);
        match (header_name, header_value) {
            (Ok(n), Ok(v)) => {
                map.append(n, v);
            }
            _ => return Err(Error::ResponseHeader { name }),
        }
    }
    Ok(map)
}

/// Parse the `Content-Length` header.
///
/// `None` when the header is missing or empty. A value that is not a
/// base-10 integer, or is negative, is an error; it never falls back to
/// zero or unknown.
pub fn content_length(headers: &HeaderMap) -> Result<Option<u64>> {
    let Some(raw) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    let text = raw.to_str().map_err(|_| {
        Error::MalformedContentLength(String::from_utf8_lossy(raw.as_bytes()).into_owned())
    })?;
    if text.is_empty() {
        return Ok(None);
    }
    let value: i64 = text
        .parse()
        .map_err(|_| Error::MalformedContentLength(text.to_string()))?;
    if value < 0 {
        return Err(Error::InvalidContentLength(text.to_string()));
    }
    Ok(Some(value as u64))
}
