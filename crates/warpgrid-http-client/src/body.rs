//! Outgoing request bodies.

use std::fmt;
use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};

/// The body of an outgoing request.
///
/// A request either has no body at all ([`Body::empty`]), in which case
/// the substrate's write stream is never opened, or a sequential byte
/// source that is read into memory in full before being written.
pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Buffered(Bytes),
    Reader(Box<dyn Read + Send>),
}

impl Body {
    /// A request without a body.
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A body drained from `reader` when the request is sent.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            kind: Kind::Reader(Box::new(reader)),
        }
    }

    /// Returns `true` if the request carries no body.
    ///
    /// A zero-length buffered body is still a body.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    /// Read the whole body into memory. `None` for [`Body::empty`].
    pub fn into_bytes(self) -> Result<Option<Bytes>> {
        match self.kind {
            Kind::Empty => Ok(None),
            Kind::Buffered(bytes) => Ok(Some(bytes)),
            Kind::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map_err(Error::RequestBody)?;
                Ok(Some(Bytes::from(buf)))
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Buffered(bytes) => f.debug_tuple("Body::Buffered").field(&bytes.len()).finish(),
            Kind::Reader(_) => f.write_str("Body::Reader"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Buffered(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "source gone"))
        }
    }

    #[test]
    fn empty_body_has_no_bytes() {
        let body = Body::empty();
        assert!(body.is_empty());
        assert!(body.into_bytes().unwrap().is_none());
    }

    #[test]
    fn zero_length_buffer_is_still_a_body() {
        let body = Body::from(Vec::new());
        assert!(!body.is_empty());
        assert_eq!(body.into_bytes().unwrap(), Some(Bytes::new()));
    }

    #[test]
    fn buffered_body() {
        let body = Body::from("payload");
        assert_eq!(body.into_bytes().unwrap().unwrap().as_ref(), b"payload");
    }

    #[test]
    fn reader_body_is_drained() {
        let data: Vec<u8> = (0..=255).cycle().take(10_000).collect();
        let body = Body::from_reader(std::io::Cursor::new(data.clone()));
        assert_eq!(body.into_bytes().unwrap().unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn reader_failure_is_request_body_error() {
        let err = Body::from_reader(FailingReader).into_bytes().unwrap_err();
        match err {
            Error::RequestBody(io) => assert_eq!(io.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("expected RequestBody, got {other:?}"),
        }
    }

    #[test]
    fn unit_converts_to_empty() {
        assert!(Body::from(()).is_empty());
        assert!(Body::default().is_empty());
    }
}
