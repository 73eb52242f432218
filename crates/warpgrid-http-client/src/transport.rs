//! Request encoder: one synchronous round trip per call.
//!
//! # Round trip
//!
//! ```text
//! http::Request
//!   ├── headers  → fields ──► outgoing-request (method, scheme, authority, path)
//!   ├── body     → outgoing-body → output-stream: one blocking write-and-flush
//!   │              (stream dropped right after), body finished without trailers
//!   ├── handle(request) → future
//!   ├── subscribe → block → get → pollable dropped
//!   └── incoming-response
//!         ├── status, headers, content-length → http::Response parts
//!         └── consume → incoming-body → input-stream ─┐
//!                                                     ▼
//!                            ResponseBody owns stream, body, response,
//!                            future and request until it is closed
//! ```
//!
//! Every failure aborts the call. Handles acquired on the failure path
//! are dropped on the way out.

use std::io::Read;
use std::sync::Arc;

use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::config::ClientConfig;
use crate::convert;
use crate::error::{Error, ResponseFailure, Result};
use crate::reader::ResponseBody;
use crate::substrate::{InFlight, ResponseOutcome, Substrate};

/// The `Request -> Response` contract.
///
/// Given a request, either a response whose body can be read and closed,
/// or an error describing why no response was obtained.
pub trait RoundTrip {
    type Body: Read;

    fn round_trip(&self, request: Request<Body>) -> Result<Response<Self::Body>>;
}

/// HTTP client transport over a handle-based [`Substrate`].
///
/// Holds no per-call state: every round trip owns its own chain of
/// handles, so concurrent calls on a shared transport are independent.
pub struct Transport<S: Substrate> {
    substrate: Arc<S>,
    config: ClientConfig,
}

impl<S: Substrate> Transport<S> {
    pub fn new(substrate: S) -> Self {
        Self::with_config(substrate, ClientConfig::default())
    }

    pub fn with_config(substrate: S, config: ClientConfig) -> Self {
        Self {
            substrate: Arc::new(substrate),
            config,
        }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Perform one round trip.
    ///
    /// Blocks the calling thread while the substrate resolves the
    /// response. There is no timeout at this layer.
    pub fn execute(&self, request: Request<Body>) -> Result<Response<ResponseBody<S>>> {
        let s = &*self.substrate;
        let (parts, body) = request.into_parts();

        let entries = convert::headers_to_fields(&parts.headers, self.config.header_encoding);
        let fields = s.fields_from_list(&entries).map_err(Error::Headers)?;
        let outgoing = s.new_outgoing_request(fields);

        let method = convert::method_to_substrate(&parts.method);
        let scheme = convert::scheme_to_substrate(parts.uri.scheme_str().unwrap_or(""));
        let authority = convert::authority(&parts.uri);
        let path = convert::path_with_query(&parts.uri);

        s.set_method(&outgoing, &method)
            .map_err(|()| Error::RequestField("method"))?;
        s.set_path_with_query(&outgoing, Some(&path))
            .map_err(|()| Error::RequestField("path"))?;
        s.set_scheme(&outgoing, Some(&scheme))
            .map_err(|()| Error::RequestField("scheme"))?;
        s.set_authority(&outgoing, Some(&authority))
            .map_err(|()| Error::RequestField("authority"))?;

        let outgoing_body = s
            .outgoing_body(&outgoing)
            .map_err(|e| Error::BodyWrite(e.to_string()))?;
        if let Some(bytes) = body.into_bytes()? {
            let stream = s
                .body_writer(&outgoing_body)
                .map_err(|e| Error::BodyWrite(e.to_string()))?;
            tracing::trace!(bytes = bytes.len(), "writing request body");
            let written = s.blocking_write_and_flush(&stream, &bytes);
            drop(stream);
            written.map_err(|e| Error::BodyWrite(e.to_string()))?;
        }
        s.finish_body(outgoing_body).map_err(Error::BodyFinish)?;

        tracing::debug!(
            method = %method,
            scheme = %scheme,
            authority = %authority,
            path = %path,
            "sending outbound request"
        );

        let InFlight { future, request } = s.handle(outgoing).map_err(Error::Send)?;

        let pollable = s.subscribe(&future);
        s.block(&pollable);
        let outcome = s.future_get(&future);
        drop(pollable);

        let incoming = match outcome {
            ResponseOutcome::Ready(incoming) => incoming,
            ResponseOutcome::Pending => {
                return Err(Error::ResponseUnavailable(ResponseFailure::Pending));
            }
            ResponseOutcome::Taken => {
                return Err(Error::ResponseUnavailable(ResponseFailure::Taken));
            }
            ResponseOutcome::Failed(code) => {
                return Err(Error::ResponseUnavailable(ResponseFailure::Protocol(
                    code.message().to_string(),
                )));
            }
        };

        let code = s.status(&incoming);
        let status = StatusCode::from_u16(code).map_err(|_| Error::InvalidStatus(code))?;

        let fields = s.response_headers(&incoming);
        let entries = s.field_entries(&fields);
        drop(fields);
        let headers = convert::headers_from_fields(entries)?;
        let content_length = convert::content_length(&headers)?;

        tracing::debug!(
            status = status.as_u16(),
            content_length = ?content_length,
            "received outbound response"
        );

        let incoming_body = s.consume(&incoming).map_err(Error::Consume)?;
        let stream = s.body_stream(&incoming_body).map_err(Error::BodyStream)?;

        let body = ResponseBody::new(
            Arc::clone(&self.substrate),
            stream,
            incoming_body,
            incoming,
            future,
            request,
            content_length,
        )
        .with_chunk_size(self.config.chunk_size);

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response.extensions_mut().insert(StatusText(status_text(status)));
        Ok(response)
    }
}

impl<S: Substrate> RoundTrip for Transport<S> {
    type Body = ResponseBody<S>;

    fn round_trip(&self, request: Request<Body>) -> Result<Response<ResponseBody<S>>> {
        self.execute(request)
    }
}

/// Reason phrase of a response, stored in its extensions.
///
/// ```
/// use warpgrid_http_client::{Body, MemoryResponse, MemorySubstrate, StatusText, Transport};
///
/// let substrate = MemorySubstrate::new().with_response(MemoryResponse::new(404));
/// let transport = Transport::new(substrate);
/// let request = http::Request::get("http://example.test/")
///     .body(Body::empty())
///     .unwrap();
/// let response = transport.execute(request).unwrap();
/// assert_eq!(response.extensions().get::<StatusText>(), Some(&StatusText("Not Found")));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusText(pub &'static str);

/// The standard reason phrase for a status, empty when the code has none.
///
/// The substrate exposes no reason phrase, so this table is the only
/// source of status text.
pub fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderEncoding;
    use crate::error::StreamError;
    use crate::memory::{HandleKind, MemoryOutcome, MemoryResponse, MemorySubstrate};
    use crate::substrate::{Method, Scheme};

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn sets_every_request_field() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(204)));
        let response = transport
            .execute(get("https://api.example.test:8443/v1/items?page=2"))
            .unwrap();
        response.into_body().close().unwrap();

        let recorded = transport.substrate().requests();
        assert_eq!(recorded.len(), 1);
        let req = &recorded[0];
        assert_eq!(req.method, Some(Method::Get));
        assert_eq!(req.scheme, Some(Scheme::Https));
        assert_eq!(req.authority.as_deref(), Some("api.example.test:8443"));
        assert_eq!(req.path_with_query.as_deref(), Some("/v1/items?page=2"));
        assert!(req.headers.is_empty());
        assert!(req.writes.is_empty());
        assert!(req.finished);
    }

    #[test]
    fn relative_uri_sets_empty_authority_and_other_scheme() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(200)));
        transport.execute(get("/healthz")).unwrap();

        let req = &transport.substrate().requests()[0];
        assert_eq!(req.scheme, Some(Scheme::Other(String::new())));
        assert_eq!(req.authority.as_deref(), Some(""));
        assert_eq!(req.path_with_query.as_deref(), Some("/healthz"));
    }

    #[test]
    fn extension_method_passes_through() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(200)));
        let request = Request::builder()
            .method(http::Method::from_bytes(b"PURGE").unwrap())
            .uri("http://cache.test/asset")
            .body(Body::empty())
            .unwrap();
        transport.execute(request).unwrap();

        assert_eq!(
            transport.substrate().requests()[0].method,
            Some(Method::Other("PURGE".into()))
        );
    }

    #[test]
    fn multi_value_headers_follow_config() {
        for (encoding, expected) in [
            (HeaderEncoding::Concatenate, vec![("x-a".to_string(), b"12".to_vec())]),
            (
                HeaderEncoding::RepeatFields,
                vec![("x-a".to_string(), b"1".to_vec()), ("x-a".to_string(), b"2".to_vec())],
            ),
        ] {
            let config = ClientConfig::default().with_header_encoding(encoding);
            let transport = Transport::with_config(
                MemorySubstrate::new().with_response(MemoryResponse::new(200)),
                config,
            );
            let request = Request::get("http://example.test/")
                .header("x-a", "1")
                .header("x-a", "2")
                .body(Body::empty())
                .unwrap();
            transport.execute(request).unwrap();
            assert_eq!(transport.substrate().requests()[0].headers, expected);
        }
    }

    #[test]
    fn empty_body_never_opens_write_stream() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(200)));
        transport.execute(get("http://example.test/")).unwrap();

        let ledger = transport.substrate().ledger();
        assert_eq!(ledger.acquired(HandleKind::OutgoingBody), 1);
        assert_eq!(ledger.acquired(HandleKind::OutputStream), 0);
    }

    #[test]
    fn body_written_once_and_stream_released_before_submit() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(201)));
        let request = Request::post("http://example.test/items")
            .body(Body::from("payload"))
            .unwrap();
        let response = transport.execute(request).unwrap();

        let substrate = transport.substrate();
        assert_eq!(substrate.requests()[0].writes, vec![b"payload".to_vec()]);
        assert_eq!(substrate.ledger().released(HandleKind::OutputStream), 1);
        assert_eq!(substrate.ledger().released(HandleKind::OutgoingBody), 1);
        assert_eq!(substrate.ledger().released(HandleKind::Pollable), 1);
        assert_eq!(substrate.blocks(), 1);
        drop(response);
    }

    #[test]
    fn write_failure_carries_substrate_diagnostic() {
        let substrate = MemorySubstrate::new()
            .with_response(MemoryResponse::new(200))
            .fail_writes(StreamError::LastOperationFailed("broken pipe (os error 32)".into()));
        let transport = Transport::new(substrate);
        let request = Request::put("http://example.test/")
            .body(Body::from("payload"))
            .unwrap();

        let err = transport.execute(request).unwrap_err();
        assert!(matches!(err, Error::BodyWrite(_)));
        assert!(err.to_string().contains("broken pipe (os error 32)"));
        assert!(transport.substrate().requests().is_empty());
        assert_eq!(transport.substrate().ledger().outstanding(), 0);
    }

    #[test]
    fn finish_failure_is_terminal() {
        let transport = Transport::new(
            MemorySubstrate::new()
                .with_response(MemoryResponse::new(200))
                .fail_finish("trailers rejected"),
        );
        let err = transport.execute(get("http://example.test/")).unwrap_err();
        assert!(matches!(err, Error::BodyFinish(_)));
        assert!(transport.substrate().requests().is_empty());
        assert_eq!(transport.substrate().ledger().outstanding(), 0);
    }

    #[test]
    fn submit_failure_wraps_diagnostic() {
        let transport = Transport::new(MemorySubstrate::new().fail_submit("HTTPRequestDenied"));
        let err = transport.execute(get("http://example.test/")).unwrap_err();
        assert_eq!(err.to_string(), "failed to send request: HTTPRequestDenied");
        assert_eq!(transport.substrate().ledger().outstanding(), 0);
    }

    #[test]
    fn header_rejection_is_error() {
        let transport = Transport::new(MemorySubstrate::new().reject_headers("Forbidden"));
        let request = Request::get("http://example.test/")
            .header("connection", "close")
            .body(Body::empty())
            .unwrap();
        let err = transport.execute(request).unwrap_err();
        assert!(matches!(err, Error::Headers(_)));
    }

    #[test]
    fn every_future_failure_is_failed_to_get_response() {
        for (outcome, layer) in [
            (MemoryOutcome::Pending, ResponseFailure::Pending),
            (MemoryOutcome::Taken, ResponseFailure::Taken),
            (
                MemoryOutcome::Fail("DNSError".into()),
                ResponseFailure::Protocol("DNSError".into()),
            ),
        ] {
            let transport = Transport::new(MemorySubstrate::new().with_outcome(outcome));
            let err = transport.execute(get("http://example.test/")).unwrap_err();
            assert_eq!(err.to_string(), "failed to get response");
            match err {
                Error::ResponseUnavailable(failure) => assert_eq!(failure, layer),
                other => panic!("expected ResponseUnavailable, got {other:?}"),
            }
            assert_eq!(transport.substrate().ledger().outstanding(), 0);
        }
    }

    #[test]
    fn malformed_content_length_discards_response() {
        for value in ["abc", "-1"] {
            let transport = Transport::new(MemorySubstrate::new().with_response(
                MemoryResponse::new(200)
                    .header("content-length", value)
                    .body("x"),
            ));
            let err = transport.execute(get("http://example.test/")).unwrap_err();
            assert!(matches!(
                err,
                Error::MalformedContentLength(_) | Error::InvalidContentLength(_)
            ));
            assert_eq!(transport.substrate().ledger().outstanding(), 0);
        }
    }

    #[test]
    fn consume_failure_is_error() {
        let transport = Transport::new(
            MemorySubstrate::new()
                .with_response(MemoryResponse::new(200))
                .fail_consume("body taken"),
        );
        let err = transport.execute(get("http://example.test/")).unwrap_err();
        assert!(matches!(err, Error::Consume(_)));
        assert_eq!(transport.substrate().ledger().outstanding(), 0);
    }

    #[test]
    fn out_of_range_status_is_error() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(42)));
        let err = transport.execute(get("http://example.test/")).unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(42)));
    }

    #[test]
    fn response_handles_deferred_to_body_close() {
        let transport = Transport::new(
            MemorySubstrate::new().with_response(MemoryResponse::new(200).body("hello")),
        );
        let response = transport.execute(get("http://example.test/")).unwrap();

        let ledger = transport.substrate().ledger();
        // stream, body, response, future, request
        assert_eq!(ledger.outstanding(), 5);

        response.into_body().close().unwrap();
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn closed_write_stream_reports_closed() {
        let transport = Transport::new(
            MemorySubstrate::new()
                .with_response(MemoryResponse::new(200))
                .fail_writes(StreamError::Closed),
        );
        let request = Request::post("http://example.test/")
            .body(Body::from("payload"))
            .unwrap();

        let err = transport.execute(request).unwrap_err();
        assert!(matches!(err, Error::BodyWrite(ref d) if d == "closed"), "got {err:?}");
        assert_eq!(transport.substrate().ledger().outstanding(), 0);
    }

    #[test]
    fn rejected_setter_names_the_field() {
        for field in ["method", "path", "scheme", "authority"] {
            let transport = Transport::new(
                MemorySubstrate::new()
                    .with_response(MemoryResponse::new(200))
                    .fail_setter(field),
            );
            let err = transport.execute(get("http://example.test/")).unwrap_err();
            assert!(matches!(err, Error::RequestField(f) if f == field), "got {err:?}");
            assert!(transport.substrate().requests().is_empty());
            assert_eq!(transport.substrate().ledger().outstanding(), 0);
        }
    }

    #[test]
    fn write_stream_unavailable_is_body_write_error() {
        let transport = Transport::new(
            MemorySubstrate::new()
                .with_response(MemoryResponse::new(200))
                .fail_body_writer("output stream already taken"),
        );
        let request = Request::post("http://example.test/")
            .body(Body::from("payload"))
            .unwrap();

        let err = transport.execute(request).unwrap_err();
        assert!(
            matches!(err, Error::BodyWrite(ref d) if d == "output stream already taken"),
            "got {err:?}"
        );
        assert!(transport.substrate().requests().is_empty());
        assert_eq!(transport.substrate().ledger().outstanding(), 0);
    }

    #[test]
    fn body_stream_failure_releases_children_first() {
        let transport = Transport::new(
            MemorySubstrate::new()
                .with_response(MemoryResponse::new(200).body("unread"))
                .fail_body_stream("input stream already taken"),
        );
        let err = transport.execute(get("http://example.test/")).unwrap_err();
        assert!(matches!(err, Error::BodyStream(_)), "got {err:?}");

        let ledger = transport.substrate().ledger();
        assert_eq!(ledger.outstanding(), 0);
        let order = ledger.release_order();
        let position = |kind: HandleKind| order.iter().position(|&k| k == kind).unwrap();
        assert!(position(HandleKind::IncomingBody) < position(HandleKind::IncomingResponse));
        assert!(position(HandleKind::IncomingResponse) < position(HandleKind::FutureResponse));
    }

    #[test]
    fn response_carries_status_text() {
        let transport =
            Transport::new(MemorySubstrate::new().with_response(MemoryResponse::new(404)));
        let response = transport.execute(get("http://example.test/missing")).unwrap();
        assert_eq!(
            response.extensions().get::<StatusText>(),
            Some(&StatusText("Not Found"))
        );
    }

    #[test]
    fn status_text_from_standard_table() {
        assert_eq!(status_text(StatusCode::OK), "OK");
        assert_eq!(status_text(StatusCode::NOT_FOUND), "Not Found");
        assert_eq!(status_text(StatusCode::from_u16(599).unwrap()), "");
    }
}
