//! The handle-based HTTP capability set the client is written against.
//!
//! A [`Substrate`] is the host-provided HTTP facility: every piece of
//! state lives behind an opaque handle, readiness is signalled through
//! pollables, and handles must be released explicitly. Each handle kind
//! is an associated type, and releasing a handle is dropping it, so a
//! handle is released exactly once by construction.
//!
//! # Handle chain
//!
//! ```text
//! fields ──► outgoing-request ──► outgoing-body ──► output-stream
//!                  │                    (finished)      (dropped after write)
//!                  ▼
//!          future-response ──► pollable (dropped after block)
//!                  │
//!                  ▼
//!          incoming-response ──► incoming-body ──► input-stream
//! ```
//!
//! Operations that consume a handle in the substrate (`new_outgoing_request`,
//! `finish_body`, `handle`) take it by value.

use crate::error::{StreamError, SubstrateError};

/// HTTP method as understood by the substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    /// Any non-standard method token, carried verbatim.
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Other(token) => token,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URI scheme as understood by the substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    /// Any other scheme, including the empty one, carried verbatim.
    Other(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Other(scheme) => scheme,
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution of a pending response, flattened from the substrate's
/// nested `option<result<result<response, error-code>>>`.
#[derive(Debug)]
pub enum ResponseOutcome<R> {
    /// No value yet.
    Pending,
    /// The value was already retrieved by an earlier call.
    Taken,
    /// The exchange failed with a protocol-level error code.
    Failed(SubstrateError),
    /// The response arrived.
    Ready(R),
}

/// What the substrate hands back after a request is submitted.
pub struct InFlight<S: Substrate + ?Sized> {
    /// Pollable future resolving to the incoming response.
    pub future: S::FutureResponse,
    /// The submitted request, when this substrate requires it to stay
    /// alive until the response has been consumed. `None` when
    /// submission consumed it.
    pub request: Option<S::OutgoingRequest>,
}

/// Header entries as exchanged with the substrate: name and raw value bytes.
pub type FieldEntries = Vec<(String, Vec<u8>)>;

/// The capability set consumed by [`Transport`](crate::Transport).
///
/// Implementations must not block anywhere except in [`block`](Substrate::block),
/// [`blocking_write_and_flush`](Substrate::blocking_write_and_flush) and
/// [`blocking_read`](Substrate::blocking_read).
pub trait Substrate {
    type Fields;
    type OutgoingRequest;
    type OutgoingBody;
    type OutputStream;
    type FutureResponse;
    type Pollable;
    type IncomingResponse;
    type IncomingBody;
    type InputStream;

    // ── Fields ──────────────────────────────────────────────────────

    /// Build a header-fields resource from a list of entries.
    fn fields_from_list(
        &self,
        entries: &[(String, Vec<u8>)],
    ) -> Result<Self::Fields, SubstrateError>;

    /// Snapshot all entries of a fields resource, in order.
    fn field_entries(&self, fields: &Self::Fields) -> FieldEntries;

    // ── Outgoing request ────────────────────────────────────────────

    fn new_outgoing_request(&self, headers: Self::Fields) -> Self::OutgoingRequest;

    fn set_method(&self, request: &Self::OutgoingRequest, method: &Method) -> Result<(), ()>;

    fn set_scheme(
        &self,
        request: &Self::OutgoingRequest,
        scheme: Option<&Scheme>,
    ) -> Result<(), ()>;

    fn set_authority(
        &self,
        request: &Self::OutgoingRequest,
        authority: Option<&str>,
    ) -> Result<(), ()>;

    fn set_path_with_query(
        &self,
        request: &Self::OutgoingRequest,
        path: Option<&str>,
    ) -> Result<(), ()>;

    /// Obtain the request's body resource. Succeeds at most once per request.
    fn outgoing_body(
        &self,
        request: &Self::OutgoingRequest,
    ) -> Result<Self::OutgoingBody, SubstrateError>;

    /// Obtain the write stream of an outgoing body. Succeeds at most once.
    fn body_writer(&self, body: &Self::OutgoingBody) -> Result<Self::OutputStream, SubstrateError>;

    fn blocking_write_and_flush(
        &self,
        stream: &Self::OutputStream,
        contents: &[u8],
    ) -> Result<(), StreamError>;

    /// Finalize an outgoing body without trailers.
    fn finish_body(&self, body: Self::OutgoingBody) -> Result<(), SubstrateError>;

    // ── Submission and readiness ────────────────────────────────────

    /// Submit a request with default options.
    fn handle(&self, request: Self::OutgoingRequest) -> Result<InFlight<Self>, SubstrateError>;

    fn subscribe(&self, future: &Self::FutureResponse) -> Self::Pollable;

    /// Block the calling thread until the pollable is ready.
    fn block(&self, pollable: &Self::Pollable);

    fn future_get(&self, future: &Self::FutureResponse) -> ResponseOutcome<Self::IncomingResponse>;

    // ── Incoming response ───────────────────────────────────────────

    fn status(&self, response: &Self::IncomingResponse) -> u16;

    fn response_headers(&self, response: &Self::IncomingResponse) -> Self::Fields;

    /// Take the response body. Succeeds at most once per response.
    fn consume(
        &self,
        response: &Self::IncomingResponse,
    ) -> Result<Self::IncomingBody, SubstrateError>;

    /// Obtain the read stream of an incoming body. Succeeds at most once.
    fn body_stream(&self, body: &Self::IncomingBody) -> Result<Self::InputStream, SubstrateError>;

    /// Read up to `len` bytes, blocking until at least one byte is
    /// available or the stream ends. End-of-stream is `Err(StreamError::Closed)`.
    ///
    /// An open stream returns a non-empty chunk or an error. Readers
    /// tolerate a few empty chunks as spurious wakeups, then fail the read.
    fn blocking_read(&self, stream: &Self::InputStream, len: u64) -> Result<Vec<u8>, StreamError>;
}
