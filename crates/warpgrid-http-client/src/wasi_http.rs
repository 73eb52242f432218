//! `wasi:http@0.2` substrate.
//!
//! Binds [`Substrate`] to the host's `wasi:http/outgoing-handler` and
//! `wasi:io` resources through the `wasi` crate. Only compiled for
//! `wasm32-wasip2`.
//!
//! `outgoing-handler.handle` takes ownership of the request resource, so
//! [`InFlight::request`] is always `None` here.

use wasi::http::outgoing_handler;
use wasi::http::types::{
    ErrorCode, Fields, FutureIncomingResponse, IncomingBody, IncomingResponse, Method as WasiMethod,
    OutgoingBody, OutgoingRequest, Scheme as WasiScheme,
};
use wasi::io::poll::Pollable;
use wasi::io::streams::{InputStream, OutputStream, StreamError as WasiStreamError};

use crate::error::{StreamError, SubstrateError};
use crate::substrate::{FieldEntries, InFlight, Method, ResponseOutcome, Scheme, Substrate};
use crate::transport::Transport;

/// Largest payload accepted by one `blocking-write-and-flush` call.
const MAX_BLOCKING_WRITE: usize = 4096;

/// The host's `wasi:http` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasiSubstrate;

impl Transport<WasiSubstrate> {
    /// A transport over the host's `wasi:http` with the default config.
    pub fn wasi() -> Self {
        Self::new(WasiSubstrate)
    }
}

fn to_wasi_method(method: &Method) -> WasiMethod {
    match method {
        Method::Get => WasiMethod::Get,
        Method::Head => WasiMethod::Head,
        Method::Post => WasiMethod::Post,
        Method::Put => WasiMethod::Put,
        Method::Delete => WasiMethod::Delete,
        Method::Connect => WasiMethod::Connect,
        Method::Options => WasiMethod::Options,
        Method::Trace => WasiMethod::Trace,
        Method::Patch => WasiMethod::Patch,
        Method::Other(token) => WasiMethod::Other(token.clone()),
    }
}

fn to_wasi_scheme(scheme: &Scheme) -> WasiScheme {
    match scheme {
        Scheme::Http => WasiScheme::Http,
        Scheme::Https => WasiScheme::Https,
        Scheme::Other(other) => WasiScheme::Other(other.clone()),
    }
}

fn error_code(code: ErrorCode) -> SubstrateError {
    SubstrateError::new(format!("{code:?}"))
}

fn stream_error(error: WasiStreamError) -> StreamError {
    match error {
        WasiStreamError::Closed => StreamError::Closed,
        WasiStreamError::LastOperationFailed(e) => {
            StreamError::LastOperationFailed(e.to_debug_string())
        }
    }
}

impl Substrate for WasiSubstrate {
    type Fields = Fields;
    type OutgoingRequest = OutgoingRequest;
    type OutgoingBody = OutgoingBody;
    type OutputStream = OutputStream;
    type FutureResponse = FutureIncomingResponse;
    type Pollable = Pollable;
    type IncomingResponse = IncomingResponse;
    type IncomingBody = IncomingBody;
    type InputStream = InputStream;

    fn fields_from_list(&self, entries: &[(String, Vec<u8>)]) -> Result<Fields, SubstrateError> {
        Fields::from_list(entries).map_err(|e| SubstrateError::new(format!("{e:?}")))
    }

    fn field_entries(&self, fields: &Fields) -> FieldEntries {
        fields.entries()
    }

    fn new_outgoing_request(&self, headers: Fields) -> OutgoingRequest {
        OutgoingRequest::new(headers)
    }

    fn set_method(&self, request: &OutgoingRequest, method: &Method) -> Result<(), ()> {
        request.set_method(&to_wasi_method(method))
    }

    fn set_scheme(&self, request: &OutgoingRequest, scheme: Option<&Scheme>) -> Result<(), ()> {
        let scheme = scheme.map(to_wasi_scheme);
        request.set_scheme(scheme.as_ref())
    }

    fn set_authority(&self, request: &OutgoingRequest, authority: Option<&str>) -> Result<(), ()> {
        request.set_authority(authority)
    }

    fn set_path_with_query(&self, request: &OutgoingRequest, path: Option<&str>) -> Result<(), ()> {
        request.set_path_with_query(path)
    }

    fn outgoing_body(&self, request: &OutgoingRequest) -> Result<OutgoingBody, SubstrateError> {
        request
            .body()
            .map_err(|()| SubstrateError::new("outgoing request body already taken"))
    }

    fn body_writer(&self, body: &OutgoingBody) -> Result<OutputStream, SubstrateError> {
        body.write()
            .map_err(|()| SubstrateError::new("outgoing body stream already taken"))
    }

    fn blocking_write_and_flush(
        &self,
        stream: &OutputStream,
        contents: &[u8],
    ) -> Result<(), StreamError> {
        if contents.is_empty() {
            return stream.blocking_write_and_flush(contents).map_err(stream_error);
        }
        for chunk in contents.chunks(MAX_BLOCKING_WRITE) {
            stream.blocking_write_and_flush(chunk).map_err(stream_error)?;
        }
        Ok(())
    }

    fn finish_body(&self, body: OutgoingBody) -> Result<(), SubstrateError> {
        OutgoingBody::finish(body, None).map_err(error_code)
    }

    fn handle(&self, request: OutgoingRequest) -> Result<InFlight<Self>, SubstrateError> {
        let future = outgoing_handler::handle(request, None).map_err(error_code)?;
        Ok(InFlight {
            future,
            request: None,
        })
    }

    fn subscribe(&self, future: &FutureIncomingResponse) -> Pollable {
        future.subscribe()
    }

    fn block(&self, pollable: &Pollable) {
        pollable.block();
    }

    fn future_get(&self, future: &FutureIncomingResponse) -> ResponseOutcome<IncomingResponse> {
        match future.get() {
            None => ResponseOutcome::Pending,
            Some(Err(())) => ResponseOutcome::Taken,
            Some(Ok(Err(code))) => ResponseOutcome::Failed(error_code(code)),
            Some(Ok(Ok(response))) => ResponseOutcome::Ready(response),
        }
    }

    fn status(&self, response: &IncomingResponse) -> u16 {
        response.status()
    }

    fn response_headers(&self, response: &IncomingResponse) -> Fields {
        response.headers()
    }

    fn consume(&self, response: &IncomingResponse) -> Result<IncomingBody, SubstrateError> {
        response
            .consume()
            .map_err(|()| SubstrateError::new("incoming response body already consumed"))
    }

    fn body_stream(&self, body: &IncomingBody) -> Result<InputStream, SubstrateError> {
        body.stream()
            .map_err(|()| SubstrateError::new("incoming body stream already taken"))
    }

    fn blocking_read(&self, stream: &InputStream, len: u64) -> Result<Vec<u8>, StreamError> {
        stream.blocking_read(len).map_err(stream_error)
    }
}
