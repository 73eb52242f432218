//! In-memory substrate.
//!
//! [`MemorySubstrate`] implements [`Substrate`] without a host: responses
//! are scripted up front, every submitted request is recorded, and every
//! handle acquisition and release is counted in a [`HandleLedger`]. It
//! lets code built on [`Transport`](crate::Transport) run on native
//! targets and in tests.
//!
//! ```text
//! MemorySubstrate::new()
//!     .with_response(MemoryResponse::new(200).header("content-length", "5").body("hello"))
//!   → Transport::new(substrate).round_trip(request)
//!     → requests() records method/scheme/authority/path/headers/writes
//!     → ledger() counts every handle acquired and released
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{StreamError, SubstrateError};
use crate::substrate::{FieldEntries, InFlight, Method, ResponseOutcome, Scheme, Substrate};

/// Kinds of handle the substrate hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Fields,
    OutgoingRequest,
    OutgoingBody,
    OutputStream,
    FutureResponse,
    Pollable,
    IncomingResponse,
    IncomingBody,
    InputStream,
}

impl HandleKind {
    pub const ALL: [HandleKind; 9] = [
        HandleKind::Fields,
        HandleKind::OutgoingRequest,
        HandleKind::OutgoingBody,
        HandleKind::OutputStream,
        HandleKind::FutureResponse,
        HandleKind::Pollable,
        HandleKind::IncomingResponse,
        HandleKind::IncomingBody,
        HandleKind::InputStream,
    ];
}

/// Acquisition and release counts for every handle kind.
#[derive(Debug, Default)]
pub struct HandleLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    acquired: HashMap<HandleKind, usize>,
    released: HashMap<HandleKind, usize>,
    release_order: Vec<HandleKind>,
}

impl HandleLedger {
    pub fn acquired(&self, kind: HandleKind) -> usize {
        let state = self.state.lock().unwrap();
        state.acquired.get(&kind).copied().unwrap_or(0)
    }

    pub fn released(&self, kind: HandleKind) -> usize {
        let state = self.state.lock().unwrap();
        state.released.get(&kind).copied().unwrap_or(0)
    }

    /// Handles acquired but not yet released, across all kinds.
    pub fn outstanding(&self) -> usize {
        HandleKind::ALL
            .iter()
            .map(|&kind| self.acquired(kind) - self.released(kind))
            .sum()
    }

    /// Every release so far, oldest first.
    pub fn release_order(&self) -> Vec<HandleKind> {
        self.state.lock().unwrap().release_order.clone()
    }

    fn acquire(&self, kind: HandleKind) {
        let mut state = self.state.lock().unwrap();
        *state.acquired.entry(kind).or_insert(0) += 1;
    }

    fn release(&self, kind: HandleKind) {
        let mut state = self.state.lock().unwrap();
        *state.released.entry(kind).or_insert(0) += 1;
        state.release_order.push(kind);
    }
}

/// Registers a handle in the ledger on creation and releases it on drop.
#[derive(Debug)]
struct Tracked {
    kind: HandleKind,
    ledger: Arc<HandleLedger>,
}

impl Tracked {
    fn new(kind: HandleKind, ledger: &Arc<HandleLedger>) -> Self {
        ledger.acquire(kind);
        Self {
            kind,
            ledger: Arc::clone(ledger),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.ledger.release(self.kind);
    }
}

// ── Scripts ─────────────────────────────────────────────────────────

/// A scripted response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryResponse {
    pub status: u16,
    pub headers: FieldEntries,
    /// Body chunks, delivered in order. A read smaller than the current
    /// chunk splits it.
    pub chunks: Vec<Vec<u8>>,
    /// Returned as `last-operation-failed` once the chunks run out,
    /// instead of closing the stream.
    pub read_failure: Option<String>,
}

impl MemoryResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            chunks: Vec::new(),
            read_failure: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.headers.push((name.into(), value.as_ref().to_vec()));
        self
    }

    /// Append one body chunk.
    pub fn body(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.chunks.push(chunk.as_ref().to_vec());
        self
    }

    pub fn chunks<I, C>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        self.chunks
            .extend(chunks.into_iter().map(|c| c.as_ref().to_vec()));
        self
    }

    pub fn read_failure(mut self, diagnostic: impl Into<String>) -> Self {
        self.read_failure = Some(diagnostic.into());
        self
    }
}

/// How the future of one submitted request resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryOutcome {
    Respond(MemoryResponse),
    /// Protocol-level error code, as rendered by the host.
    Fail(String),
    /// The future never gets a value.
    Pending,
    /// The value was already taken.
    Taken,
}

/// A request as it reached the substrate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Option<Method>,
    pub scheme: Option<Scheme>,
    pub authority: Option<String>,
    pub path_with_query: Option<String>,
    pub headers: FieldEntries,
    /// Payload of every `blocking-write-and-flush` call, in order.
    pub writes: Vec<Vec<u8>>,
    pub finished: bool,
}

#[derive(Debug, Default)]
struct Faults {
    headers: Option<String>,
    setter: Option<&'static str>,
    body_writer: Option<String>,
    write: Option<StreamError>,
    finish: Option<String>,
    submit: Option<String>,
    consume: Option<String>,
    body_stream: Option<String>,
}

/// A [`Substrate`] backed entirely by memory.
#[derive(Debug)]
pub struct MemorySubstrate {
    ledger: Arc<HandleLedger>,
    outcomes: Mutex<VecDeque<MemoryOutcome>>,
    requests: Mutex<Vec<RecordedRequest>>,
    faults: Faults,
    retain_requests: bool,
    blocks: AtomicUsize,
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubstrate {
    /// A substrate with nothing scripted. Submitted requests are handed
    /// back by `handle` so the response body keeps them alive.
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(HandleLedger::default()),
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            faults: Faults::default(),
            retain_requests: true,
            blocks: AtomicUsize::new(0),
        }
    }

    /// Builder method: queue a response for the next submitted request.
    pub fn with_response(self, response: MemoryResponse) -> Self {
        self.with_outcome(MemoryOutcome::Respond(response))
    }

    /// Builder method: queue an outcome for the next submitted request.
    pub fn with_outcome(self, outcome: MemoryOutcome) -> Self {
        self.push_outcome(outcome);
        self
    }

    /// Builder method: consume requests on submission instead of handing
    /// them back.
    pub fn consuming_requests(self) -> Self {
        Self {
            retain_requests: false,
            ..self
        }
    }

    /// Builder method: reject every header list with `diagnostic`.
    pub fn reject_headers(mut self, diagnostic: impl Into<String>) -> Self {
        self.faults.headers = Some(diagnostic.into());
        self
    }

    /// Builder method: reject one request setter (`"method"`, `"scheme"`,
    /// `"authority"` or `"path"`).
    pub fn fail_setter(mut self, field: &'static str) -> Self {
        self.faults.setter = Some(field);
        self
    }

    /// Builder method: fail every attempt to open a body write stream.
    pub fn fail_body_writer(mut self, diagnostic: impl Into<String>) -> Self {
        self.faults.body_writer = Some(diagnostic.into());
        self
    }

    /// Builder method: fail every body write.
    pub fn fail_writes(mut self, error: StreamError) -> Self {
        self.faults.write = Some(error);
        self
    }

    /// Builder method: fail every body finish.
    pub fn fail_finish(mut self, diagnostic: impl Into<String>) -> Self {
        self.faults.finish = Some(diagnostic.into());
        self
    }

    /// Builder method: fail every submission.
    pub fn fail_submit(mut self, diagnostic: impl Into<String>) -> Self {
        self.faults.submit = Some(diagnostic.into());
        self
    }

    /// Builder method: fail every attempt to consume a response body.
    pub fn fail_consume(mut self, diagnostic: impl Into<String>) -> Self {
        self.faults.consume = Some(diagnostic.into());
        self
    }

    /// Builder method: fail every attempt to open a response body stream.
    pub fn fail_body_stream(mut self, diagnostic: impl Into<String>) -> Self {
        self.faults.body_stream = Some(diagnostic.into());
        self
    }

    fn setter(&self, field: &str) -> Result<(), ()> {
        match self.faults.setter {
            Some(rejected) if rejected == field => Err(()),
            _ => Ok(()),
        }
    }

    pub fn push_outcome(&self, outcome: MemoryOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Requests submitted so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn ledger(&self) -> &HandleLedger {
        &self.ledger
    }

    /// Number of times a caller blocked on a pollable.
    pub fn blocks(&self) -> usize {
        self.blocks.load(Ordering::Relaxed)
    }

    /// A standalone input stream yielding `chunks`, then closing.
    pub fn input_stream<I, C>(&self, chunks: I) -> MemoryInputStream
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        MemoryInputStream::new(
            chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            None,
            &self.ledger,
        )
    }
}

// ── Handles ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryFields {
    entries: FieldEntries,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryOutgoingRequest {
    record: Arc<Mutex<RecordedRequest>>,
    body_taken: Mutex<bool>,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryOutgoingBody {
    record: Arc<Mutex<RecordedRequest>>,
    writer_taken: Mutex<bool>,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryOutputStream {
    record: Arc<Mutex<RecordedRequest>>,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryFutureResponse {
    outcome: Mutex<Option<MemoryOutcome>>,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryPollable {
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryIncomingResponse {
    status: u16,
    headers: FieldEntries,
    body: Mutex<Option<(VecDeque<Vec<u8>>, Option<String>)>>,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryIncomingBody {
    script: Mutex<Option<(VecDeque<Vec<u8>>, Option<String>)>>,
    _handle: Tracked,
}

#[derive(Debug)]
pub struct MemoryInputStream {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    failure: Option<String>,
    _handle: Tracked,
}

impl MemoryInputStream {
    fn new(chunks: VecDeque<Vec<u8>>, failure: Option<String>, ledger: &Arc<HandleLedger>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
            failure,
            _handle: Tracked::new(HandleKind::InputStream, ledger),
        }
    }
}

impl Substrate for MemorySubstrate {
    type Fields = MemoryFields;
    type OutgoingRequest = MemoryOutgoingRequest;
    type OutgoingBody = MemoryOutgoingBody;
    type OutputStream = MemoryOutputStream;
    type FutureResponse = MemoryFutureResponse;
    type Pollable = MemoryPollable;
    type IncomingResponse = MemoryIncomingResponse;
    type IncomingBody = MemoryIncomingBody;
    type InputStream = MemoryInputStream;

    fn fields_from_list(
        &self,
        entries: &[(String, Vec<u8>)],
    ) -> Result<MemoryFields, SubstrateError> {
        if let Some(diagnostic) = &self.faults.headers {
            return Err(SubstrateError::new(diagnostic.clone()));
        }
        Ok(MemoryFields {
            entries: entries.to_vec(),
            _handle: Tracked::new(HandleKind::Fields, &self.ledger),
        })
    }

    fn field_entries(&self, fields: &MemoryFields) -> FieldEntries {
        fields.entries.clone()
    }

    fn new_outgoing_request(&self, headers: MemoryFields) -> MemoryOutgoingRequest {
        let record = RecordedRequest {
            headers: headers.entries.clone(),
            ..RecordedRequest::default()
        };
        MemoryOutgoingRequest {
            record: Arc::new(Mutex::new(record)),
            body_taken: Mutex::new(false),
            _handle: Tracked::new(HandleKind::OutgoingRequest, &self.ledger),
        }
    }

    fn set_method(&self, request: &MemoryOutgoingRequest, method: &Method) -> Result<(), ()> {
        self.setter("method")?;
        request.record.lock().unwrap().method = Some(method.clone());
        Ok(())
    }

    fn set_scheme(
        &self,
        request: &MemoryOutgoingRequest,
        scheme: Option<&Scheme>,
    ) -> Result<(), ()> {
        self.setter("scheme")?;
        request.record.lock().unwrap().scheme = scheme.cloned();
        Ok(())
    }

    fn set_authority(
        &self,
        request: &MemoryOutgoingRequest,
        authority: Option<&str>,
    ) -> Result<(), ()> {
        self.setter("authority")?;
        request.record.lock().unwrap().authority = authority.map(str::to_string);
        Ok(())
    }

    fn set_path_with_query(
        &self,
        request: &MemoryOutgoingRequest,
        path: Option<&str>,
    ) -> Result<(), ()> {
        self.setter("path")?;
        request.record.lock().unwrap().path_with_query = path.map(str::to_string);
        Ok(())
    }

    fn outgoing_body(
        &self,
        request: &MemoryOutgoingRequest,
    ) -> Result<MemoryOutgoingBody, SubstrateError> {
        let mut taken = request.body_taken.lock().unwrap();
        if *taken {
            return Err(SubstrateError::new("outgoing body already taken"));
        }
        *taken = true;
        Ok(MemoryOutgoingBody {
            record: Arc::clone(&request.record),
            writer_taken: Mutex::new(false),
            _handle: Tracked::new(HandleKind::OutgoingBody, &self.ledger),
        })
    }

    fn body_writer(&self, body: &MemoryOutgoingBody) -> Result<MemoryOutputStream, SubstrateError> {
        if let Some(diagnostic) = &self.faults.body_writer {
            return Err(SubstrateError::new(diagnostic.clone()));
        }
        let mut taken = body.writer_taken.lock().unwrap();
        if *taken {
            return Err(SubstrateError::new("output stream already taken"));
        }
        *taken = true;
        Ok(MemoryOutputStream {
            record: Arc::clone(&body.record),
            _handle: Tracked::new(HandleKind::OutputStream, &self.ledger),
        })
    }

    fn blocking_write_and_flush(
        &self,
        stream: &MemoryOutputStream,
        contents: &[u8],
    ) -> Result<(), StreamError> {
        if let Some(error) = &self.faults.write {
            return Err(error.clone());
        }
        stream.record.lock().unwrap().writes.push(contents.to_vec());
        Ok(())
    }

    fn finish_body(&self, body: MemoryOutgoingBody) -> Result<(), SubstrateError> {
        if let Some(diagnostic) = &self.faults.finish {
            return Err(SubstrateError::new(diagnostic.clone()));
        }
        body.record.lock().unwrap().finished = true;
        Ok(())
    }

    fn handle(&self, request: MemoryOutgoingRequest) -> Result<InFlight<Self>, SubstrateError> {
        if let Some(diagnostic) = &self.faults.submit {
            return Err(SubstrateError::new(diagnostic.clone()));
        }
        let Some(outcome) = self.outcomes.lock().unwrap().pop_front() else {
            return Err(SubstrateError::new("no response scripted"));
        };
        let snapshot = request.record.lock().unwrap().clone();
        self.requests.lock().unwrap().push(snapshot);

        let future = MemoryFutureResponse {
            outcome: Mutex::new(Some(outcome)),
            _handle: Tracked::new(HandleKind::FutureResponse, &self.ledger),
        };
        Ok(InFlight {
            future,
            request: self.retain_requests.then_some(request),
        })
    }

    fn subscribe(&self, _future: &MemoryFutureResponse) -> MemoryPollable {
        MemoryPollable {
            _handle: Tracked::new(HandleKind::Pollable, &self.ledger),
        }
    }

    fn block(&self, _pollable: &MemoryPollable) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    fn future_get(&self, future: &MemoryFutureResponse) -> ResponseOutcome<MemoryIncomingResponse> {
        let mut slot = future.outcome.lock().unwrap();
        match slot.take() {
            None | Some(MemoryOutcome::Taken) => ResponseOutcome::Taken,
            Some(MemoryOutcome::Pending) => {
                *slot = Some(MemoryOutcome::Pending);
                ResponseOutcome::Pending
            }
            Some(MemoryOutcome::Fail(code)) => ResponseOutcome::Failed(SubstrateError::new(code)),
            Some(MemoryOutcome::Respond(response)) => {
                ResponseOutcome::Ready(MemoryIncomingResponse {
                    status: response.status,
                    headers: response.headers,
                    body: Mutex::new(Some((response.chunks.into(), response.read_failure))),
                    _handle: Tracked::new(HandleKind::IncomingResponse, &self.ledger),
                })
            }
        }
    }

    fn status(&self, response: &MemoryIncomingResponse) -> u16 {
        response.status
    }

    fn response_headers(&self, response: &MemoryIncomingResponse) -> MemoryFields {
        MemoryFields {
            entries: response.headers.clone(),
            _handle: Tracked::new(HandleKind::Fields, &self.ledger),
        }
    }

    fn consume(
        &self,
        response: &MemoryIncomingResponse,
    ) -> Result<MemoryIncomingBody, SubstrateError> {
        if let Some(diagnostic) = &self.faults.consume {
            return Err(SubstrateError::new(diagnostic.clone()));
        }
        let Some(script) = response.body.lock().unwrap().take() else {
            return Err(SubstrateError::new("response body already consumed"));
        };
        Ok(MemoryIncomingBody {
            script: Mutex::new(Some(script)),
            _handle: Tracked::new(HandleKind::IncomingBody, &self.ledger),
        })
    }

    fn body_stream(&self, body: &MemoryIncomingBody) -> Result<MemoryInputStream, SubstrateError> {
        if let Some(diagnostic) = &self.faults.body_stream {
            return Err(SubstrateError::new(diagnostic.clone()));
        }
        let Some((chunks, failure)) = body.script.lock().unwrap().take() else {
            return Err(SubstrateError::new("input stream already taken"));
        };
        Ok(MemoryInputStream::new(chunks, failure, &self.ledger))
    }

    fn blocking_read(&self, stream: &MemoryInputStream, len: u64) -> Result<Vec<u8>, StreamError> {
        let mut chunks = stream.chunks.lock().unwrap();
        let Some(mut chunk) = chunks.pop_front() else {
            return Err(match &stream.failure {
                Some(diagnostic) => StreamError::LastOperationFailed(diagnostic.clone()),
                None => StreamError::Closed,
            });
        };
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if chunk.len() > len {
            let rest = chunk.split_off(len);
            chunks.push_front(rest);
        }
        Ok(chunk)
    }
}
