//! Response body readers.
//!
//! [`ResponseBody`] turns the substrate's input stream into a plain
//! [`std::io::Read`] and owns every handle that has to stay alive while
//! the body is streamed. The handles are released together, once, when
//! the body is closed or dropped.
//!
//! # Teardown order
//!
//! ```text
//! input-stream → incoming-body → incoming-response → future → outgoing-request
//! ```
//!
//! Children go before their parents: the stream belongs to the body, the
//! body to the response, the response to the future.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;

use crate::error::{Error, Result, StreamError};
use crate::substrate::Substrate;

/// Consecutive empty chunks tolerated before a read is failed.
const MAX_EMPTY_READS: usize = 16;

/// A [`Read`] adapter over a bare substrate input stream.
///
/// Owns only the stream handle. Closing (or dropping) the reader
/// releases it.
pub struct InputStreamReader<S: Substrate> {
    substrate: Arc<S>,
    stream: Option<S::InputStream>,
    /// Bytes returned by the substrate beyond what the caller asked for.
    pending: Bytes,
}

impl<S: Substrate> InputStreamReader<S> {
    pub fn new(substrate: Arc<S>, stream: S::InputStream) -> Self {
        Self {
            substrate,
            stream: Some(stream),
            pending: Bytes::new(),
        }
    }

    /// Read the next chunk of at most `max` bytes.
    ///
    /// `Ok(None)` once the substrate reports the stream closed. A chunk
    /// shorter than `max` is not end-of-stream.
    pub fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        let max = max.max(1);
        if !self.pending.is_empty() {
            let n = max.min(self.pending.len());
            return Ok(Some(self.pending.split_to(n)));
        }
        let Some(stream) = self.stream.as_ref() else {
            return Ok(None);
        };
        let mut empty_reads = 0;
        loop {
            match self.substrate.blocking_read(stream, max as u64) {
                Ok(chunk) if chunk.is_empty() => {
                    empty_reads += 1;
                    if empty_reads > MAX_EMPTY_READS {
                        return Err(Error::BodyRead(format!(
                            "input stream returned {empty_reads} empty reads in a row"
                        )));
                    }
                }
                Ok(chunk) => {
                    let mut chunk = Bytes::from(chunk);
                    if chunk.len() > max {
                        self.pending = chunk.split_off(max);
                    }
                    tracing::trace!(bytes = chunk.len(), "input stream read");
                    return Ok(Some(chunk));
                }
                Err(StreamError::Closed) => return Ok(None),
                Err(StreamError::LastOperationFailed(diagnostic)) => {
                    return Err(Error::BodyRead(diagnostic));
                }
            }
        }
    }

    /// Release the stream handle.
    pub fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        self.pending = Bytes::new();
        drop(self.stream.take());
    }
}

impl<S: Substrate> Read for InputStreamReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.read_chunk(buf.len())? {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }
}

/// Handles that must outlive body streaming, released as one unit.
struct Retained<S: Substrate> {
    body: S::IncomingBody,
    response: S::IncomingResponse,
    future: S::FutureResponse,
    request: Option<S::OutgoingRequest>,
}

impl<S: Substrate> Retained<S> {
    fn release(self) {
        let Self {
            body,
            response,
            future,
            request,
        } = self;
        drop(body);
        drop(response);
        drop(future);
        drop(request);
    }
}

/// The body of a response returned by [`Transport`](crate::Transport).
///
/// Reads are blocking and sequential. The body owns the full handle
/// bundle of its exchange (input stream, incoming body, incoming
/// response, future, and the outgoing request when the substrate hands
/// it back) and releases all of them in [`close`](ResponseBody::close).
/// Dropping an unclosed body performs the same teardown.
pub struct ResponseBody<S: Substrate> {
    reader: Option<InputStreamReader<S>>,
    retained: Option<Retained<S>>,
    content_length: Option<u64>,
    chunk_size: usize,
}

impl<S: Substrate> ResponseBody<S> {
    pub(crate) fn new(
        substrate: Arc<S>,
        stream: S::InputStream,
        body: S::IncomingBody,
        response: S::IncomingResponse,
        future: S::FutureResponse,
        request: Option<S::OutgoingRequest>,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            reader: Some(InputStreamReader::new(substrate, stream)),
            retained: Some(Retained {
                body,
                response,
                future,
                request,
            }),
            content_length,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }

    pub(crate) fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// The parsed `Content-Length` of the response, `None` when unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the next chunk of at most `max` bytes; `Ok(None)` at end-of-stream.
    pub fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        match self.reader.as_mut() {
            Some(reader) => reader.read_chunk(max.max(1)),
            None => Ok(None),
        }
    }

    /// Drain the rest of the body into one buffer, then close it.
    pub fn bytes(mut self) -> Result<Bytes> {
        let chunk_size = self.chunk_size;
        let capacity = self.content_length.unwrap_or(0).min(chunk_size as u64);
        let mut collected = BytesMut::with_capacity(capacity as usize);
        while let Some(chunk) = self.read_chunk(chunk_size)? {
            collected.extend_from_slice(&chunk);
        }
        self.close()?;
        Ok(collected.freeze())
    }

    /// Consume the body as chunks of the configured
    /// [`chunk_size`](crate::ClientConfig::chunk_size).
    pub fn stream(self) -> BodyChunks<S> {
        let chunk_size = self.chunk_size;
        self.chunks(chunk_size)
    }

    /// Consume the body as a sequence of chunks of at most `chunk_size` bytes.
    pub fn chunks(self, chunk_size: usize) -> BodyChunks<S> {
        BodyChunks {
            body: Some(self),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Release every handle owned by this body.
    ///
    /// Taking `self` makes a second close impossible. Release cannot
    /// fail, so this always returns `Ok(())`.
    pub fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(reader) = self.reader.take() {
            tracing::trace!("releasing response body handles");
            drop(reader);
        }
        if let Some(retained) = self.retained.take() {
            retained.release();
        }
    }
}

impl<S: Substrate> Read for ResponseBody<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl<S: Substrate> Drop for ResponseBody<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: Substrate> std::fmt::Debug for ResponseBody<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_length", &self.content_length)
            .field("chunk_size", &self.chunk_size)
            .field("open", &self.reader.is_some())
            .finish()
    }
}

/// A response body consumed chunk by chunk.
///
/// Usable as an [`Iterator`] or as a [`Stream`]. Each poll performs one
/// blocking read on the substrate, so the stream is always ready. The
/// body is closed as soon as the end is reached or a read fails, and
/// again (harmlessly) when the iterator is dropped.
pub struct BodyChunks<S: Substrate> {
    body: Option<ResponseBody<S>>,
    chunk_size: usize,
}

impl<S: Substrate> BodyChunks<S> {
    fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        let body = self.body.as_mut()?;
        match body.read_chunk(self.chunk_size) {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }

    fn finish(&mut self) {
        if let Some(body) = self.body.take() {
            // Release cannot fail.
            let _ = body.close();
        }
    }
}

impl<S: Substrate> Iterator for BodyChunks<S> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

impl<S: Substrate> Stream for BodyChunks<S> {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next_chunk())
    }
}

// Never pin-projected: handles are only reached through `&mut self`.
impl<S: Substrate> Unpin for BodyChunks<S> {}
