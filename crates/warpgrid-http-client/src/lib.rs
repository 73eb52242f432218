//! warpgrid-http-client: outbound HTTP for WarpGrid components.
//!
//! Lets ordinary synchronous `Request -> Response` code run on top of a
//! handle-based HTTP facility such as `wasi:http`, where every piece of
//! state is an opaque resource that must be released explicitly and
//! readiness is signalled through pollables rather than sockets.
//!
//! - **substrate**: the capability set the client is written against ([`Substrate`])
//! - **transport**: the request encoder ([`Transport`], [`RoundTrip`])
//! - **reader**: response body streaming and handle teardown ([`ResponseBody`])
//! - **convert**: method, scheme, header and `Content-Length` translation
//! - **memory**: a scripted in-memory substrate ([`MemorySubstrate`])
//! - **wasi_http**: the `wasi:http@0.2` substrate (wasm32-wasip2 only)
//!
//! # Example
//!
//! ```
//! use std::io::Read;
//! use warpgrid_http_client::{Body, MemoryResponse, MemorySubstrate, Transport};
//!
//! let substrate = MemorySubstrate::new()
//!     .with_response(MemoryResponse::new(200).header("content-length", "5").body("hello"));
//! let transport = Transport::new(substrate);
//!
//! let request = http::Request::get("http://example.test/foo?q=1")
//!     .body(Body::empty())
//!     .unwrap();
//! let response = transport.execute(request).unwrap();
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.body().content_length(), Some(5));
//!
//! let mut body = response.into_body();
//! let mut text = String::new();
//! body.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "hello");
//! body.close().unwrap();
//! ```

pub mod body;
pub mod config;
pub mod convert;
mod error;
pub mod memory;
pub mod reader;
pub mod substrate;
pub mod transport;
#[cfg(all(target_os = "wasi", target_env = "p2"))]
pub mod wasi_http;

pub use body::Body;
pub use config::{ClientConfig, DEFAULT_CHUNK_SIZE, HeaderEncoding};
pub use error::{Error, ResponseFailure, Result, StreamError, SubstrateError};
pub use memory::{MemoryOutcome, MemoryResponse, MemorySubstrate};
pub use reader::{BodyChunks, InputStreamReader, ResponseBody};
pub use substrate::{InFlight, Method, ResponseOutcome, Scheme, Substrate};
pub use transport::{RoundTrip, StatusText, Transport, status_text};
#[cfg(all(target_os = "wasi", target_env = "p2"))]
pub use wasi_http::WasiSubstrate;
