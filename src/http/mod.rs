//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.0 and HTTP/1.1 side of the server.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: Per-connection state machine, owns the socket and receive buffer
//! - **`parser`**: Incremental tokenizer interface and the `httparse`-backed tokenizer
//! - **`assembler`**: Builds requests from tokenizer callbacks
//! - **`request`**: HTTP request representation
//! - **`cookie`**: `Cookie` header parsing
//! - **`headers`**: Case-insensitive, insertion-ordered header map
//! - **`decoder`**: Request body decoders selected by content type
//! - **`dispatch`**: Maps a request onto a cached resource and builds the response
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for bytes (keep-alive deadline armed)
//!        └──────┬──────┘
//!               │ Bytes received
//!               ▼
//!        ┌──────────────────┐
//!        │    Parsing       │ ← Feed the assembler, keep residual bytes
//!        └──────┬───────────┘
//!               │ Request complete
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Resolve resource, build response
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod assembler;
pub mod connection;
pub mod cookie;
pub mod decoder;
pub mod dispatch;
pub mod headers;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
