//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 server with keep-alive support, plus the message types the
//! forwarding path shares with it.
//!
//! # Architecture
//!
//! - **`connection`**: The per-client request/response state machine
//! - **`parser`**: Parses requests and chunked bodies from byte buffers
//! - **`headers`**: Ordered, case-insensitive header list
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes responses to a stream
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Gateway resolves, forwards, rewrites
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

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
