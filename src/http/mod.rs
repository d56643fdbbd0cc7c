//! Inbound HTTP/1.1 transport.
//!
//! This is the host side of the relay: it turns bytes from a client socket
//! into [`request::Request`] values, hands each one to the relay pipeline and
//! writes the resulting response back.
//!
//! - **`connection`**: per-connection state machine driving the pipeline
//! - **`parser`**: parses incoming HTTP requests from byte buffers
//! - **`request`**: inbound request representation and query helpers
//! - **`response`**: outgoing response representation with builder pattern
//! - **`writer`**: serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received (or rejected → Writing, close)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Run capture → forward → parse → relay
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
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
