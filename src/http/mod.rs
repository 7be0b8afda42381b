//! HTTP/1.1 message layer.
//!
//! This module holds everything that deals with bytes on the wire, without
//! any notion of connections:
//!
//! - **`request`**: methods, requests, bodies and URL validation (`Endpoint`)
//! - **`writer`**: serializes requests, including chunked bodies
//! - **`parser`**: incremental response parser emitting `ParseEvent`s
//! - **`response`**: status codes and the response model
//! - **`headers`**: case-insensitive header map
//!
//! # Example
//!
//! ```
//! use courier::http::parser::{ParseEvent, ResponseParser};
//!
//! let mut parser = ResponseParser::new();
//! parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
//!
//! let mut body = Vec::new();
//! while let Some(event) = parser.next_event().unwrap() {
//!     if let ParseEvent::Body(chunk) = event {
//!         body.extend_from_slice(&chunk);
//!     }
//! }
//! assert_eq!(body, b"hi");
//! ```

pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
