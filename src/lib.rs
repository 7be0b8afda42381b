//! Courier - asynchronous HTTP/1.1 client
//!
//! Core library: the message layer in [`http`] and the connection state
//! machine in [`client`].

pub mod client;
pub mod config;
pub mod error;
pub mod http;
