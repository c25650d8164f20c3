//! Asset platform upload API.
//!
//! Provides the wire types for the platform's `user-auth` asset upload
//! endpoint, the [`Transport`] capability the upload engine calls into, and
//! a `reqwest`-backed [`HttpTransport`] implementation of it.

pub mod client;
pub mod response;
pub mod transport;
pub mod types;

pub use client::HttpTransport;
pub use response::SubmitResponse;
pub use transport::{Transport, TransportError, TransportFuture};
pub use types::{Category, Creator, SessionToken, SubmitRequest};
