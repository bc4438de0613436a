//! Backend clients
//!
//! Transport implementations plugged into the refresh loop.

mod http;

pub use http::{HttpClientConfig, HttpRemediation, HttpSourceClient, PreconditionRule};
