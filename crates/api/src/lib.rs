//! HTTP surface of the Courier notification service.
//!
//! Routes are thin: request parsing and status codes live here, every rule
//! worth testing lives in `courier-dispatch`.

pub mod routes;
pub mod state;
