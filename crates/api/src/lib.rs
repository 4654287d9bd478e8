//! HTTP API: server, routing, realtime chat relay, and request/response
//! mapping.

pub mod app;
pub mod context;
pub mod middleware;
