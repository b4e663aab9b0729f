//! Warden - static-file HTTP/1.x server
//!
//! Core library: connection lifecycle, request assembly, resource cache and
//! response writing.

pub mod config;
pub mod http;
pub mod pool;
pub mod resource;
pub mod server;
