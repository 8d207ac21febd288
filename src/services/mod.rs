//! Services behind the HTTP handlers: the gateway operations, the backend
//! abstraction they call, and scoped staging files.

pub mod backend;
pub mod gateway_service;
#[cfg(test)]
pub mod memory_backend;
pub mod s3_backend;
pub mod staging;
