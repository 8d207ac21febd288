//! Data models for the gateway.
//!
//! Everything here is request-scoped: listing entries projected from backend
//! pages, and the payloads moved in and out of the bucket.

pub mod listing;
pub mod transfer;
