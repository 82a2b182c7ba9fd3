//! Request and Response models for the cache server API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    validate_key, ExpireRequest, InvalidateRequest, KeysQuery, MgetRequest, MsetRequest,
    OperationsQuery, PatternQuery, PatternRequest, SetRequest,
};
pub use responses::{
    AckResponse, DeleteResponse, ErrorResponse, ExistsResponse, ExpireResponse, GetResponse,
    HealthResponse, KeysResponse, MgetResponse, MsetFailure, MsetResponse, PatternResponse,
    RemovedResponse, SetResponse, TagEntriesResponse, TtlResponse,
};
