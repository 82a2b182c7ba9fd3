//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set`, `GET /get/:key`, `DELETE /del/:key` - Single key access
//! - `POST /mget`, `POST /mset` - Batch access
//! - `POST /expire/:key`, `GET /ttl/:key` - TTL management
//! - `GET /exists/:key`, `GET /keys` - Key inspection
//! - `GET|DELETE /tags/:tag`, `GET|POST|DELETE /patterns`, `POST /invalidate` - Tag grouping
//! - `POST /clear` - Drop every entry
//! - `GET /stats`, `GET /operations` - Statistics and operation log
//! - `GET /cluster/nodes`, `POST /cluster/sync` - Peer notification
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
