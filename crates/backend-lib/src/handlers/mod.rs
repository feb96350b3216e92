// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers served next to the realtime endpoint.

pub mod api;
