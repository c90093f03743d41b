//! Core data models for the object gateway.
//!
//! Specifications and parts describe how an object is fetched; entities and
//! listings are the read-only inputs the mount view joins into storage files.
//! Everything serializes as camelCase JSON via `serde`, matching the format
//! written by the upload pipeline and consumed by clients.

pub mod entity;
pub mod listing;
pub mod specification;
pub mod storage_file;
