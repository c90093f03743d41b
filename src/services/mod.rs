//! Server-side object access: addressing, part layout, signing and the
//! download/listing services built on them.

pub mod bucket_resolver;
pub mod download_service;
pub mod listing_service;
pub mod object_keys;
pub mod part_calculator;
pub mod url_signer;
