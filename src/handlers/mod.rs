pub mod blob_handlers;
pub mod download_handlers;
pub mod entity_handlers;
pub mod health_handlers;
