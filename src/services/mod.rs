pub mod image_io;
pub mod import_service;
pub mod inference;
pub mod scan_service;
pub mod tagger_engine;
pub mod tagging_service;
pub mod thumbnail_service;
