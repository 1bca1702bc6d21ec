//! # MMC Common Library
//!
//! Shared code for the media metadata catalog binaries:
//! - Store (tracks, tags, collections, weighting index, search, sampling)
//! - Database initialization and migrations
//! - Event types, EventBus and the outbound notifier
//! - RDF ontology mapping and serializers
//! - Client-key authentication table
//! - Configuration loading

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod pagination;
pub mod rdf;
pub mod store;

pub use error::{Error, Result};
pub use store::Store;
