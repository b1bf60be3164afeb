//! Domain layer types and invariants.

pub mod api_keys;
pub mod entities;
pub mod error;
pub mod posts;
pub mod routes;
pub mod settings;
pub mod slug;
pub mod types;
