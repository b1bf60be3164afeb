//! Post lifecycle: payload decoding, persistence orchestration and response
//! shaping.

pub mod input;
pub mod serializer;
mod service;

pub use service::{POST_NOT_FOUND, PostEdit, PostsService, parse_id};
