//! Application services layer.

pub mod api_keys;
pub mod endpoints;
pub mod error;
pub mod frame;
pub mod members;
pub mod pagination;
pub mod permissions;
pub mod pipeline;
pub mod posts;
pub mod repos;
pub mod route_settings;
pub mod settings;
