//! Admin API for a self-hosted publishing system.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
