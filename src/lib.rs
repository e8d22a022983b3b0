//! Declarative container environments: configuration, on-disk persistence,
//! revision history, and the registry used to look them up.

pub mod config;
pub mod domain;
pub mod infra;
