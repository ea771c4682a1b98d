// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: TOML-backed data model and duration parsing.
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: turn the raw model into a validated [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{BridgeSection, ConfigFile, ExecutorSection, RawConfigFile, parse_duration};
