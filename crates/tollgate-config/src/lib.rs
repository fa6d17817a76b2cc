//! Provider configuration for Tollgate.
//!
//! Loads a JSON-with-comments document describing OAuth-protected providers:
//! - Comment stripping that leaves string literals (and the `//` in URLs) alone
//! - `{env:NAME}` placeholder substitution
//! - Typed, ordered provider entries validated once at load time
//! - File discovery (explicit path → project-local → user config dir)

pub mod discovery;
pub mod error;
pub mod jsonc;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use jsonc::strip_comments;
pub use secrets::{Substituted, substitute_env, substitute_with};
pub use types::*;
