//! # chatline-settings
//!
//! Configuration with layered sources:
//! 1. **Compiled defaults**: [`ChatlineSettings::default()`]
//! 2. **JSON file**: deep-merged over defaults (default `~/.chatline/settings.json`)
//! 3. **Environment variables**: `CHATLINE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
