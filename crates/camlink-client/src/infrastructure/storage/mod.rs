//! Persistent storage for the client application.
//!
//! - **`config`** – TOML configuration file, loaded at startup and written by
//!   `camlink init-config`.

pub mod config;
