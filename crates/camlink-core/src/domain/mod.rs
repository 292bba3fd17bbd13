//! Domain entities for camlink.
//!
//! This module contains pure data structures with no infrastructure
//! dependencies.  The client engine in `camlink-client` owns instances of
//! these types behind its own locks; nothing here synchronises.

/// Video frames and the bounded frame buffer.
pub mod frame;

/// Discovered servers and the deduplicated server set.
pub mod server;

/// Session lifecycle states.
pub mod session;
