//! Network infrastructure for the client application.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for UDP beacons from servers for a bounded scan
//!   window and reports each newly seen server on an event channel.
//!
//! - **`connection_manager`** – Owns the session state machine: connect with
//!   timeout, handshake, camera list, teardown.  Starts the session
//!   supervisor once connected.
//!
//! - **`heartbeat`** – The liveness loop run by the session supervisor.
//!
//! - **`camera_selector`** – Sends a camera selection request and waits for
//!   the acknowledgment byte, with bounded retry.
//!
//! - **`session`** – Session-scoped shared state: the single-flight slot, the
//!   session fields, and the liveness clock.

pub mod camera_selector;
pub mod connection_manager;
pub mod discovery;
pub mod heartbeat;
pub mod session;
