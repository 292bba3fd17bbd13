//! Application layer for the client.
//!
//! - **`events`** – The notification interface.  Each subsystem reports what
//!   happened as an immutable event enum sent over a channel; the consumer
//!   (a GUI or the headless CLI) drains the receiver at its own pace.
//!
//! - **`frame_queue`** – The shared handle around the bounded frame buffer.
//!   The video bridge pushes decoded frames into it and the renderer awaits
//!   them.

pub mod events;
pub mod frame_queue;
