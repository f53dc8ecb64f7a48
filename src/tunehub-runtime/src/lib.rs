//! The Tunehub coordinator and its transport.
//!
//! A [`Hub`] owns the browser registry, the playback core and every loaded
//! plugin. A [`Transport`] exposes them to one client as JSON lines; see
//! [`serve`] for the read/write loop.

mod hub;
mod transport;

pub use hub::{Hub, HubError, HubOptions};
pub use transport::{serve, Stream, Transport, TransportFrame, TransportMethod, TransportRequest};
