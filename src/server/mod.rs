//! WebSocket hub server
//!
//! [`HubServer`] binds the listener and owns the shared services: the room
//! registry, the broadcast router, the export service, and the connection
//! tracker. Each accepted socket gets its own handler task; background tasks
//! sweep idle connections, reap slow viewers, and log periodic stats.

pub mod config;
pub mod connection;
pub mod listener;
pub mod monitor;
pub mod tracker;

pub use config::HubConfig;
pub use listener::HubServer;
pub use tracker::ConnectionTracker;
