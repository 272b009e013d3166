//! Dashboard collaborator: accepts relay event records over HTTP, keeps a
//! bounded history per channel, and streams new events to WebSocket clients.

pub mod error;
pub mod history;
pub mod server;

pub use {
    error::{Error, Result},
    history::{ChannelInfo, EventHistory, HISTORY_PAGE, HistoryStats, MAX_DISCOVERED_CHANNELS},
    server::{DashboardState, build_router, serve, serve_listener},
};
