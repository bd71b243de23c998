pub mod adapters;
pub mod api;
pub mod config;
pub mod credential;
pub mod diagnostics;
pub mod dispatch;
pub mod registry;
pub mod server;
