//! HTTP/WS surface: thin request routing into the maestro runtime.

mod app;
mod routes;
mod ws;

pub use app::{router, AppState};
