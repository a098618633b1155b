// WebSocket module - transport adapter around the relay core
//
// - handler: WebSocket upgrade handler (entry point)
// - connection: per-socket reader/writer pump driving a ConnectionSupervisor
// - routes: HTTP route setup (health, metrics) and the listener

mod connection;
mod handler;
mod routes;

pub use handler::websocket_handler;
pub use routes::{create_router, health_handler, metrics_handler, run_server, serve};
