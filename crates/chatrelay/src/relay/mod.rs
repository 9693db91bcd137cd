mod error;
mod server;

pub use server::{AppState, RelayServer, create_router, serve_with_listener};
