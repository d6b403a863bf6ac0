//! Management HTTP API for ping, shutdown and statistics history control.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
