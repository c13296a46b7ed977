//! HTTP API handlers for txdata-wb

pub mod analysis;
pub mod auth;
pub mod encoding;
pub mod health;
pub mod projects;
pub mod sim;
pub mod tutorials;
pub mod ui;

pub use auth::{auth_middleware, CurrentUser};
pub use health::health_routes;
pub use ui::serve_index;
