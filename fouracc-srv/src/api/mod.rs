//! HTTP API handlers for fouracc-srv

pub mod download;
pub mod health;
pub mod identity;
pub mod remove;
pub mod run;
pub mod ui;

pub use download::download_routes;
pub use health::health_routes;
pub use identity::{identity_middleware, ClientIdentity, COOKIE_NAME};
pub use remove::remove_routes;
pub use run::run_routes;
pub use ui::ui_routes;
