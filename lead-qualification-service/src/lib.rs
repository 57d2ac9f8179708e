pub mod config;
pub mod models;
pub mod service;

pub use config::{Backend, ConfigError, ServiceConfig};
pub use service::{ApiError, AppState, build_router, create_app};
