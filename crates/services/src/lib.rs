#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod http_gateway;
pub mod local_gateway;
pub mod progress_sync;
pub mod reading_session;

pub use pagemark_core::Clock;

pub use config::{GatewayConfig, TrackerConfig};
pub use error::{ConfigError, GatewayError, SessionError};
pub use gateway::ProgressGateway;
pub use http_gateway::{HttpProgressGateway, SessionContext};
pub use local_gateway::StoredProgressGateway;
pub use progress_sync::ProgressSync;
pub use reading_session::ReadingSession;
