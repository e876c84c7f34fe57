#![forbid(unsafe_code)]

pub mod error;
pub mod estimator;
pub mod model;
pub mod resume;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod time;

pub use error::Error;
pub use time::{Clock, SessionMillis};
