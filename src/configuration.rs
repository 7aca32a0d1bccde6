pub mod config;
pub mod logging;
pub mod types;

pub use config::Config;
pub use logging::init_logging;
pub use types::LogLevel;
