// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;

// Re-export commonly used items
pub use routes::*;
pub use types::{render_messages_text, ApiError};
pub use web_server::*;
