pub mod config;
pub mod document;
pub mod handlers;
pub mod server;

// Re-export commonly used types
pub use config::CaplConfig;
pub use server::Backend;
