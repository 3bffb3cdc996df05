pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod tools;

pub use client::{Citation, JstorClient, Paper, ScholarClient};
pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use server::Server;
pub use session::SessionManager;
pub use tools::{AuthenticateTool, SearchTool};
