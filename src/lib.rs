pub mod antidetect;
pub mod auth;
pub mod context;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod housekeeper;
pub mod http;
pub mod mcp;
pub mod news;
pub mod ratelimit;
pub mod robots;
pub mod session;
pub mod simulator;
pub mod validation;

pub use context::{DigConfig, RuntimeContext};
pub use error::DigError;
pub use mcp::DigMcpServer;
