//! HTTP POST transport: the shared `/mcp` server plumbing and the
//! retrying JSON-RPC client

pub mod client;
pub mod server;

pub use client::{ClientError, ClientResult, MessageClient};
pub use server::{router, serve, McpHandler, Reply};
