//! MCP adapters exposing the coordination core to agent processes.

pub mod stdio_server;

pub use stdio_server::StdioServer;
