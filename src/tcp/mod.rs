//! TCP transport: the serialized server and the one-shot client.

pub mod client;
pub mod dispatcher;
pub mod server;

pub use client::MediaTcpClient;
pub use dispatcher::{ConnectionOutcome, ServerDispatcher};
pub use server::MediaTcpServer;
