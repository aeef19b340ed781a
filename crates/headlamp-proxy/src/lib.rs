//! Reverse proxy for headlamp-host
//!
//! Forwards portal requests under the mount path to the locally running
//! Headlamp server, and answers the host's own health endpoint.

mod error;
mod rewrite;
mod server;

pub use error::ProxyError;
pub use rewrite::{rewrite_path, PathRewrite};
pub use server::{router, serve, ProxyConfig, ProxyState, DEFAULT_MOUNT_PATH, DEFAULT_TARGET};
