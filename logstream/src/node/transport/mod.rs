use super::*;

mod local;
mod tcp;

pub use local::LocalNetwork;
pub use tcp::{serve, TcpTransport};

/// Largest message a transport carries.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Delivers a request to another node and returns its response.
/// Both are encoded messages.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fails with `Unreachable` if the request can't be delivered
    /// and with `Timeout` if no response comes back in `timeout`.
    async fn request(&self, dest: &Endpoint, message: Bytes, timeout: Duration) -> Result<Bytes>;
}
