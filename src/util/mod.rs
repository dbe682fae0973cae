//! Utility functions shared across the crate.

mod secret;

pub use secret::SecretString;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::warn;

/// First eight characters of an id, for log lines and placeholder names.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Bind a listener on the preferred port, falling back to an OS-assigned
/// port when it is taken.
pub async fn bind_listener(host: &str, preferred: u16) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", host, preferred)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            let listener = TcpListener::bind(SocketAddr::new(addr.ip(), 0)).await?;
            warn!(
                preferred,
                actual = listener.local_addr()?.port(),
                "Preferred port unavailable, using OS-assigned port"
            );
            Ok(listener)
        }
        Err(e) => Err(e),
    }
}
