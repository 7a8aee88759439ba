//! WebSocket endpoint derivation from a page origin.

use crate::error::{DashboardError, Result};

/// Build the telemetry socket URL for a page `origin`
///
/// The scheme mirrors the page scheme (`https` -> `wss`, `http` -> `ws`) and
/// any path on the origin is ignored in favour of `path`.
///
/// # Examples
///
/// ```
/// use drone_dashboard::connection::endpoint::websocket_url_for_origin;
///
/// let url = websocket_url_for_origin("https://dash.example.com", "/ws")?;
/// assert_eq!(url, "wss://dash.example.com/ws");
/// # Ok::<(), drone_dashboard::error::DashboardError>(())
/// ```
pub fn websocket_url_for_origin(origin: &str, path: &str) -> Result<String> {
    let (scheme, rest) = if let Some(rest) = origin.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        ("ws", rest)
    } else {
        return Err(DashboardError::Transport(format!(
            "Unsupported origin scheme: {}",
            origin
        )));
    };

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(DashboardError::Transport(format!("Origin has no host: {}", origin)));
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    Ok(format!("{}://{}{}", scheme, host, path))
}

/// Whether `url` uses a WebSocket scheme
pub fn is_websocket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}
