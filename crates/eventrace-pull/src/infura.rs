//! Infura provider profile.

/// WebSocket endpoint for the given network and API key.
pub fn ws_url(api_key: &str, network: &str) -> String {
    format!("wss://{network}.infura.io/ws/v3/{api_key}")
}
