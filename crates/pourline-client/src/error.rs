use pourline_core::BridgeError;

/// Map a transport failure onto the bridge taxonomy.
///
/// Timeouts, refused connections and other send failures are `Network`; a
/// body that could not be decoded is `Protocol`.
pub(crate) fn classify(context: &str, err: reqwest::Error) -> BridgeError {
    if err.is_decode() {
        return BridgeError::Protocol(format!("{context}: malformed body: {err}"));
    }
    if err.is_timeout() {
        return BridgeError::Network(format!("{context}: timed out"));
    }
    if err.is_connect() {
        return BridgeError::Network(format!("{context}: connection failed: {err}"));
    }
    BridgeError::Network(format!("{context}: {err}"))
}

/// A response outside 2xx.
pub(crate) fn unexpected_status(context: &str, status: reqwest::StatusCode) -> BridgeError {
    BridgeError::Protocol(format!("{context}: unexpected status {status}"))
}
