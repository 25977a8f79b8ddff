use thiserror::Error;

/// Errors raised while initiating work on a GATT transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no async runtime available to drive the transport")]
    NoRuntime,

    #[error("no Bluetooth adapter available")]
    AdapterUnavailable,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("session already closed")]
    SessionClosed,

    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::DeviceNotFound("AA:BB:CC:DD:EE:FF".to_string());
        assert_eq!(err.to_string(), "device not found: AA:BB:CC:DD:EE:FF");

        let err = TransportError::NoRuntime;
        assert_eq!(err.to_string(), "no async runtime available to drive the transport");

        let err = TransportError::Other("adapter busy".to_string());
        assert_eq!(err.to_string(), "adapter busy");
    }
}
