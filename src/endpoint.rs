//! Broker endpoint description.
//!
//! [`Broker`] names where a broker listens; [`Broker::descriptor`] renders
//! the colon-delimited client endpoint string understood by the connector
//! layer, e.g. `tcp:host=localhost:port=61613:timeout=5`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Network location of a broker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Broker {
    /// Transport scheme, e.g. `tcp`.
    pub protocol: String,
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Broker {
    /// Describe a broker endpoint.
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    /// Render the client endpoint descriptor for this broker.
    ///
    /// The connect timeout is appended only when given; it is rendered in
    /// whole seconds.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use stampede::endpoint::Broker;
    ///
    /// let broker = Broker::new("tcp", "localhost", 61613);
    /// assert_eq!(
    ///     broker.descriptor(Some(Duration::from_secs(5))),
    ///     "tcp:host=localhost:port=61613:timeout=5"
    /// );
    /// ```
    #[must_use]
    pub fn descriptor(&self, timeout: Option<Duration>) -> String {
        let endpoint = format!("{}:host={}:port={}", self.protocol, self.host, self.port);
        match timeout {
            Some(limit) => format!("{endpoint}:timeout={}", limit.as_secs()),
            None => endpoint,
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            protocol: "tcp".into(),
            host: "localhost".into(),
            port: 61613,
        }
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_with_timeout() {
        let broker = Broker::new("tcp", "h", 61613);
        assert_eq!(
            broker.descriptor(Some(Duration::from_secs(5))),
            "tcp:host=h:port=61613:timeout=5"
        );
    }

    #[test]
    fn test_descriptor_without_timeout() {
        let broker = Broker::new("tcp", "h", 61613);
        assert_eq!(broker.descriptor(None), "tcp:host=h:port=61613");
    }

    #[test]
    fn test_descriptor_zero_timeout_is_explicit() {
        let broker = Broker::new("tcp", "h", 61613);
        assert_eq!(
            broker.descriptor(Some(Duration::ZERO)),
            "tcp:host=h:port=61613:timeout=0"
        );
    }

    #[test]
    fn test_descriptor_truncates_to_whole_seconds() {
        let broker = Broker::default();
        assert_eq!(
            broker.descriptor(Some(Duration::from_millis(2500))),
            "tcp:host=localhost:port=61613:timeout=2"
        );
    }

    #[test]
    fn test_display() {
        let broker = Broker::new("ssl", "broker.example.com", 61614);
        assert_eq!(broker.to_string(), "ssl://broker.example.com:61614");
    }

    #[test]
    fn test_json_round_trip() {
        let broker = Broker::new("tcp", "h", 61613);
        let json = serde_json::to_string(&broker).unwrap();
        assert_eq!(json, r#"{"protocol":"tcp","host":"h","port":61613}"#);
        assert_eq!(serde_json::from_str::<Broker>(&json).unwrap(), broker);
    }
}
