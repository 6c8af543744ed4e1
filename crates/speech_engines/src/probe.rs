//! Availability probe for locally hosted engines
//!
//! A probe is a single short GET against a cheap endpoint. It is distinct
//! from a synthesis attempt and never costs more than its timeout.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

/// Upper bound for any probe timeout
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reachability check against one URL
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe for `url`
    ///
    /// The timeout is capped at [`MAX_PROBE_TIMEOUT`].
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: timeout.min(MAX_PROBE_TIMEOUT),
        }
    }

    /// Probed URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Effective timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` when the endpoint answers with a success status in time
    pub async fn check(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Probe got non-success status");
                false
            },
            Err(e) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reachable_endpoint_is_available() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\"0.14.0\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let probe = HttpProbe::new(
            Client::new(),
            format!("{}/version", mock_server.uri()),
            Duration::from_secs(1),
        );

        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn error_status_is_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let probe = HttpProbe::new(
            Client::new(),
            format!("{}/version", mock_server.uri()),
            Duration::from_secs(1),
        );

        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn slow_endpoint_is_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let probe = HttpProbe::new(
            Client::new(),
            format!("{}/version", mock_server.uri()),
            Duration::from_millis(50),
        );

        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn closed_port_is_unavailable() {
        let probe = HttpProbe::new(
            Client::new(),
            "http://127.0.0.1:9/version",
            Duration::from_millis(200),
        );

        assert!(!probe.check().await);
    }

    #[test]
    fn timeout_is_capped() {
        let probe = HttpProbe::new(Client::new(), "http://localhost", Duration::from_secs(30));
        assert_eq!(probe.timeout(), MAX_PROBE_TIMEOUT);
    }
}
