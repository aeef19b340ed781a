use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::error::ReadinessError;

/// Dashboard endpoint whose success means the UI can be shown
pub const DEFAULT_HEALTH_PATH: &str = "/config";

/// Polls the dashboard until it answers its health endpoint
pub struct ReadinessPoller {
    client: reqwest::Client,
    url: Url,
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new(origin: &Url, health_path: &str, interval: Duration) -> Result<Self, ReadinessError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            url: origin.join(health_path)?,
            interval,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// One health request; true on any 2xx
    pub async fn check(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!(url = %self.url, status = %response.status(), ready = ok, "Dashboard health check");
                ok
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Dashboard not reachable yet");
                false
            }
        }
    }

    /// Poll until the first success and return the number of requests made.
    ///
    /// No request is issued after the successful one.
    pub async fn wait_until_ready(&self) -> u32 {
        let mut attempts = 0;
        loop {
            attempts += 1;
            if self.check().await {
                info!(url = %self.url, attempts, "Dashboard is ready");
                return attempts;
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Like [`wait_until_ready`](Self::wait_until_ready), bounded by `timeout`.
    ///
    /// On timeout the error carries the number of requests actually issued.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<u32, ReadinessError> {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match tokio::time::timeout_at(deadline, self.check()).await {
                Ok(true) => {
                    info!(url = %self.url, attempts, "Dashboard is ready");
                    return Ok(attempts);
                }
                Ok(false) => {}
                Err(_) => return Err(ReadinessError::Timeout { attempts }),
            }

            // Don't start a request that cannot finish in time
            if Instant::now() + self.interval >= deadline {
                return Err(ReadinessError::Timeout { attempts });
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poller(server: &MockServer) -> ReadinessPoller {
        let origin = Url::parse(&server.uri()).unwrap();
        ReadinessPoller::new(&origin, DEFAULT_HEALTH_PATH, Duration::from_millis(10)).unwrap()
    }

    #[tokio::test]
    async fn test_stops_after_first_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;

        let attempts = poller(&server).wait_until_ready().await;
        assert_eq!(attempts, 3);

        // Give a runaway loop the chance to fire again
        tokio::time::sleep(Duration::from_millis(100)).await;
        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 3);
    }

    #[tokio::test]
    async fn test_ready_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(poller(&server).wait_until_ready().await, 1);
    }

    #[tokio::test]
    async fn test_timeout_when_never_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = poller(&server)
            .wait_with_timeout(Duration::from_millis(100))
            .await;
        let Err(ReadinessError::Timeout { attempts }) = result else {
            panic!("expected a timeout, got {:?}", result);
        };

        let received = server.received_requests().await.unwrap().len() as u32;
        assert!(attempts >= 2);
        // A request cut off by the deadline may never reach the server
        assert!(attempts == received || attempts == received + 1);
    }

    #[tokio::test]
    async fn test_ready_within_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;

        let attempts = poller(&server)
            .wait_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_health_url() {
        let origin = Url::parse("http://localhost:4466").unwrap();
        let poller = ReadinessPoller::new(&origin, "/config", Duration::from_secs(1)).unwrap();
        assert_eq!(poller.url().as_str(), "http://localhost:4466/config");
    }
}
