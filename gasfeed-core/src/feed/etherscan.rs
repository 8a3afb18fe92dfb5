//! Etherscan gas-price chart source.
//!
//! Downloads the daily average gas price chart as CSV. Timestamps in the feed
//! are UTC midnight for each day. One request per call: retrying is the run
//! controller's job, not the source's.

use super::source::{FetchError, GasPriceSource, RawFeed};
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://etherscan.io/chart/gasprice?output=csv";
pub const DEFAULT_USER_AGENT: &str = "L2Savings";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP source for the Etherscan chart export.
///
/// Construction never fails. If the HTTP client cannot be built, every
/// `fetch` reports `FetchError::Client`, so the failure is logged and counted
/// by the run controller like any other fetch error.
pub struct EtherscanSource {
    client: Result<reqwest::blocking::Client, String>,
    url: String,
}

impl EtherscanSource {
    pub fn new(url: impl Into<String>, user_agent: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| e.to_string());

        Self {
            client,
            url: url.into(),
        }
    }

    /// Source with the default URL, user agent, and timeout.
    pub fn default_feed() -> Self {
        Self::new(DEFAULT_FEED_URL, DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl GasPriceSource for EtherscanSource {
    fn name(&self) -> &str {
        "etherscan"
    }

    fn fetch(&self) -> Result<RawFeed, FetchError> {
        let client = self
            .client
            .as_ref()
            .map_err(|e| FetchError::Client(e.clone()))?;

        let resp = client
            .get(&self.url)
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = resp.bytes().map_err(|e| FetchError::Body(e.to_string()))?;
        Ok(RawFeed::new(body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::sink::WriteReceipt;
    use crate::feed::{MappingSink, PriceMapping, WriteError};
    use crate::runner::{run_refresh, Clock, PipelineError, RunOutcome, RunSettings};
    use crate::status::StatusFile;
    use chrono::{DateTime, TimeZone, Utc};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve one HTTP response on a local port; the request head is sent back
    /// through the returned channel.
    fn serve_once(status_line: &'static str, body: &'static [u8]) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/chart/gasprice?output=csv", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
            stream.flush().unwrap();
            tx.send(String::from_utf8_lossy(&request).to_string()).unwrap();
        });

        (url, rx)
    }

    #[test]
    fn builds_with_defaults() {
        let source = EtherscanSource::default_feed();
        assert_eq!(source.url(), DEFAULT_FEED_URL);
        assert_eq!(source.name(), "etherscan");
        assert!(source.client.is_ok());
    }

    #[test]
    fn returns_body_and_sends_user_agent() {
        const BODY: &[u8] = b"\"Date(UTC)\",\"UnixTimeStamp\",\"Value (Wei)\"\n\"9/1/2021\",\"1630454400\",\"110000000000\"\n";
        let (url, request) = serve_once("200 OK", BODY);

        let feed = EtherscanSource::new(url, DEFAULT_USER_AGENT, Duration::from_secs(5))
            .fetch()
            .unwrap();

        assert_eq!(feed.as_bytes(), BODY);
        let request = request.recv().unwrap().to_lowercase();
        assert!(request.starts_with("get /chart/gasprice?output=csv "));
        assert!(request.contains("user-agent: l2savings\r\n"));
    }

    #[test]
    fn non_success_status_is_reported() {
        let (url, _request) = serve_once("503 Service Unavailable", b"busy");

        match EtherscanSource::new(url.as_str(), DEFAULT_USER_AGENT, Duration::from_secs(5)).fetch() {
            Err(FetchError::Status { status, url: failed }) => {
                assert_eq!(status, 503);
                assert_eq!(failed, url);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_host_is_a_network_error() {
        // Port 9 on localhost: nothing listens there, the connect fails fast.
        let source = EtherscanSource::new(
            "http://127.0.0.1:9/chart/gasprice?output=csv",
            DEFAULT_USER_AGENT,
            Duration::from_secs(2),
        );
        match source.fetch() {
            Err(FetchError::NetworkUnreachable(_)) => {}
            other => panic!("expected NetworkUnreachable, got {other:?}"),
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2021, 9, 2, 0, 0, 0).unwrap()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    struct NeverWritten;

    impl MappingSink for NeverWritten {
        fn write(&self, _mapping: &PriceMapping) -> Result<WriteReceipt, WriteError> {
            panic!("sink must not be reached when the client is unusable");
        }
    }

    #[test]
    fn client_build_failure_is_retried_and_recorded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let status = StatusFile::new(tmp.path().join("status.json"));
        let source = EtherscanSource {
            client: Err("no TLS backend".into()),
            url: DEFAULT_FEED_URL.into(),
        };
        let settings = RunSettings {
            max_attempts: 2,
            retry_delay: Duration::ZERO,
            ..RunSettings::default()
        };

        let report = run_refresh(&source, &NeverWritten, &FixedClock, &settings, Some(&status));

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(report.errors.len(), 2);
        assert!(report
            .errors
            .iter()
            .all(|e| matches!(e, PipelineError::Fetch(FetchError::Client(_)))));
        let recorded = status.load().unwrap();
        assert!(!recorded.succeeded);
        assert!(recorded.last_error.unwrap().contains("no TLS backend"));
    }
}
