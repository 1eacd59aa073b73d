use crate::config::MeterConfig;
use crate::error::FetchError;
use crate::measurement::parse_snapshot;
use crate::metric::MetricSnapshot;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Upper bound for one complete request, connect through body.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<MetricSnapshot, FetchError>> + Send + 'a>>;

/// Something the coordinator can poll for a fresh snapshot.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> FetchFuture<'_>;
}

/// HTTP client for the meter's energy-meter status endpoint.
///
/// Holds one `reqwest::Client` so the connection pool is shared by every poll.
pub struct MeterClient {
    endpoint_url: String,
    username: String,
    password: SecretString,
    client: reqwest::Client,
}

impl MeterClient {
    pub fn new(config: &MeterConfig) -> Result<Self, reqwest::Error> {
        Self::with_endpoint(endpoint_url(&config.host), config)
    }

    /// Like [`MeterClient::new`] but against an explicit URL instead of the
    /// one derived from the configured host.
    pub fn with_endpoint(
        endpoint_url: impl Into<String>,
        config: &MeterConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .danger_accept_invalid_certs(config.ignore_tls_errors)
            .build()?;
        Ok(Self {
            endpoint_url: endpoint_url.into(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub async fn read_snapshot(&self) -> Result<MetricSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.endpoint_url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let document = response
            .json::<serde_json::Value>()
            .await
            .map_err(request_error)?;
        let snapshot = parse_snapshot(&document);
        debug!(
            url = %self.endpoint_url,
            metrics = snapshot.len(),
            "read meter snapshot"
        );
        Ok(snapshot)
    }
}

impl SnapshotSource for MeterClient {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(self.read_snapshot())
    }
}

pub fn endpoint_url(host: &str) -> String {
    format!("https://{}/status/energy-meter", host.trim_end_matches('/'))
}

fn request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(FETCH_TIMEOUT.as_secs())
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}
