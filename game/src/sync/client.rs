use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, Uri, header};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api::{
    LeaderboardEntry, LeaderboardResponse, RegisterRequest, RegisterResponse,
    SubmitScoreRequest,
};

#[derive(Debug)]
pub enum SyncError {
    InvalidUrl(String),
    Timeout(Duration),
    Transport(String),
    Status(StatusCode),
    Decode(serde_json::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::InvalidUrl(url) => write!(f, "invalid service url: {url}"),
            SyncError::Timeout(after) => write!(f, "request timed out after {after:?}"),
            SyncError::Transport(msg) => write!(f, "transport error: {msg}"),
            SyncError::Status(status) => write!(f, "unexpected status {status}"),
            SyncError::Decode(err) => write!(f, "malformed response: {err}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err)
    }
}

/// Async client for the scoring service.
///
/// The public calls never fail: errors are logged and surface as `None` / `false`, and
/// the game carries on without the service.
#[derive(Debug, Clone)]
pub struct ScoreClient {
    base: String,
    timeout: Duration,
    http: Client<HttpConnector, Full<Bytes>>,
}

impl ScoreClient {
    /// `base_url` is the service root, e.g. `http://localhost:5000/api`. Only plain HTTP
    /// is supported.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base = base_url.trim().trim_end_matches('/').to_string();
        let uri: Uri = base
            .parse()
            .map_err(|_| SyncError::InvalidUrl(base_url.to_string()))?;
        if uri.scheme_str() != Some("http") || uri.host().is_none() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }

        let http = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            base,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn register_player(&self, username: &str) -> Option<i64> {
        let body = RegisterRequest {
            username: username.to_string(),
        };
        match self
            .send::<RegisterResponse>(Method::POST, "/player/register", Some(&body))
            .await
        {
            Ok(resp) => {
                log::info!("registered {username:?} as player {}", resp.player_id);
                Some(resp.player_id)
            }
            Err(err) => {
                log::warn!("register {username:?} failed: {err}");
                None
            }
        }
    }

    /// Submits a finished session. Without a player id there is nothing to attribute the
    /// score to, so nothing is sent.
    pub async fn submit_score(
        &self,
        player_id: Option<i64>,
        score: u32,
        duration: Duration,
    ) -> bool {
        let Some(player_id) = player_id else {
            log::debug!("skipping score submit without a player id");
            return false;
        };
        let body = SubmitScoreRequest {
            player_id: Some(player_id),
            score: Some(score),
            duration: duration.as_secs_f64(),
            pipes_passed: Some(score),
        };
        // The response body carries nothing the game needs; the status decides.
        match self
            .exchange(Method::POST, "/score/submit", Some(&body))
            .await
        {
            Ok(_) => {
                log::info!("submitted score {score} for player {player_id}");
                true
            }
            Err(err) => {
                log::warn!("submit score for player {player_id} failed: {err}");
                false
            }
        }
    }

    pub async fn fetch_leaderboard(&self, limit: u32) -> Option<Vec<LeaderboardEntry>> {
        let path = format!("/leaderboard?limit={limit}");
        match self
            .send::<LeaderboardResponse>(Method::GET, &path, None::<&()>)
            .await
        {
            Ok(resp) => Some(resp.leaderboard.into_iter().map(Into::into).collect()),
            Err(err) => {
                log::warn!("leaderboard fetch failed: {err}");
                None
            }
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, SyncError> {
        let bytes = self.exchange(method, path, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Performs one request and returns the body of a 200 response.
    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<Bytes, SyncError> {
        let url = format!("{}{}", self.base, path);
        let uri: Uri = url.parse().map_err(|_| SyncError::InvalidUrl(url.clone()))?;

        let mut builder = Request::builder().method(method).uri(uri);
        let payload = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Bytes::from(serde_json::to_vec(body)?)
            }
            None => Bytes::new(),
        };
        let request = builder
            .body(Full::new(payload))
            .map_err(|err| SyncError::Transport(err.to_string()))?;

        let exchange = async {
            let response = self
                .http
                .request(request)
                .await
                .map_err(|err| SyncError::Transport(err.to_string()))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|err| SyncError::Transport(err.to_string()))?
                .to_bytes();
            Ok::<_, SyncError>((status, bytes))
        };

        let (status, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SyncError::Timeout(self.timeout))??;

        if status != StatusCode::OK {
            return Err(SyncError::Status(status));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            ScoreClient::new("https://scores.example.com/api", Duration::from_secs(1)),
            Err(SyncError::InvalidUrl(_))
        ));
        assert!(matches!(
            ScoreClient::new("not a url", Duration::from_secs(1)),
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let client =
            ScoreClient::new("http://127.0.0.1:5000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000/api");
    }

    #[tokio::test]
    async fn submit_without_player_is_a_no_op() {
        // Nothing listens on port 9; a request would fail, a no-op returns before trying.
        let client =
            ScoreClient::new("http://127.0.0.1:9/api", Duration::from_millis(200)).unwrap();
        assert!(!client.submit_score(None, 5, Duration::from_secs(3)).await);
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_none() {
        let client =
            ScoreClient::new("http://127.0.0.1:9/api", Duration::from_millis(500)).unwrap();
        assert_eq!(client.register_player("ACE").await, None);
        assert_eq!(client.fetch_leaderboard(10).await, None);
    }
}
