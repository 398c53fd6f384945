// Remote Sync Client - request/response wrapper for the analysis service.
//
// Holds no state beyond the session identity. Every response is parsed into a
// strict typed result here so nothing downstream sees raw payloads.

use crate::models::pose::PoseFrame;
use crate::models::remote::{
    AnalyzeRequest, AnalyzeResult, HealthStatus, ResetAck, ResetRequest, ServiceError,
    ServiceResult,
};
use crate::models::workout::Activity;
use async_trait::async_trait;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

// ==============================================================================
// Session Identity
// ==============================================================================

/// Opaque per-session token correlating requests with server-side counters.
/// Generated lazily on first use and never regenerated.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    id: OnceLock<String>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> &str {
        self.id.get_or_init(|| {
            let millis = chrono::Utc::now().timestamp_millis();
            let suffix = Uuid::new_v4().simple().to_string();
            format!("session_{}_{}", millis, &suffix[..7])
        })
    }
}

// ==============================================================================
// Service Trait
// ==============================================================================

/// Remote pose-classification / rep-counting endpoints
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Identity sent with every request
    fn session_id(&self) -> &str;

    /// Classify a pose and advance the remote rep counter
    async fn analyze(
        &self,
        pose: &PoseFrame,
        activity: Option<Activity>,
    ) -> ServiceResult<AnalyzeResult>;

    /// Zero the remote counters for this session
    async fn reset(&self) -> ServiceResult<ResetAck>;

    /// `None` on any failure; unreachable and unhealthy look the same
    async fn health(&self) -> Option<HealthStatus>;
}

// ==============================================================================
// HTTP Implementation
// ==============================================================================

pub struct HttpAnalysisClient {
    http: reqwest::Client,
    base_url: String,
    identity: SessionIdentity,
}

impl HttpAnalysisClient {
    /// Create a client against `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ServiceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a preconfigured `reqwest::Client`
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            identity: SessionIdentity::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Turn a response into its body bytes, or a `ServiceError::Http` for non-2xx
    async fn read_success(response: reqwest::Response) -> ServiceResult<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = if detail.is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                detail
            };
            return Err(ServiceError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    fn session_id(&self) -> &str {
        self.identity.get()
    }

    async fn analyze(
        &self,
        pose: &PoseFrame,
        activity: Option<Activity>,
    ) -> ServiceResult<AnalyzeResult> {
        let request = AnalyzeRequest::new(pose, activity.map(|a| a.as_str()), self.session_id());

        let response = self
            .http
            .post(self.endpoint("analyze"))
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let body = Self::read_success(response).await?;
        AnalyzeResult::parse(&body)
    }

    async fn reset(&self) -> ServiceResult<ResetAck> {
        let request = ResetRequest {
            session_id: self.session_id().to_string(),
        };

        let response = self
            .http
            .post(self.endpoint("reset"))
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let body = Self::read_success(response).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::InvalidResponse(format!("reset: {}", e)))
    }

    async fn health(&self) -> Option<HealthStatus> {
        let response = match self.http.get(self.endpoint("health")).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("health check failed: {}", e);
                return None;
            }
        };

        let body = match Self::read_success(response).await {
            Ok(body) => body,
            Err(e) => {
                debug!("health check failed: {}", e);
                return None;
            }
        };

        serde_json::from_slice(&body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::{Keypoint, POSE_LANDMARK_COUNT};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve one canned HTTP response; the handle yields the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn client(base_url: String) -> HttpAnalysisClient {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpAnalysisClient::with_client(http, base_url)
    }

    fn pose() -> PoseFrame {
        let mut kps = vec![Keypoint::new(0.5, 0.5, 0.1, 0.9); POSE_LANDMARK_COUNT + 2];
        kps[3] = Keypoint::new(1.4, -0.3, 0.0, 0.9);
        PoseFrame::new(kps, 0).unwrap()
    }

    #[test]
    fn test_session_identity_is_stable() {
        let identity = SessionIdentity::new();
        let first = identity.get().to_string();
        assert!(first.starts_with("session_"));
        assert_eq!(identity.get(), first);
        assert_eq!(identity.get(), first);

        // A new identity is a new session
        assert_ne!(SessionIdentity::new().get(), first);
    }

    #[test]
    fn test_endpoint_joining() {
        let c = client("http://svc:8000/".to_string());
        assert_eq!(c.endpoint("analyze"), "http://svc:8000/analyze");
        let c = client("http://svc:8000/api".to_string());
        assert_eq!(c.endpoint("health"), "http://svc:8000/api/health");
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let (base, server) =
            serve_once("200 OK", r#"{"exercise":"squats","confidence":0.87,"rep_count":3}"#).await;
        let client = client(base);

        let result = client.analyze(&pose(), Some(Activity::Squats)).await.unwrap();
        assert_eq!(result.rep_count, 3);
        assert_eq!(result.exercise, "squats");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /analyze"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["exercise"], "squats");
        assert_eq!(json["session_id"], client.session_id());
        let landmarks = json["landmarks"].as_array().unwrap();
        assert_eq!(landmarks.len(), POSE_LANDMARK_COUNT);
        assert_eq!(landmarks[3]["x"], 1.0);
        assert_eq!(landmarks[3]["y"], 0.0);
    }

    #[tokio::test]
    async fn test_analyze_non_success_carries_status() {
        let (base, server) =
            serve_once("503 Service Unavailable", r#"{"detail":"Model not loaded"}"#).await;
        let client = client(base);

        let err = client.analyze(&pose(), None).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_sends_session_id() {
        let (base, server) = serve_once("200 OK", r#"{"session_id":"x","status":"reset"}"#).await;
        let client = client(base);

        let ack = client.reset().await.unwrap();
        assert_eq!(ack.status, "reset");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /reset"));
        assert!(request.contains(client.session_id()));
    }

    #[tokio::test]
    async fn test_health_parses_status() {
        let (base, server) = serve_once("200 OK", r#"{"status":"ok","model_loaded":true}"#).await;
        let health = client(base).health().await.unwrap();
        assert!(health.model_loaded);
        assert_eq!(health.status, "ok");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_health_is_none_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(client(format!("http://{}", addr)).health().await.is_none());
    }

    #[tokio::test]
    async fn test_health_is_none_on_error_status() {
        let (base, server) = serve_once("500 Internal Server Error", "{}").await;
        assert!(client(base).health().await.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_is_service_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{}", addr)).reset().await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
