// src/api.rs
//! Client for the remote activity API

use crate::{
    config::DEFAULT_API_BASE_URL,
    error::{RecorderError, Result},
    gps::data::{Coordinate, TrackPoint},
    session::CompletedSession,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartActivity<'a> {
    activity_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_location: Option<Coordinate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackUpload<'a> {
    track_points: &'a [TrackPoint],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteActivity {
    distance_meters: f64,
    duration_seconds: u64,
    ended_at: DateTime<Utc>,
}

/// Profile fields the recorder shows; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: Option<serde_json::Value>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Bearer-token JSON client for activity submission.
#[derive(Clone)]
pub struct ActivityApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ActivityApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("activity-recorder/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        let value = self.send(self.client.get(self.url("/users/me"))).await?;
        // Some deployments wrap the payload in `data`
        let profile = match value.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => value,
        };
        Ok(serde_json::from_value(profile)?)
    }

    /// Upload a completed session: start, track, complete. Returns the remote activity id.
    pub async fn submit_session(&self, session: &CompletedSession, activity_type: &str) -> Result<String> {
        let start = StartActivity {
            activity_type,
            start_location: session.start_location(),
        };
        let created = self
            .send(self.client.post(self.url("/activities/start")).json(&start))
            .await?;
        let id = parse_activity_id(&created)
            .ok_or_else(|| RecorderError::Parse("activity id missing from start response".to_string()))?;
        log::debug!("Remote activity {} created for {}", id, session.id);

        if !session.track.is_empty() {
            let upload = TrackUpload {
                track_points: &session.track,
            };
            self.send(
                self.client
                    .post(self.url(&format!("/activities/{}/track", id)))
                    .json(&upload),
            )
            .await?;
        }

        let complete = CompleteActivity {
            distance_meters: session.distance_meters,
            duration_seconds: session.duration_seconds,
            ended_at: session.stopped_at,
        };
        self.send(
            self.client
                .put(self.url(&format!("/activities/{}/complete", id)))
                .json(&complete),
        )
        .await?;

        log::info!(
            "Submitted {} ({} points) as activity {}",
            session.id,
            session.track.len(),
            id
        );
        Ok(id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let request = match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.header("Accept", "application/json").send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RecorderError::Api {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl Default for ActivityApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL, None)
    }
}

/// Spawn a task that submits every completed session it receives.
///
/// The returned sender is a [`crate::session::SessionSink`]; the task ends when it is dropped.
pub fn spawn_uploader(
    client: ActivityApiClient,
    activity_type: String,
) -> (mpsc::UnboundedSender<CompletedSession>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<CompletedSession>();
    let task = tokio::spawn(async move {
        while let Some(session) = rx.recv().await {
            if let Err(e) = client.submit_session(&session, &activity_type).await {
                log::error!("Failed to submit {}: {}", session.id, e);
            }
        }
    });
    (tx, task)
}

/// Activity id from a start response: `id`, `activityId` or `_id`, top level or under `data`.
pub fn parse_activity_id(value: &serde_json::Value) -> Option<String> {
    let candidates = [Some(value), value.get("data"), value.get("activity")];
    candidates.into_iter().flatten().find_map(|object| {
        ["id", "activityId", "_id"]
            .iter()
            .find_map(|key| match object.get(*key)? {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    })
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key)?.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::RawFix;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Recorded {
        request_line: String,
        authorization: Option<String>,
        body: serde_json::Value,
    }

    /// Minimal HTTP/1.1 server answering each request with the next canned response
    async fn fake_api(responses: Vec<(u16, serde_json::Value)>) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::clone(&recorded);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 4096];

                let header_end = loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
                let header = |name: &str| {
                    head.lines().find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
                    })
                };
                let length: usize = header("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
                while buffer.len() < header_end + length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }

                requests.lock().unwrap().push(Recorded {
                    request_line: head.lines().next().unwrap_or_default().to_string(),
                    authorization: header("authorization"),
                    body: serde_json::from_slice(&buffer[header_end..header_end + length]).unwrap_or_default(),
                });

                let payload = body.to_string();
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    payload.len(),
                    payload
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), recorded)
    }

    fn session() -> CompletedSession {
        let track = vec![
            TrackPoint::from_fix(&RawFix::new(-7.797, 110.370, 1_700_000_000_000), 0.0),
            TrackPoint::from_fix(&RawFix::new(-7.7969, 110.370, 1_700_000_003_000), 0.0),
        ];
        CompletedSession {
            id: "session_1700000000000".to_string(),
            started_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            stopped_at: Utc.timestamp_millis_opt(1_700_000_060_000).unwrap(),
            track,
            distance_meters: 11.1,
            duration_seconds: 60,
        }
    }

    #[test]
    fn test_parse_activity_id() {
        assert_eq!(parse_activity_id(&json!({"id": "a1"})), Some("a1".to_string()));
        assert_eq!(parse_activity_id(&json!({"data": {"activityId": 42}})), Some("42".to_string()));
        assert_eq!(parse_activity_id(&json!({"activity": {"_id": "x"}})), Some("x".to_string()));
        assert_eq!(parse_activity_id(&json!({"ok": true})), None);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"message":"Unauthorized"}"#), Some("Unauthorized".to_string()));
        assert_eq!(error_message("<html>"), None);
    }

    #[tokio::test]
    async fn test_submit_session_sequence() {
        let (base, recorded) = fake_api(vec![
            (201, json!({"data": {"id": "act-7"}})),
            (200, json!({"ok": true})),
            (200, json!({"ok": true})),
        ])
        .await;

        let client = ActivityApiClient::new(base, Some("secret".to_string()));
        let id = client.submit_session(&session(), "running").await.unwrap();
        assert_eq!(id, "act-7");

        let requests = recorded.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].request_line.starts_with("POST /activities/start "));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(requests[0].body["activityType"], "running");
        assert_eq!(requests[0].body["startLocation"]["latitude"], -7.797);

        assert!(requests[1].request_line.starts_with("POST /activities/act-7/track "));
        assert_eq!(requests[1].body["trackPoints"].as_array().unwrap().len(), 2);

        assert!(requests[2].request_line.starts_with("PUT /activities/act-7/complete "));
        assert_eq!(requests[2].body["durationSeconds"], 60);
        assert_eq!(requests[2].body["distanceMeters"], 11.1);
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let (base, _) = fake_api(vec![(401, json!({"message": "Token expired"}))]).await;

        let client = ActivityApiClient::new(base, None);
        match client.fetch_profile().await {
            Err(RecorderError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Token expired");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_profile_unwraps_data() {
        let (base, recorded) = fake_api(vec![(200, json!({"data": {"name": "Sari", "email": "s@example.com"}}))]).await;

        let profile = ActivityApiClient::new(base, None).fetch_profile().await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Sari"));
        assert!(recorded.lock().unwrap()[0].request_line.starts_with("GET /users/me "));
    }
}
