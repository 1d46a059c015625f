pub mod models;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, Url,
};
use tracing::debug;

use crate::{
    config::InfluxConfig,
    ingest::{AdapterError, SensorRecord, TimeSeriesStore},
};

use self::models::Point;

/// Writes points to an InfluxDB v2 bucket over the HTTP write API.
///
/// Cheap to clone; the underlying `reqwest::Client` pools connections and
/// applies the configured request timeout to every write.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    /// `{url}/api/v2/write?org=..&bucket=..&precision=ms`
    write_url: Url,
    token: String,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build InfluxDB HTTP client")?;

        let write_url = Url::parse_with_params(
            &format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            [
                ("org", config.org.as_str()),
                ("bucket", config.bucket.as_str()),
                ("precision", "ms"),
            ],
        )
        .with_context(|| format!("INFLUX_URL is not a valid URL: {:?}", config.url))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                write_url,
                token: config.token.clone(),
            }),
        })
    }

    /// Write one or more points in a single request.
    ///
    /// Any non-2xx response is returned as [`AdapterError::Rejected`] carrying
    /// InfluxDB's error body.
    pub async fn write(&self, points: &[Point]) -> Result<(), AdapterError> {
        let body = points
            .iter()
            .map(Point::to_line)
            .collect::<Vec<_>>()
            .join("\n");
        debug!(url = %self.inner.write_url, points = points.len(), "Writing points to InfluxDB");

        let response = self
            .inner
            .http
            .post(self.inner.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.inner.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn commit_point(&self, record: &SensorRecord) -> Result<(), AdapterError> {
        let point = Point::from_record(record, chrono::Utc::now());
        self.write(&[point]).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{
        extract::{RawQuery, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Router,
    };
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Debug, Clone)]
    struct Captured {
        query: Option<String>,
        authorization: Option<String>,
        body: String,
    }

    #[derive(Clone)]
    struct FakeInflux {
        status: StatusCode,
        captured: Arc<Mutex<Vec<Captured>>>,
    }

    async fn write_handler(
        State(fake): State<FakeInflux>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, &'static str) {
        fake.captured.lock().unwrap().push(Captured {
            query,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            body,
        });
        let reply = if fake.status.is_success() {
            ""
        } else {
            r#"{"code":"invalid","message":"unable to parse points"}"#
        };
        (fake.status, reply)
    }

    /// Serve a fake `/api/v2/write` on an ephemeral port.
    async fn spawn_fake(status: StatusCode) -> (String, Arc<Mutex<Vec<Captured>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/api/v2/write", post(write_handler))
            .with_state(FakeInflux {
                status,
                captured: captured.clone(),
            });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    fn config(url: &str) -> InfluxConfig {
        InfluxConfig {
            url: url.to_owned(),
            token: "secret-token".into(),
            org: "my org".into(),
            bucket: "sensor_bucket".into(),
            timeout: Duration::from_secs(2),
        }
    }

    fn record() -> SensorRecord {
        SensorRecord {
            device_id: "child123".into(),
            gateway_id: Some("gw-1".into()),
            timestamp: None,
            temperature: 21.5,
            humidity: 60.0,
            light: 300.0,
            soil_cap: 450.0,
            soil_res: 200.0,
            water_level: 80.0,
        }
    }

    #[tokio::test]
    async fn commit_point_posts_line_protocol() {
        let (url, captured) = spawn_fake(StatusCode::NO_CONTENT).await;
        let client = InfluxClient::new(&config(&url)).unwrap();

        client.commit_point(&record()).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let req = &captured[0];
        assert_eq!(req.authorization.as_deref(), Some("Token secret-token"));
        assert_eq!(
            req.query.as_deref(),
            Some("org=my+org&bucket=sensor_bucket&precision=ms")
        );
        assert!(req
            .body
            .starts_with("sensor_data,device_id=child123,gateway_id=gw-1 temperature=21.5,"));
    }

    #[tokio::test]
    async fn commit_twice_writes_two_points() {
        let (url, captured) = spawn_fake(StatusCode::NO_CONTENT).await;
        let client = InfluxClient::new(&config(&url)).unwrap();

        client.commit_point(&record()).await.unwrap();
        client.commit_point(&record()).await.unwrap();

        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn error_status_is_rejected_with_body() {
        let (url, _) = spawn_fake(StatusCode::BAD_REQUEST).await;
        let client = InfluxClient::new(&config(&url)).unwrap();

        let err = client.commit_point(&record()).await.unwrap_err();

        match err {
            AdapterError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("unable to parse points"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = InfluxClient::new(&config(&format!("http://{addr}"))).unwrap();
        let err = client.commit_point(&record()).await.unwrap_err();

        assert!(matches!(err, AdapterError::Connection(_)), "got {err:?}");
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let err = InfluxClient::new(&config("not a url")).unwrap_err();
        assert!(err.to_string().contains("INFLUX_URL"));
    }
}
