// src/ship/sender.rs
//! Telemetry senders
//!
//! [`HttpSender`] posts each batch as JSON to the configured ingest endpoint
//! (optionally zstd compressed). [`LogSender`] only logs what would have been
//! sent and is used when no endpoint is configured.

use crate::observability::BATCHES_SENT_TOTAL;
use crate::ship::compressor::PayloadCompressor;
use crate::telemetry::buffer::{EventBatch, MetricBatch};
use crate::utils::config::TelemetryConfig;
use crate::utils::errors::{DaemonError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "Api-Key";

/// Ships batches to the telemetry backend. Each batch is sent at most once.
#[async_trait]
pub trait TelemetrySender: Send + Sync {
    async fn send_metrics(&self, batch: MetricBatch) -> Result<()>;

    async fn send_events(&self, batch: EventBatch) -> Result<()>;
}

/// JSON over HTTP
pub struct HttpSender {
    client: Client<HttpConnector, Full<Bytes>>,
    metrics_uri: Option<Uri>,
    events_uri: Option<Uri>,
    api_key: Option<String>,
    compressor: PayloadCompressor,
    timeout: Duration,
    user_agent: String,
}

impl HttpSender {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            client,
            metrics_uri: parse_uri(config.metrics_uri.as_deref())?,
            events_uri: parse_uri(config.events_uri.as_deref())?,
            api_key: config.api_key.clone(),
            compressor: PayloadCompressor::new(config.compression),
            timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: crate::BuildInfo::current().user_agent(),
        })
    }

    async fn post<T: Serialize>(&self, uri: &Uri, kind: &str, batch: &T) -> Result<()> {
        // The ingest APIs take an array of batches.
        let json = serde_json::to_vec(&[batch])
            .map_err(|e| DaemonError::SendFailed(format!("Serialization error: {}", e)))?;
        let payload = self.compressor.compress(json)?;

        let mut request = Request::post(uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, self.user_agent.as_str());
        if let Some(encoding) = self.compressor.content_encoding() {
            request = request.header(CONTENT_ENCODING, encoding);
        }
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.as_str());
        }
        let request = request
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| DaemonError::SendFailed(format!("Request build error: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| DaemonError::SendFailed(format!("{} request timed out after {:?}", kind, self.timeout)))?
            .map_err(|e| DaemonError::SendFailed(format!("{} request failed: {}", kind, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .into_body()
                .collect()
                .await
                .map(|b| String::from_utf8_lossy(&b.to_bytes()).into_owned())
                .unwrap_or_default();
            return Err(DaemonError::SendFailed(format!("{} rejected with {}: {}", kind, status, body)));
        }

        metrics::counter!(BATCHES_SENT_TOTAL).increment(1);
        debug!("{} batch accepted ({})", kind, status);
        Ok(())
    }
}

fn parse_uri(raw: Option<&str>) -> Result<Option<Uri>> {
    raw.map(|s| {
        s.parse::<Uri>()
            .map_err(|e| DaemonError::ConfigError(format!("Invalid ingest URI {}: {}", s, e)))
    })
    .transpose()
}

#[async_trait]
impl TelemetrySender for HttpSender {
    async fn send_metrics(&self, batch: MetricBatch) -> Result<()> {
        let Some(uri) = &self.metrics_uri else {
            warn!("Dropping {} metrics: no metrics URI configured", batch.len());
            return Ok(());
        };
        self.post(uri, "metrics", &batch).await
    }

    async fn send_events(&self, batch: EventBatch) -> Result<()> {
        let Some(uri) = &self.events_uri else {
            warn!("Dropping {} events: no events URI configured", batch.len());
            return Ok(());
        };
        self.post(uri, "events", &batch).await
    }
}

/// Logs batches instead of sending them
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl TelemetrySender for LogSender {
    async fn send_metrics(&self, batch: MetricBatch) -> Result<()> {
        info!("Would send {} metrics", batch.len());
        if let Ok(json) = serde_json::to_string(&batch) {
            debug!("{}", json);
        }
        Ok(())
    }

    async fn send_events(&self, batch: EventBatch) -> Result<()> {
        info!("Would send {} events", batch.len());
        if let Ok(json) = serde_json::to_string(&batch) {
            debug!("{}", json);
        }
        Ok(())
    }
}

/// Collects batches in memory
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySender {
    pub metrics: parking_lot::Mutex<Vec<MetricBatch>>,
    pub events: parking_lot::Mutex<Vec<EventBatch>>,
}

#[cfg(test)]
#[async_trait]
impl TelemetrySender for MemorySender {
    async fn send_metrics(&self, batch: MetricBatch) -> Result<()> {
        self.metrics.lock().push(batch);
        Ok(())
    }

    async fn send_events(&self, batch: EventBatch) -> Result<()> {
        self.events.lock().push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::attributes::{Attributes, CommonAttributes};
    use crate::telemetry::buffer::TelemetryBuffer;
    use crate::telemetry::record::Metric;
    use crate::utils::config::PayloadCompression;
    use crate::utils::time::epoch;
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[derive(Debug)]
    struct Captured {
        headers: hyper::HeaderMap,
        body: Vec<u8>,
    }

    /// One-shot HTTP server answering `status` and handing back the request.
    async fn serve_once(status: StatusCode) -> (String, tokio::sync::oneshot::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
            let service = service_fn(move |req: Request<Incoming>| {
                let tx = Arc::clone(&tx);
                async move {
                    let headers = req.headers().clone();
                    let body = req.into_body().collect().await?.to_bytes().to_vec();
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Captured { headers, body });
                    }
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(status)
                            .body(Full::new(Bytes::from_static(b"{}")))
                            .unwrap(),
                    )
                }
            });
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });

        (format!("http://{}/metric/v1", addr), rx)
    }

    fn metric_batch() -> MetricBatch {
        let common = Arc::new(CommonAttributes::resolve("svc", Some("host-1")));
        let mut buffer = TelemetryBuffer::new(common);
        buffer.add_metric(Metric::gauge("jfr.CPULoad.jvmUser", 0.5, epoch(), Attributes::new()));
        buffer.create_metric_batch()
    }

    fn config(uri: String, compression: PayloadCompression) -> TelemetryConfig {
        TelemetryConfig {
            metrics_uri: Some(uri),
            api_key: Some("secret".into()),
            compression,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_posts_compressed_metrics() {
        let (uri, captured) = serve_once(StatusCode::ACCEPTED).await;
        let sender = HttpSender::new(&config(uri, PayloadCompression::Zstd)).unwrap();

        sender.send_metrics(metric_batch()).await.unwrap();

        let captured = captured.await.unwrap();
        assert_eq!(captured.headers["Api-Key"], "secret");
        assert_eq!(captured.headers[CONTENT_ENCODING], "zstd");
        assert!(captured.headers[USER_AGENT].to_str().unwrap().starts_with("harvestd/"));

        let json = zstd::decode_all(captured.body.as_slice()).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(payload[0]["metrics"][0]["name"], "jfr.CPULoad.jvmUser");
        assert_eq!(payload[0]["common"]["attributes"]["service.name"], "svc");
    }

    #[tokio::test]
    async fn test_rejected_batch_is_send_failure() {
        let (uri, _captured) = serve_once(StatusCode::FORBIDDEN).await;
        let sender = HttpSender::new(&config(uri, PayloadCompression::None)).unwrap();

        let err = sender.send_metrics(metric_batch()).await.unwrap_err();
        assert!(matches!(err, DaemonError::SendFailed(_)));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_invalid_uri_rejected() {
        let config = TelemetryConfig {
            events_uri: Some("not a uri".into()),
            ..Default::default()
        };
        assert!(matches!(HttpSender::new(&config), Err(DaemonError::ConfigError(_))));
    }
}
