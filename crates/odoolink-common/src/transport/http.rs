//! HTTP Transport
//!
//! Posts JSON-RPC envelopes to `{url}/jsonrpc` through a pooled hyper client.
//! The hyper client keeps its own keep-alive connections, so one
//! [`HttpTransport`] per instance is shared by all clients of that instance.
//! Closing the transport drops that client, which shuts its idle sockets;
//! requests already in flight finish on their own handle.
//!
//! # Status mapping
//!
//! | HTTP status      | Result                                  |
//! |------------------|-----------------------------------------|
//! | 2xx              | body decoded as [`JsonRpcResponse`]      |
//! | 429              | `RateLimit` (with `retry_after` if sent) |
//! | 5xx              | `Connection`                             |
//! | other            | `Unknown` with `details.status`          |
//!
//! A body that is not a JSON-RPC response is reported as `Unknown`
//! ("Invalid response"), which is never retried.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Transport, TransportFactory};
use crate::config::ConnectionConfig;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, OdooError, Result};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Shared HTTP(S) transport for one instance.
pub struct HttpTransport {
    url: String,
    endpoint: Uri,
    // `None` once closed.
    client: Mutex<Option<HttpsClient>>,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Builds the transport. No connection is opened until the first send.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let endpoint: Uri = config.endpoint().parse().map_err(|e| {
            OdooError::connection(format!("Invalid endpoint: {e}")).with_detail("url", config.url())
        })?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.timeout()));

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_connections())
            .build(connector);

        Ok(Self {
            url: config.url().to_string(),
            endpoint,
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn status_error(&self, status: StatusCode, retry_after: Option<String>) -> OdooError {
        let message = format!("HTTP {status}");
        let err = if status == StatusCode::TOO_MANY_REQUESTS {
            let err = OdooError::rate_limit(message);
            match retry_after {
                Some(value) => err.with_detail("retry_after", value),
                None => err,
            }
        } else if status.is_server_error() {
            OdooError::connection(message)
        } else {
            OdooError::unknown(message)
        };
        err.with_detail("status", status.as_u16())
            .with_detail("url", self.url.as_str())
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let client = self.client.lock().await.clone().ok_or_else(|| {
            OdooError::connection("Transport is closed").with_detail("url", self.url.as_str())
        })?;

        let body = serde_json::to_vec(request)?;
        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| OdooError::connection(format!("Failed to build request: {e}")))?;

        let response = client.request(http_request).await.map_err(|e| {
            let message = if e.is_connect() {
                format!("Failed to connect: {e}")
            } else {
                format!("HTTP request failed: {e}")
            };
            OdooError::connection(message).with_detail("url", self.url.as_str())
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| {
                OdooError::connection(format!("Failed to read response: {e}"))
                    .with_detail("url", self.url.as_str())
            })?
            .to_bytes();

        if !status.is_success() {
            return Err(self.status_error(status, retry_after));
        }

        serde_json::from_slice(&body).map_err(|e| {
            OdooError::unknown(format!("Invalid response: {e}")).with_detail("url", self.url.as_str())
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.lock().await.take();
            tracing::debug!(url = %self.url, "closed HTTP transport");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Builds an [`HttpTransport`] per instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorKind, JsonRpcError, FaultData};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::Response;
    use hyper_util::rt::TokioIo;
    use serde_json::json;
    use std::future::Future;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Serves every connection with `handler` until the test ends.
    async fn spawn_server<F, Fut>(handler: F) -> String
    where
        F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    let io = TokioIo::new(stream);
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let handler = handler.clone();
                            async move { Ok::<_, hyper::Error>(handler(req).await) }
                        });
                        let _ = http1::Builder::new().serve_connection(io, service).await;
                    });
                }
            }
        });

        format!("http://{addr}")
    }

    fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    fn transport_for(url: &str) -> HttpTransport {
        let config = ConnectionConfig::new("test", url, "db", "admin", "admin", Duration::from_secs(2), 2)
            .unwrap();
        HttpTransport::new(&config).unwrap()
    }

    fn version_request() -> JsonRpcRequest {
        JsonRpcRequest::service_call("common", "version", json!([]), 1)
    }

    #[tokio::test]
    async fn test_posts_to_jsonrpc_endpoint() {
        let url = spawn_server(|req: Request<Incoming>| async move {
            assert_eq!(req.uri().path(), "/jsonrpc");
            assert_eq!(req.method(), Method::POST);
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let rpc: JsonRpcRequest = serde_json::from_slice(&body).unwrap();
            let response = JsonRpcResponse::success(rpc.id, json!({"echo": rpc.params}));
            json_response(StatusCode::OK, serde_json::to_vec(&response).unwrap())
        })
        .await;

        let transport = transport_for(&url);
        let response = transport.send(&version_request()).await.unwrap();
        assert_eq!(response.result.unwrap()["echo"]["service"], json!("common"));
    }

    #[tokio::test]
    async fn test_fault_envelope_is_returned_not_raised() {
        let url = spawn_server(|_req| async move {
            let fault = JsonRpcError::server_fault(FaultData::new("odoo.exceptions.UserError", "nope"));
            let response = JsonRpcResponse::error(json!(1), fault);
            json_response(StatusCode::OK, serde_json::to_vec(&response).unwrap())
        })
        .await;

        let response = transport_for(&url).send(&version_request()).await.unwrap();
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        for (status, kind) in [
            (StatusCode::TOO_MANY_REQUESTS, ErrorKind::RateLimit),
            (StatusCode::BAD_GATEWAY, ErrorKind::Connection),
            (StatusCode::NOT_FOUND, ErrorKind::Unknown),
        ] {
            let url = spawn_server(move |_req| async move { json_response(status, b"nope".to_vec()) }).await;
            let err = transport_for(&url).send(&version_request()).await.unwrap_err();
            assert_eq!(err.kind(), kind, "status {status}");
            assert_eq!(err.details()["status"], json!(status.as_u16()));
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let url = spawn_server(|_req| async move {
            json_response(StatusCode::OK, b"this is not json".to_vec())
        })
        .await;

        let err = transport_for(&url).send(&version_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(!err.is_retryable());
        assert!(err.message().contains("Invalid response"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport_for(&format!("http://{addr}"))
            .send(&version_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_close_shuts_idle_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (ended_tx, mut ended_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let ended_tx = ended_tx.clone();
                tokio::spawn(async move {
                    let service = service_fn(|_req: Request<Incoming>| async move {
                        let response = JsonRpcResponse::success(json!(1), json!({"server_version": "17.0"}));
                        Ok::<_, hyper::Error>(json_response(StatusCode::OK, serde_json::to_vec(&response).unwrap()))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                    let _ = ended_tx.send(());
                });
            }
        });

        let transport = transport_for(&url);
        transport.send(&version_request()).await.unwrap();
        assert!(ended_rx.try_recv().is_err(), "keep-alive connection should stay open");

        transport.close().await;
        let ended = tokio::time::timeout(Duration::from_secs(2), ended_rx.recv()).await;
        assert!(matches!(ended, Ok(Some(()))), "idle connection still open after close");
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_sends() {
        let transport = transport_for("http://127.0.0.1:9");
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        let err = transport.send(&version_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.message().contains("closed"));
    }
}
