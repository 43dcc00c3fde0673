//! Sproxyd HTTP client
//!
//! Objects live at `<endpoint><name>`. User metadata travels base64-encoded
//! JSON in the `x-scal-usermd` header. Endpoints are tried in order and a
//! request only moves on to the next endpoint when connecting fails.

use crate::backend::{BackendClient, ByteRange, ClientFactory};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use sproxyd_common::{BackendTimeouts, Error, ObjectMetadata, PolicyIndex, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying user metadata
pub const USERMD_HEADER: &str = "x-scal-usermd";
/// Header selecting a sproxyd command
pub const COMMAND_HEADER: &str = "x-scal-cmd";

/// Client for one or more sproxyd endpoints
pub struct SproxydClient {
    endpoints: Vec<String>,
    http_client: reqwest::Client,
}

impl SproxydClient {
    /// Create a new client
    ///
    /// No connection is made until the first request.
    pub fn new(endpoints: Vec<String>, timeouts: BackendTimeouts) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::configuration("sproxyd client needs at least one endpoint"));
        }
        for endpoint in &endpoints {
            let url = reqwest::Url::parse(endpoint)
                .map_err(|e| Error::configuration(format!("invalid endpoint {endpoint}: {e}")))?;
            if !url.path().ends_with('/') {
                return Err(Error::configuration(format!(
                    "endpoint {endpoint} must end with '/'"
                )));
            }
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.connect + timeouts.read)
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;

        Ok(Self {
            endpoints,
            http_client,
        })
    }

    /// Send a request, failing over to the next endpoint on connect errors
    async fn send<F>(&self, name: &str, build: F) -> Result<(String, reqwest::Response)>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let url = format!("{endpoint}{name}");
            match build(&url).send().await {
                Ok(response) => return Ok((url, response)),
                Err(e) if e.is_connect() => {
                    warn!("Failed to connect to sproxyd endpoint {}: {}", endpoint, e);
                    last_error = Some(if e.is_timeout() {
                        Error::BackendTimeout(format!("connecting to {endpoint}"))
                    } else {
                        Error::BackendConnect {
                            endpoint: endpoint.clone(),
                            reason: e.to_string(),
                        }
                    });
                }
                Err(e) if e.is_timeout() => return Err(Error::BackendTimeout(url)),
                Err(e) => {
                    return Err(Error::BackendConnect {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::internal("no sproxyd endpoint tried")))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client.request(method, url)
    }
}

#[async_trait]
impl BackendClient for SproxydClient {
    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn get_object(&self, name: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let (url, response) = self
            .send(name, |url| {
                let request = self.request(Method::GET, url);
                match range {
                    Some(range) => request.header(reqwest::header::RANGE, range.to_string()),
                    None => request,
                }
            })
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => read_body(&url, response).await,
            StatusCode::NOT_FOUND => Err(Error::ObjectNotFound(name.to_string())),
            status => Err(backend_error(status, url)),
        }
    }

    async fn put_object(&self, name: &str, data: Bytes, metadata: &ObjectMetadata) -> Result<()> {
        let usermd = encode_usermd(metadata)?;
        let (url, response) = self
            .send(name, |url| {
                self.request(Method::PUT, url)
                    .header(USERMD_HEADER, usermd.as_str())
                    .body(data.clone())
            })
            .await?;

        if response.status() != StatusCode::OK {
            return Err(backend_error(response.status(), url));
        }
        debug!("Data successfully written for object {}", name);
        Ok(())
    }

    async fn get_meta(&self, name: &str) -> Result<Option<ObjectMetadata>> {
        let (url, response) = self
            .send(name, |url| self.request(Method::HEAD, url))
            .await?;

        match response.status() {
            StatusCode::OK => response
                .headers()
                .get(USERMD_HEADER)
                .map(|value| {
                    value
                        .to_str()
                        .map_err(|e| Error::Serialization(e.to_string()))
                        .and_then(decode_usermd)
                })
                .transpose()
                .map(|metadata| Some(metadata.unwrap_or_default())),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(backend_error(status, url)),
        }
    }

    async fn put_meta(&self, name: &str, metadata: &ObjectMetadata) -> Result<()> {
        let usermd = encode_usermd(metadata)?;
        let (url, response) = self
            .send(name, |url| {
                self.request(Method::PUT, url)
                    .header(COMMAND_HEADER, "update-usermd")
                    .header(USERMD_HEADER, usermd.as_str())
            })
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::ObjectNotFound(name.to_string())),
            status => Err(backend_error(status, url)),
        }
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let (url, response) = self
            .send(name, |url| self.request(Method::DELETE, url))
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::ObjectNotFound(name.to_string())),
            status => Err(backend_error(status, url)),
        }
    }
}

/// Builds [`SproxydClient`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct SproxydClientFactory;

#[async_trait]
impl ClientFactory for SproxydClientFactory {
    async fn create(
        &self,
        policy: PolicyIndex,
        endpoints: Vec<String>,
        timeouts: BackendTimeouts,
    ) -> Result<Arc<dyn BackendClient>> {
        debug!(policy = %policy, "Building sproxyd client for {:?}", endpoints);
        Ok(Arc::new(SproxydClient::new(endpoints, timeouts)?))
    }
}

async fn read_body(url: &str, response: reqwest::Response) -> Result<Bytes> {
    response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            Error::BackendTimeout(url.to_string())
        } else {
            Error::BackendConnect {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    })
}

fn backend_error(status: StatusCode, url: String) -> Error {
    Error::Backend {
        status: status.as_u16(),
        url,
    }
}

/// Encode metadata for the `x-scal-usermd` header
pub fn encode_usermd(metadata: &ObjectMetadata) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(metadata)?))
}

/// Decode an `x-scal-usermd` header value
pub fn decode_usermd(value: &str) -> Result<ObjectMetadata> {
    let raw = STANDARD
        .decode(value.trim())
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        extract::{Path, State},
        http::{HeaderMap, Method as HttpMethod, StatusCode as HttpStatus},
        response::{IntoResponse, Response},
        routing::any,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    type Store = Arc<Mutex<HashMap<String, (Bytes, String)>>>;

    async fn fake_sproxyd(
        State(store): State<Store>,
        method: HttpMethod,
        Path(name): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        if name.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        let usermd = headers
            .get(USERMD_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let mut store = store.lock().unwrap();

        match method {
            HttpMethod::PUT if headers.contains_key(COMMAND_HEADER) => match store.get_mut(&name) {
                Some(entry) => {
                    entry.1 = usermd;
                    HttpStatus::OK.into_response()
                }
                None => HttpStatus::NOT_FOUND.into_response(),
            },
            HttpMethod::PUT => {
                store.insert(name, (body, usermd));
                HttpStatus::OK.into_response()
            }
            HttpMethod::GET | HttpMethod::HEAD => match store.get(&name) {
                Some((data, usermd)) => {
                    let (status, data) = match headers.get("range").and_then(|v| v.to_str().ok()) {
                        Some(range) => {
                            let (start, end) = range
                                .trim_start_matches("bytes=")
                                .split_once('-')
                                .unwrap();
                            let (start, end): (usize, usize) =
                                (start.parse().unwrap(), end.parse().unwrap());
                            (HttpStatus::PARTIAL_CONTENT, data.slice(start..=end))
                        }
                        None => (HttpStatus::OK, data.clone()),
                    };
                    let body = if method == HttpMethod::HEAD {
                        Body::empty()
                    } else {
                        Body::from(data)
                    };
                    Response::builder()
                        .status(status)
                        .header(USERMD_HEADER, usermd.as_str())
                        .body(body)
                        .unwrap()
                }
                None => HttpStatus::NOT_FOUND.into_response(),
            },
            HttpMethod::DELETE => match store.remove(&name) {
                Some(_) => HttpStatus::OK.into_response(),
                None => HttpStatus::NOT_FOUND.into_response(),
            },
            _ => HttpStatus::METHOD_NOT_ALLOWED.into_response(),
        }
    }

    async fn spawn_sproxyd() -> String {
        let store: Store = Arc::default();
        let app = Router::new()
            .route("/proxy/{*name}", any(fake_sproxyd))
            .with_state(store);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/proxy/")
    }

    fn metadata(pairs: &[(&str, &str)]) -> ObjectMetadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_usermd_encoding() {
        let meta = metadata(&[("name", "/a/c/o"), ("Content-Type", "text/plain")]);
        let encoded = encode_usermd(&meta).unwrap();
        assert_eq!(decode_usermd(&encoded).unwrap(), meta);
        assert!(decode_usermd("%%%").is_err());
    }

    #[test]
    fn test_new_validates_endpoints() {
        assert!(SproxydClient::new(vec![], BackendTimeouts::default()).is_err());
        assert!(SproxydClient::new(vec!["not a url".into()], BackendTimeouts::default()).is_err());
        assert!(
            SproxydClient::new(vec!["http://h:81/proxy".into()], BackendTimeouts::default())
                .is_err()
        );

        let client =
            SproxydClient::new(vec!["http://h:81/proxy/".into()], BackendTimeouts::default())
                .unwrap();
        assert_eq!(client.endpoints(), ["http://h:81/proxy/"]);
    }

    #[tokio::test]
    async fn test_object_lifecycle() {
        let endpoint = spawn_sproxyd().await;
        let client = SproxydClient::new(vec![endpoint], BackendTimeouts::default()).unwrap();

        assert!(client.get_meta("obj").await.unwrap().is_none());

        let meta = metadata(&[("X-Timestamp", "1400000000.00000")]);
        client
            .put_object("obj", Bytes::from_static(b"hello world"), &meta)
            .await
            .unwrap();
        assert_eq!(client.get_meta("obj").await.unwrap(), Some(meta));
        assert_eq!(
            client.get_object("obj", None).await.unwrap(),
            Bytes::from_static(b"hello world")
        );
        assert_eq!(
            client
                .get_object("obj", Some(ByteRange::new(6, 10)))
                .await
                .unwrap(),
            Bytes::from_static(b"world")
        );

        let updated = metadata(&[("X-Object-Meta-Color", "blue")]);
        client.put_meta("obj", &updated).await.unwrap();
        assert_eq!(client.get_meta("obj").await.unwrap(), Some(updated));

        client.delete_object("obj").await.unwrap();
        assert!(matches!(
            client.get_object("obj", None).await,
            Err(Error::ObjectNotFound(_))
        ));
        assert!(matches!(
            client.delete_object("obj").await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failover_on_connect_error() {
        let live = spawn_sproxyd().await;
        let timeouts = BackendTimeouts::new(Duration::from_secs(1), Duration::from_secs(1));
        let client =
            SproxydClient::new(vec!["http://127.0.0.1:1/proxy/".into(), live], timeouts).unwrap();

        client
            .put_object("obj", Bytes::from_static(b"x"), &ObjectMetadata::new())
            .await
            .unwrap();
        assert_eq!(
            client.get_object("obj", None).await.unwrap(),
            Bytes::from_static(b"x")
        );
    }

    #[tokio::test]
    async fn test_all_endpoints_down() {
        let timeouts = BackendTimeouts::new(Duration::from_secs(1), Duration::from_secs(1));
        let client = SproxydClient::new(vec!["http://127.0.0.1:1/proxy/".into()], timeouts).unwrap();
        let err = client.get_meta("obj").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error {err:?}");
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let endpoint = spawn_sproxyd().await;
        let timeouts = BackendTimeouts::new(Duration::from_millis(200), Duration::from_millis(200));
        let client = SproxydClient::new(vec![endpoint], timeouts).unwrap();
        assert!(matches!(
            client.get_object("slow-obj", None).await,
            Err(Error::BackendTimeout(_))
        ));
    }
}
