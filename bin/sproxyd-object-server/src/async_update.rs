//! Container updates
//!
//! After an object is written or deleted, the container holding it is told
//! about the change. Updates are best effort: a failed update is logged and
//! dropped, never retried or queued.

use http::{HeaderMap, HeaderValue, Method, StatusCode, header::USER_AGENT};
use sproxyd_common::{Error, Result};
use std::time::Duration;
use tracing::{debug, error};

/// Container update to send after an object operation
#[derive(Clone, Debug)]
pub struct AsyncUpdateRequest {
    /// Operation performed on the object (`PUT`, `DELETE`)
    pub op: Method,
    pub account: String,
    pub container: String,
    pub obj: String,
    /// `ip:port` of the container server
    pub host: Option<String>,
    /// Partition of the container
    pub partition: Option<String>,
    /// Device the container lives on
    pub device: Option<String>,
    /// Headers sent along to the container server
    pub headers: HeaderMap,
}

/// Sends container updates with bounded connect and response times
pub struct AsyncUpdateDispatcher {
    http_client: reqwest::Client,
    conn_timeout: Duration,
    node_timeout: Duration,
    user_agent: HeaderValue,
}

impl AsyncUpdateDispatcher {
    /// Create a dispatcher
    ///
    /// `conn_timeout` bounds connecting to the container server and
    /// `node_timeout` bounds waiting for its response. Response headers must
    /// arrive within `conn_timeout + node_timeout` of sending; the body then
    /// gets `node_timeout` on its own.
    pub fn new(conn_timeout: Duration, node_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(conn_timeout)
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;
        let user_agent = HeaderValue::from_str(&format!("obj-server {}", std::process::id()))
            .map_err(|e| Error::internal(e.to_string()))?;

        Ok(Self {
            http_client,
            conn_timeout,
            node_timeout,
            user_agent,
        })
    }

    /// Send the update, if the container location is known
    ///
    /// Never fails: errors, non-2xx responses and timeouts are logged.
    pub async fn notify(&self, request: AsyncUpdateRequest) {
        let (Some(host), Some(partition), Some(device)) = (
            present(request.host.as_deref()),
            present(request.partition.as_deref()),
            present(request.device.as_deref()),
        ) else {
            return;
        };

        let url = container_update_url(
            host,
            device,
            partition,
            &request.account,
            &request.container,
            &request.obj,
        );

        match self.send(&request, &url).await {
            Ok(status) if status.is_success() => {
                debug!("Container update {} {} answered {}", request.op, url, status);
            }
            Ok(status) => {
                error!(
                    host,
                    device,
                    status = status.as_u16(),
                    "ERROR Container update failed: {} response from {}/{}",
                    status.as_u16(),
                    host,
                    device
                );
            }
            Err(e) => {
                error!(
                    host,
                    device,
                    "ERROR container update failed with {}/{}: {}",
                    host,
                    device,
                    e
                );
            }
        }
    }

    async fn send(&self, request: &AsyncUpdateRequest, url: &str) -> Result<StatusCode> {
        let mut headers = request.headers.clone();
        headers.insert(USER_AGENT, self.user_agent.clone());

        let call = self
            .http_client
            .request(request.op.clone(), url)
            .headers(headers)
            .send();
        let response = match tokio::time::timeout(self.conn_timeout + self.node_timeout, call).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.request_error(url, &e)),
            Err(_) => return Err(self.response_timeout()),
        };

        let status = response.status();
        match tokio::time::timeout(self.node_timeout, response.bytes()).await {
            Ok(Ok(_)) => Ok(status),
            Ok(Err(e)) => Err(self.request_error(url, &e)),
            Err(_) => Err(self.response_timeout()),
        }
    }

    fn request_error(&self, url: &str, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::BackendTimeout(format!("connect timeout after {:?}", self.conn_timeout))
        } else {
            Error::BackendConnect {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn response_timeout(&self) -> Error {
        Error::BackendTimeout(format!("no response within {:?}", self.node_timeout))
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// `http://<host>/<device>/<partition>/<account>/<container>/<obj>`, quoted
fn container_update_url(
    host: &str,
    device: &str,
    partition: &str,
    account: &str,
    container: &str,
    obj: &str,
) -> String {
    let path = [device, partition, account, container, obj]
        .iter()
        .flat_map(|segment| segment.split('/'))
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("http://{host}/{path}")
}
