//! Object server HTTP handlers

use crate::async_update::AsyncUpdateRequest;
use crate::gateway::ObjectGateway;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use sproxyd_client::ByteRange;
use sproxyd_common::{Error, ObjectMetadata, PolicyIndex, PolicySelector};
use sproxyd_diskfile::diskfile::{DELETE_AT_KEY, NAME_KEY, TIMESTAMP_KEY};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Largest object accepted, matching the Swift default `max_file_size`
const MAX_OBJECT_SIZE: usize = 5 * 1024 * 1024 * 1024 + 2;

pub const POLICY_INDEX_HEADER: &str = "x-backend-storage-policy-index";
pub const CONTAINER_HOST_HEADER: &str = "x-container-host";
pub const CONTAINER_PARTITION_HEADER: &str = "x-container-partition";
pub const CONTAINER_DEVICE_HEADER: &str = "x-container-device";

const OBJECT_META_PREFIX: &str = "x-object-meta-";
const CONTENT_TYPE_KEY: &str = "Content-Type";
const CONTENT_LENGTH_KEY: &str = "Content-Length";
const ETAG_KEY: &str = "ETag";

type ObjectPath = Path<(String, String, String, String, String)>;

/// Build the object server router
pub fn router(gateway: Arc<ObjectGateway>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/{device}/{partition}", any(replicate))
        .route("/{device}/{partition}/{suffixes}", any(replicate))
        .route(
            "/{device}/{partition}/{account}/{container}/{*obj}",
            get(get_object)
                .head(head_object)
                .put(put_object)
                .delete(delete_object),
        )
        .layer(DefaultBodyLimit::max(MAX_OBJECT_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Error answered to a client
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request failed: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

async fn healthcheck() -> &'static str {
    "OK"
}

async fn put_object(
    State(gateway): State<Arc<ObjectGateway>>,
    Path((device, partition, account, container, obj)): ObjectPath,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let policy = policy_selector(&headers)?;
    let timestamp = required_header(&headers, "x-timestamp")?;
    let content_type = header_str(&headers, header::CONTENT_TYPE.as_str())
        .unwrap_or("application/octet-stream")
        .to_string();
    let etag = hex::encode(md5::compute(&body).0);
    let size = body.len();

    let mut metadata = ObjectMetadata::from([
        (TIMESTAMP_KEY.to_string(), timestamp.to_string()),
        (CONTENT_TYPE_KEY.to_string(), content_type.clone()),
        (CONTENT_LENGTH_KEY.to_string(), size.to_string()),
        (ETAG_KEY.to_string(), etag.clone()),
    ]);
    if let Some(delete_at) = header_str(&headers, "x-delete-at") {
        metadata.insert(DELETE_AT_KEY.to_string(), delete_at.to_string());
    }
    metadata.extend(user_metadata(&headers));

    let df = gateway
        .get_diskfile(&device, &partition, &account, &container, &obj, policy)
        .await?;
    df.write(body, metadata).await?;

    let update_headers = header_map(&[
        ("x-size", size.to_string()),
        ("x-content-type", content_type),
        ("x-timestamp", timestamp.to_string()),
        ("x-etag", etag.clone()),
    ]);
    gateway
        .async_update(container_update(
            Method::PUT,
            account,
            container,
            obj,
            &headers,
            update_headers,
        ))
        .await;

    Ok((StatusCode::CREATED, [(header::ETAG, etag)]).into_response())
}

async fn get_object(
    State(gateway): State<Arc<ObjectGateway>>,
    Path((device, partition, account, container, obj)): ObjectPath,
    headers: HeaderMap,
) -> ApiResult {
    let policy = policy_selector(&headers)?;
    let mut df = gateway
        .get_diskfile(&device, &partition, &account, &container, &obj, policy)
        .await?;
    let metadata = df.read_metadata().await?;
    let size = metadata
        .get(CONTENT_LENGTH_KEY)
        .and_then(|len| len.parse::<u64>().ok());

    let mut response_headers = metadata_headers(&metadata, false);
    let range = header_str(&headers, header::RANGE.as_str()).and_then(parse_range);

    match (range, size) {
        (Some(range), Some(size)) if range.start >= size => Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{size}"))],
        )
            .into_response()),
        (Some(range), Some(size)) if size > 0 => {
            let range = ByteRange::new(range.start, range.end.min(size - 1));
            let data = df.read(Some(range)).await?;
            if let Ok(value) =
                HeaderValue::from_str(&format!("bytes {}-{}/{size}", range.start, range.end))
            {
                response_headers.insert(header::CONTENT_RANGE, value);
            }
            Ok((StatusCode::PARTIAL_CONTENT, response_headers, data).into_response())
        }
        _ => {
            let data = df.read(None).await?;
            Ok((StatusCode::OK, response_headers, data).into_response())
        }
    }
}

async fn head_object(
    State(gateway): State<Arc<ObjectGateway>>,
    Path((device, partition, account, container, obj)): ObjectPath,
    headers: HeaderMap,
) -> ApiResult {
    let policy = policy_selector(&headers)?;
    let mut df = gateway
        .get_diskfile(&device, &partition, &account, &container, &obj, policy)
        .await?;
    let metadata = df.read_metadata().await?;

    Ok((StatusCode::OK, metadata_headers(&metadata, true)).into_response())
}

async fn delete_object(
    State(gateway): State<Arc<ObjectGateway>>,
    Path((device, partition, account, container, obj)): ObjectPath,
    headers: HeaderMap,
) -> ApiResult {
    let policy = policy_selector(&headers)?;
    let timestamp = required_header(&headers, "x-timestamp")?;
    let mut df = gateway
        .get_diskfile(&device, &partition, &account, &container, &obj, policy)
        .await?;
    df.open().await?;
    df.delete().await?;

    let update_headers = header_map(&[("x-timestamp", timestamp.to_string())]);
    gateway
        .async_update(container_update(
            Method::DELETE,
            account,
            container,
            obj,
            &headers,
            update_headers,
        ))
        .await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn replicate(
    State(gateway): State<Arc<ObjectGateway>>,
    method: Method,
    Path(params): Path<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult {
    if method.as_str() != "REPLICATE" {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let policy = policy_selector(&headers)?;
    let (Some(device), Some(partition)) = (params.get("device"), params.get("partition")) else {
        return Err(Error::invalid_request("missing device or partition").into());
    };
    let suffixes: Vec<String> = params
        .get("suffixes")
        .map(|s| s.split('-').filter(|s| !s.is_empty()).map(String::from).collect())
        .unwrap_or_default();

    let hashes = gateway.replicate(device, partition, &suffixes, policy);
    Ok(Json(hashes).into_response())
}

/// Policy selector of a request; an absent header means unspecified
fn policy_selector(headers: &HeaderMap) -> Result<PolicySelector, ApiError> {
    match header_str(headers, POLICY_INDEX_HEADER) {
        None => Ok(PolicySelector::Unspecified),
        Some(value) => value
            .parse::<PolicyIndex>()
            .map(PolicySelector::from)
            .map_err(|e| Error::invalid_request(e.to_string()).into()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    header_str(headers, name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::invalid_request(format!("missing {name} header")).into())
}

/// `X-Object-Meta-*` request headers, with their names title cased
fn user_metadata(headers: &HeaderMap) -> ObjectMetadata {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(OBJECT_META_PREFIX))
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((title_case(name.as_str()), value.to_string()))
        })
        .collect()
}

fn title_case(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Response headers for stored metadata
///
/// `Content-Length` is only copied for HEAD; GET bodies carry their own.
fn metadata_headers(metadata: &ObjectMetadata, with_length: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in metadata {
        if key == NAME_KEY || (key == CONTENT_LENGTH_KEY && !with_length) {
            continue;
        }
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping metadata {:?} not representable as a header", key),
        }
    }
    headers
}

fn header_map(pairs: &[(&'static str, String)]) -> HeaderMap {
    pairs
        .iter()
        .filter_map(|(name, value)| {
            HeaderValue::from_str(value)
                .ok()
                .map(|value| (HeaderName::from_static(name), value))
        })
        .collect()
}

fn container_update(
    op: Method,
    account: String,
    container: String,
    obj: String,
    request_headers: &HeaderMap,
    mut headers: HeaderMap,
) -> AsyncUpdateRequest {
    let field = |name: &str| header_str(request_headers, name).map(String::from);
    if let Some(policy) = request_headers.get(POLICY_INDEX_HEADER) {
        headers.insert(POLICY_INDEX_HEADER, policy.clone());
    }
    AsyncUpdateRequest {
        op,
        account,
        container,
        obj,
        host: field(CONTAINER_HOST_HEADER),
        partition: field(CONTAINER_PARTITION_HEADER),
        device: field(CONTAINER_DEVICE_HEADER),
        headers,
    }
}

/// Single `bytes=<start>-[<end>]` range; anything else is served whole
fn parse_range(value: &str) -> Option<ByteRange> {
    let bounds = value.trim().strip_prefix("bytes=")?;
    if bounds.contains(',') {
        return None;
    }
    let (start, end) = bounds.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => u64::MAX,
        end => end.parse::<u64>().ok()?,
    };
    (start <= end).then(|| ByteRange::new(start, end))
}
