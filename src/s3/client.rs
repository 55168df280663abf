//! S3 client implementation
//!
//! - HTTP/1.1 over hyper with a pooled native-tls connector
//! - Path-style addressing: `{endpoint}/{bucket}/{key}`
//! - UNSIGNED-PAYLOAD for uploads so file bodies stream without hashing
//! - Automatic retry with jitter for 429/503 responses and connection errors

use crate::s3::signer::S3SignerV4;
use crate::s3::store::ObjectStore;
use crate::s3::types::{ListObjectsResponse, ObjectBody, ObjectStream, S3Object};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::CONTENT_LENGTH;
use hyper::{Method, Request, Response, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

const MAX_RETRIES: u32 = 3;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Connection error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("S3 error: {status} {code} - {message}")]
    S3Response {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse(err.to_string())
    }
}

impl S3Error {
    /// Connection-level failures worth another attempt
    fn is_transient(&self) -> bool {
        matches!(
            self,
            S3Error::Client(_) | S3Error::Hyper(_) | S3Error::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

type HttpBody = UnsyncBoxBody<Bytes, io::Error>;

/// Pseudo-random jitter in [0.0, 1.0) from the clock's nanoseconds.
fn rand_jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

fn backoff(attempt: u32) -> Duration {
    let base_ms = 100u64 * (1 << attempt);
    let jitter = (base_ms as f64 * 0.2 * rand_jitter()) as u64;
    Duration::from_millis(base_ms + jitter)
}

/// Connection settings for [`S3Client`]
#[derive(Clone)]
pub struct ClientOptions {
    /// Service URL, e.g. `https://s3.cloud.ru`
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Access key id as presented to the service
    pub access_key: String,
    pub secret_key: String,
    /// Per-attempt limit on waiting for response headers
    pub timeout: Duration,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Request payload, re-materialized for every attempt.
enum Payload {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl Payload {
    fn empty() -> Self {
        Payload::Bytes(Bytes::new())
    }

    fn len(&self) -> u64 {
        match self {
            Payload::Bytes(data) => data.len() as u64,
            Payload::File { len, .. } => *len,
        }
    }

    async fn body(&self) -> Result<HttpBody> {
        match self {
            Payload::Bytes(data) => Ok(Full::new(data.clone())
                .map_err(|never| match never {})
                .boxed_unsync()),
            Payload::File { path, .. } => {
                let file = tokio::fs::File::open(path).await?;
                let frames = ReaderStream::new(file).map_ok(Frame::data);
                Ok(StreamBody::new(frames).boxed_unsync())
            }
        }
    }
}

/// S3-compatible HTTP client
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct S3Client {
    client: HyperClient<HttpsConnector<HttpConnector>, HttpBody>,
    signer: S3SignerV4,
    endpoint: String,
    timeout: Duration,
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint)
            .field("signer", &self.signer)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Create a client. No connection is opened until the first request.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = TlsConnector::new()?;
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        let signer = S3SignerV4::new(options.access_key, &options.secret_key, options.region);

        Ok(Self {
            client,
            signer,
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            timeout: options.timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        self.signer.region()
    }

    pub fn access_key(&self) -> &str {
        self.signer.access_key()
    }

    /// Per-attempt request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_bucket_url(&self, bucket: &str) -> String {
        let mut url = String::with_capacity(self.endpoint.len() + 1 + bucket.len());
        url.push_str(&self.endpoint);
        url.push('/');
        url.push_str(bucket);
        url
    }

    fn build_url(&self, bucket: &str, key: &str) -> String {
        let mut url = self.build_bucket_url(bucket);
        url.push('/');
        percent_encode_into(&mut url, key, true);
        url
    }

    /// URL for one ListObjectsV2 page; parameters in canonical order.
    pub fn build_list_url(&self, bucket: &str, prefix: Option<&str>, delimiter: Option<&str>) -> String {
        let mut url = self.build_bucket_url(bucket);
        url.push_str("/?");
        if let Some(d) = delimiter {
            url.push_str("delimiter=");
            percent_encode_into(&mut url, d, false);
            url.push('&');
        }
        url.push_str("list-type=2");
        if let Some(p) = prefix {
            url.push_str("&prefix=");
            percent_encode_into(&mut url, p, false);
        }
        url
    }

    /// Value of `x-amz-copy-source` for an object in `bucket`
    fn copy_source(bucket: &str, key: &str) -> String {
        let mut source = String::with_capacity(bucket.len() + key.len() + 2);
        source.push('/');
        source.push_str(bucket);
        source.push('/');
        percent_encode_into(&mut source, key, true);
        source
    }

    /// Send with retry on 429/503 and on transient connection errors.
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: BTreeMap<String, String>,
        payload: &Payload,
    ) -> Result<Response<Incoming>> {
        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), url, headers.clone(), payload).await {
                Ok(response) => {
                    let status = response.status();
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE;
                    if !retryable || attempt >= MAX_RETRIES {
                        return Ok(response);
                    }
                    debug!(%method, url, %status, attempt, "retrying throttled request");
                    // Drain body to return connection to pool
                    let _ = response.collect().await;
                }
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    debug!(%method, url, error = %err, attempt, "retrying failed request");
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(backoff(attempt)).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        mut headers: BTreeMap<String, String>,
        payload: &Payload,
    ) -> Result<Response<Incoming>> {
        let signed_headers = if payload.len() == 0 {
            self.signer.sign(method.as_str(), url, headers, b"")
        } else {
            headers.insert("content-length".to_string(), payload.len().to_string());
            self.signer.sign_unsigned_payload(method.as_str(), url, headers)
        };

        let mut req = Request::builder().method(method).uri(url);
        for (key, value) in signed_headers.iter() {
            req = req.header(key, value);
        }
        let request = req.body(payload.body().await?)?;

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(S3Error::Timeout(self.timeout)),
        }
    }

    async fn read_body(response: Response<Incoming>) -> Result<Bytes> {
        Ok(response.into_body().collect().await?.to_bytes())
    }

    /// Pass a 2xx response through; turn anything else into an error.
    async fn expect_success(
        response: Response<Incoming>,
        key: Option<&str>,
    ) -> Result<Response<Incoming>> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = Self::read_body(response).await?;
        Err(Self::error_from_response(status, &body, key))
    }

    fn error_from_response(status: StatusCode, body: &[u8], key: Option<&str>) -> S3Error {
        let (code, message) = parse_error_document(body)
            .unwrap_or_else(|| (String::new(), String::from_utf8_lossy(body).into_owned()));

        if let Some(key) = key {
            if code == "NoSuchKey" || (status == StatusCode::NOT_FOUND && code.is_empty()) {
                return S3Error::NotFound {
                    key: key.to_string(),
                };
            }
        }

        S3Error::S3Response {
            status,
            code,
            message,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_object(&self, bucket: &str, key: &str, body: ObjectBody) -> Result<()> {
        let payload = match body {
            ObjectBody::Bytes(data) => Payload::Bytes(data),
            ObjectBody::File(path) => {
                let len = tokio::fs::metadata(&path).await?.len();
                Payload::File { path, len }
            }
        };

        let url = self.build_url(bucket, key);
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );
        if payload.len() == 0 {
            headers.insert("content-length".to_string(), "0".to_string());
        }

        let response = self.send(Method::PUT, &url, headers, &payload).await?;
        let response = Self::expect_success(response, None).await?;
        Self::read_body(response).await?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream> {
        let url = self.build_url(bucket, key);
        let response = self
            .send(Method::GET, &url, BTreeMap::new(), &Payload::empty())
            .await?;
        let response = Self::expect_success(response, Some(key)).await?;

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        let chunks = BodyStream::new(response.into_body())
            .try_filter_map(|frame| future::ready(Ok(frame.into_data().ok())))
            .map_err(io::Error::other);

        Ok(ObjectStream::new(StreamReader::new(chunks), content_length))
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsResponse> {
        let url = self.build_list_url(bucket, prefix, delimiter);
        let response = self
            .send(Method::GET, &url, BTreeMap::new(), &Payload::empty())
            .await?;
        let response = Self::expect_success(response, None).await?;
        let body = Self::read_body(response).await?;
        parse_list_response(&body)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> Result<()> {
        let url = self.build_url(bucket, destination_key);
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-amz-copy-source".to_string(),
            Self::copy_source(bucket, source_key),
        );
        headers.insert("content-length".to_string(), "0".to_string());

        let response = self.send(Method::PUT, &url, headers, &Payload::empty()).await?;
        let response = Self::expect_success(response, Some(source_key)).await?;
        let status = response.status();
        let body = Self::read_body(response).await?;

        // CopyObject can fail after the 200 status line has been sent
        if parse_error_document(&body).is_some() {
            return Err(Self::error_from_response(status, &body, Some(source_key)));
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.build_url(bucket, key);
        let response = self
            .send(Method::DELETE, &url, BTreeMap::new(), &Payload::empty())
            .await?;
        let response = Self::expect_success(response, None).await?;
        Self::read_body(response).await?;
        Ok(())
    }
}

/// RFC 3986 percent-encoding, optionally leaving `/` intact (object keys).
fn percent_encode_into(buf: &mut String, s: &str, keep_slash: bool) {
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                buf.push(byte as char);
            }
            b'/' if keep_slash => buf.push('/'),
            _ => {
                buf.push('%');
                buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
}

/// Parse a ListObjectsV2 XML document
fn parse_list_response(xml_data: &[u8]) -> Result<ListObjectsResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text(true);

    let mut response = ListObjectsResponse::new();
    let mut current_object: Option<S3Object> = None;
    let mut current_text = String::with_capacity(256);
    let mut in_common_prefixes = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Contents" => current_object = Some(S3Object::new(String::new(), 0)),
                b"CommonPrefixes" => in_common_prefixes = true,
                _ => {}
            },
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.key = std::mem::take(&mut current_text);
                        }
                    }
                    b"Size" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.size = current_text.parse().unwrap_or(0);
                        }
                    }
                    b"LastModified" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.last_modified = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"ETag" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.etag = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"Contents" => {
                        if let Some(obj) = current_object.take() {
                            response.contents.push(obj);
                        }
                    }
                    b"CommonPrefixes" => in_common_prefixes = false,
                    b"Prefix" if in_common_prefixes => {
                        response
                            .common_prefixes
                            .push(std::mem::take(&mut current_text));
                    }
                    b"IsTruncated" => response.is_truncated = current_text == "true",
                    b"NextContinuationToken" => {
                        response.next_continuation_token = Some(std::mem::take(&mut current_text));
                    }
                    b"KeyCount" => response.key_count = current_text.parse().ok(),
                    _ => {}
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(response)
}

/// Extract (Code, Message) from an S3 `<Error>` document.
fn parse_error_document(xml_data: &[u8]) -> Option<(String, String)> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text(true);

    let mut is_error = false;
    let mut code = String::new();
    let mut message = String::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) if e.local_name().as_ref() == b"Error" => is_error = true,
            Event::Text(e) => current_text = e.unescape().ok()?.into_owned(),
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"Code" => code = std::mem::take(&mut current_text),
                    b"Message" => message = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    is_error.then_some((code, message))
}
