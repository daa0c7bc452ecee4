use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};

use crate::common::{check_status, handle_response, MoondreamError, Result};
use crate::config::MoondreamConfig;

/// Header carrying the API key (`X-Moondream-Auth`).
pub const AUTH_HEADER: &str = "x-moondream-auth";

/// Raw response body chunks, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Sends one JSON POST per call.
///
/// `post_json` buffers and parses the whole body; `post_stream` hands back the
/// live body for the stream decoder.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value>;

	async fn post_stream(&self, path: &str, body: &serde_json::Value) -> Result<ByteStream>;
}

/// `reqwest`-backed transport. TLS or plain HTTP follows the endpoint scheme.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
	endpoint: String,
	auth: Option<HeaderValue>,
}

/// The API key as a sensitive header value.
pub(crate) fn auth_header(api_key: &str) -> Result<HeaderValue> {
	let mut value = HeaderValue::from_str(api_key)
		.map_err(|_| MoondreamError::Configuration("API key is not a valid header value".to_string()))?;
	value.set_sensitive(true);
	Ok(value)
}

pub fn user_agent() -> String {
	format!("moondream-rs/{}", env!("CARGO_PKG_VERSION"))
}

impl HttpTransport {
	pub fn new(config: &MoondreamConfig) -> Result<Self> {
		let mut builder = Client::builder().user_agent(user_agent());
		if let Some(timeout) = config.timeout {
			builder = builder.timeout(timeout);
		}

		let auth = match config.api_key.as_deref().filter(|key| !key.is_empty()) {
			Some(api_key) => Some(auth_header(api_key)?),
			None => None,
		};

		Ok(Self { client: builder.build()?, endpoint: config.endpoint.trim_end_matches('/').to_string(), auth })
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	fn url(&self, path: &str) -> String {
		format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
	}

	fn headers(&self, content_length: usize) -> HeaderMap {
		let mut headers = HeaderMap::new();
		if let Some(auth) = &self.auth {
			headers.insert(AUTH_HEADER, auth.clone());
		}
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
		headers
	}

	fn request(&self, path: &str, body: &serde_json::Value, stream: bool) -> Result<RequestBuilder> {
		let payload = serde_json::to_vec(body)?;
		let url = self.url(path);
		tracing::debug!(%url, stream, body_len = payload.len(), "sending moondream request");

		Ok(self.client.post(url).headers(self.headers(payload.len())).body(payload))
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
		let response = self.request(path, body, false)?.send().await?;
		handle_response(response).await
	}

	async fn post_stream(&self, path: &str, body: &serde_json::Value) -> Result<ByteStream> {
		let response = self.request(path, body, true)?.send().await?;
		let response = check_status(response).await?;
		Ok(Box::pin(response.bytes_stream().map_err(MoondreamError::from)))
	}
}
