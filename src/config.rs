use std::time::Duration;

use crate::common::{MoondreamError, Result};
use crate::transport::auth_header;

/// Public hosted Moondream endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.moondream.ai/v1";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "MOONDREAM_API_KEY";

/// Environment variable overriding the endpoint.
pub const ENDPOINT_ENV: &str = "MOONDREAM_ENDPOINT";

/// Configuration shared by every request made through one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoondreamConfig {
	/// API key sent as `X-Moondream-Auth`. Optional for self-hosted endpoints.
	pub api_key: Option<String>,

	/// Base URL requests are sent to, e.g. `https://api.moondream.ai/v1`.
	pub endpoint: String,

	/// Overall request timeout handed to the HTTP client.
	pub timeout: Option<Duration>,
}

impl Default for MoondreamConfig {
	fn default() -> Self {
		Self { api_key: None, endpoint: DEFAULT_ENDPOINT.to_string(), timeout: None }
	}
}

impl MoondreamConfig {
	/// Config for the hosted service with the given key.
	pub fn new(api_key: impl Into<String>) -> Self {
		Self { api_key: Some(api_key.into()), ..Default::default() }
	}

	/// Read `MOONDREAM_API_KEY` and `MOONDREAM_ENDPOINT`, falling back to defaults.
	pub fn from_env() -> Self {
		let api_key = std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty());
		let endpoint = std::env::var(ENDPOINT_ENV)
			.ok()
			.filter(|endpoint| !endpoint.is_empty())
			.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
		Self { api_key, endpoint, timeout: None }
	}

	/// Set the API key.
	pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
		self.api_key = Some(api_key.into());
		self
	}

	/// Point the client at a different endpoint (local server, proxy).
	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = endpoint.into();
		self
	}

	/// Set the transport timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Whether the endpoint is the public hosted service.
	pub fn uses_default_endpoint(&self) -> bool {
		self.endpoint.trim_end_matches('/') == DEFAULT_ENDPOINT
	}

	/// Reject configurations that could never produce a successful request.
	pub fn validate(&self) -> Result<()> {
		let has_key = self.api_key.as_deref().is_some_and(|key| !key.is_empty());
		if !has_key && self.uses_default_endpoint() {
			return Err(MoondreamError::Configuration(format!(
				"an API key is required for {DEFAULT_ENDPOINT}; pass one or set {API_KEY_ENV}"
			)));
		}

		if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
			auth_header(api_key)?;
		}

		if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
			return Err(MoondreamError::Configuration(format!(
				"endpoint `{}` must use http or https",
				self.endpoint
			)));
		}

		Ok(())
	}
}
