use reqwest::Response;
use serde::{Deserialize, Serialize};

/// Boxed error used for causes coming from pluggable collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, MoondreamError>;

/// Errors returned by the Moondream client
#[derive(Debug, thiserror::Error)]
pub enum MoondreamError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Image encoding failed: {message}")]
	Encoding {
		message: String,
		#[source]
		source: Option<BoxError>,
	},

	#[error("Bad Request: Invalid parameters or image format")]
	BadRequest,

	#[error("Unauthorized: Invalid or missing API key")]
	Unauthorized,

	#[error("Payload Too Large: Image size exceeds limits")]
	PayloadTooLarge,

	#[error("Too Many Requests: Rate limit exceeded")]
	TooManyRequests,

	#[error("Internal Server Error")]
	InternalServerError,

	#[error("Unexpected response ({status}): {body}")]
	Unexpected { status: u16, body: String },

	#[error("HTTP Error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON deserialization failed: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Malformed stream frame `{line}`: {source}")]
	MalformedFrame {
		line: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Coarse classification of a [`MoondreamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Missing or invalid client configuration, raised before any network call.
	Configuration,
	/// The image could not be decoded or re-encoded; nothing was sent.
	Encoding,
	/// Non-success status or network-level failure.
	Transport,
	/// Invalid JSON in a response body or stream frame.
	Parse,
}

impl MoondreamError {
	pub(crate) fn encoding(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
		MoondreamError::Encoding { message: message.into(), source: Some(source.into()) }
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			MoondreamError::Configuration(_) => ErrorKind::Configuration,
			MoondreamError::Encoding { .. } => ErrorKind::Encoding,
			MoondreamError::Json(_) | MoondreamError::MalformedFrame { .. } => ErrorKind::Parse,
			MoondreamError::BadRequest
			| MoondreamError::Unauthorized
			| MoondreamError::PayloadTooLarge
			| MoondreamError::TooManyRequests
			| MoondreamError::InternalServerError
			| MoondreamError::Unexpected { .. }
			| MoondreamError::Http(_) => ErrorKind::Transport,
		}
	}
}

/// Pass successful responses through; turn anything else into the matching error.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
	if response.status().is_success() {
		return Ok(response);
	}

	let status = response.status().as_u16();
	tracing::warn!(status, url = %response.url(), "moondream request failed");
	Err(match status {
		400 => MoondreamError::BadRequest,
		401 => MoondreamError::Unauthorized,
		413 => MoondreamError::PayloadTooLarge,
		429 => MoondreamError::TooManyRequests,
		500 => MoondreamError::InternalServerError,
		_ => MoondreamError::Unexpected { status, body: response.text().await.unwrap_or_default() },
	})
}

/// Buffer a response body and parse it as JSON.
pub(crate) async fn handle_response(response: Response) -> Result<serde_json::Value> {
	let response = check_status(response).await?;
	let bytes = response.bytes().await?;
	Ok(serde_json::from_slice(&bytes)?)
}

/// Describes the level of detail for generated captions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionLength {
	/// A brief 1-2 sentence summary.
	/// Example: "A red car parked on a street."
	Short,

	/// A detailed description covering elements, context,
	/// colors, positioning, and other visual details.
	#[default]
	Normal,

	/// An extended description.
	Long,
}

impl CaptionLength {
	pub fn as_str(&self) -> &'static str {
		match self {
			CaptionLength::Short => "short",
			CaptionLength::Normal => "normal",
			CaptionLength::Long => "long",
		}
	}
}
