use std::sync::Arc;

use serde::Serialize;

use crate::common::Result;
use crate::config::MoondreamConfig;
use crate::normalize::{normalize, EncodedImage, ImageCodec, ImageInput, JpegCodec};
use crate::stream::decode;
use crate::transport::{HttpTransport, Transport};
use crate::types::{
	CaptionBody, CaptionEnvelope, CaptionOutput, CaptionRequest, DetectOutput, DetectRequest, ObjectEnvelope,
	PointOutput, PointRequest, QueryBody, QueryEnvelope, QueryOutput, QueryRequest, TextOutput,
};

const CAPTION_PATH: &str = "caption";
const QUERY_PATH: &str = "query";
const DETECT_PATH: &str = "detect";
const POINT_PATH: &str = "point";

/// Client for the Moondream vision API.
///
/// Holds only immutable configuration, so one client can serve any number of
/// concurrent requests.
#[derive(Clone)]
pub struct Moondream {
	config: MoondreamConfig,
	transport: Arc<dyn Transport>,
	codec: Arc<dyn ImageCodec>,
}

impl std::fmt::Debug for Moondream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Moondream").field("endpoint", &self.config.endpoint).finish_non_exhaustive()
	}
}

impl Moondream {
	/// Client for the hosted service.
	pub fn new(api_key: impl Into<String>) -> Result<Self> {
		Self::with_config(MoondreamConfig::new(api_key))
	}

	/// Client configured from `MOONDREAM_API_KEY` / `MOONDREAM_ENDPOINT`.
	pub fn from_env() -> Result<Self> {
		Self::with_config(MoondreamConfig::from_env())
	}

	pub fn with_config(config: MoondreamConfig) -> Result<Self> {
		config.validate()?;
		let transport = HttpTransport::new(&config)?;
		Ok(Self { config, transport: Arc::new(transport), codec: Arc::new(JpegCodec) })
	}

	/// Build a client around custom collaborators.
	pub fn from_parts(
		config: MoondreamConfig,
		transport: Arc<dyn Transport>,
		codec: Arc<dyn ImageCodec>,
	) -> Result<Self> {
		config.validate()?;
		Ok(Self { config, transport, codec })
	}

	pub fn config(&self) -> &MoondreamConfig {
		&self.config
	}

	fn encode_image(&self, image: ImageInput) -> Result<EncodedImage> {
		normalize(image, self.codec.as_ref())
	}

	async fn post<E: Serialize>(&self, path: &str, envelope: &E) -> Result<serde_json::Value> {
		let body = serde_json::to_value(envelope)?;
		self.transport.post_json(path, &body).await
	}

	async fn post_text<E: Serialize>(&self, path: &str, envelope: &E) -> Result<TextOutput> {
		let body = serde_json::to_value(envelope)?;
		let source = self.transport.post_stream(path, &body).await?;
		Ok(TextOutput::Streaming(decode(source)))
	}

	/// Describe an image.
	#[tracing::instrument(level = "debug", skip_all, fields(stream = request.stream))]
	pub async fn caption(&self, request: CaptionRequest) -> Result<CaptionOutput> {
		let image = self.encode_image(request.image)?;
		let envelope = CaptionEnvelope {
			image_url: image.url(),
			length: request.length,
			stream: request.stream,
			variant: request.variant.as_deref(),
		};

		let caption = if request.stream {
			self.post_text(CAPTION_PATH, &envelope).await?
		} else {
			let body: CaptionBody = serde_json::from_value(self.post(CAPTION_PATH, &envelope).await?)?;
			TextOutput::Complete(body.caption)
		};
		Ok(CaptionOutput { caption })
	}

	/// Ask a free-form question, optionally about an image.
	#[tracing::instrument(level = "debug", skip_all, fields(stream = request.stream))]
	pub async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
		let image = request.image.map(|image| self.encode_image(image)).transpose()?;
		let envelope = QueryEnvelope {
			image_url: image.as_ref().map(EncodedImage::url),
			question: &request.question,
			reasoning: request.reasoning,
			stream: request.stream,
			variant: request.variant.as_deref(),
		};

		if request.stream {
			let answer = self.post_text(QUERY_PATH, &envelope).await?;
			return Ok(QueryOutput { answer, reasoning: None });
		}

		let body: QueryBody = serde_json::from_value(self.post(QUERY_PATH, &envelope).await?)?;
		Ok(QueryOutput { answer: TextOutput::Complete(body.answer), reasoning: body.reasoning })
	}

	/// Find bounding boxes for `object`.
	#[tracing::instrument(level = "debug", skip_all, fields(object = %request.object))]
	pub async fn detect(&self, request: DetectRequest) -> Result<DetectOutput> {
		let image = self.encode_image(request.image)?;
		let envelope =
			ObjectEnvelope { image_url: image.url(), object: &request.object, variant: request.variant.as_deref() };
		Ok(serde_json::from_value(self.post(DETECT_PATH, &envelope).await?)?)
	}

	/// Find center points for `object`.
	#[tracing::instrument(level = "debug", skip_all, fields(object = %request.object))]
	pub async fn point(&self, request: PointRequest) -> Result<PointOutput> {
		let image = self.encode_image(request.image)?;
		let envelope =
			ObjectEnvelope { image_url: image.url(), object: &request.object, variant: request.variant.as_deref() };
		Ok(serde_json::from_value(self.post(POINT_PATH, &envelope).await?)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::common::{BoxError, CaptionLength, ErrorKind, MoondreamError};
	use crate::normalize::RasterImage;
	use crate::transport::ByteStream;
	use async_trait::async_trait;
	use bytes::Bytes;
	use futures_util::{stream, StreamExt};
	use image::{DynamicImage, ImageFormat, RgbImage};
	use serde_json::{json, Value};
	use std::io::Cursor;
	use std::sync::Mutex;

	#[derive(Debug, Clone, PartialEq)]
	struct Call {
		path: String,
		body: Value,
		stream: bool,
	}

	#[derive(Default)]
	struct FakeTransport {
		calls: Mutex<Vec<Call>>,
		response: Value,
		frames: Vec<&'static str>,
	}

	impl FakeTransport {
		fn json(response: Value) -> Arc<Self> {
			Arc::new(Self { response, ..Default::default() })
		}

		fn frames(frames: Vec<&'static str>) -> Arc<Self> {
			Arc::new(Self { frames, ..Default::default() })
		}

		fn calls(&self) -> Vec<Call> {
			self.calls.lock().unwrap().clone()
		}

		fn record(&self, path: &str, body: &Value, stream: bool) {
			self.calls.lock().unwrap().push(Call { path: path.to_string(), body: body.clone(), stream });
		}
	}

	#[async_trait]
	impl Transport for FakeTransport {
		async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
			self.record(path, body, false);
			Ok(self.response.clone())
		}

		async fn post_stream(&self, path: &str, body: &Value) -> Result<ByteStream> {
			self.record(path, body, true);
			let chunks: Vec<Result<Bytes>> = self.frames.iter().map(|frame| Ok(Bytes::from_static(frame.as_bytes()))).collect();
			Ok(Box::pin(stream::iter(chunks)))
		}
	}

	struct BrokenCodec;

	impl ImageCodec for BrokenCodec {
		fn decode(&self, _bytes: &[u8]) -> std::result::Result<Box<dyn RasterImage>, BoxError> {
			Err("unsupported format".into())
		}
	}

	fn png(width: u32, height: u32) -> Vec<u8> {
		let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
		let mut buffer = Cursor::new(Vec::new());
		image.write_to(&mut buffer, ImageFormat::Png).unwrap();
		buffer.into_inner()
	}

	fn client(transport: Arc<FakeTransport>) -> Moondream {
		Moondream::from_parts(MoondreamConfig::new("test-key"), transport, Arc::new(JpegCodec)).unwrap()
	}

	#[test]
	fn rejects_missing_key_for_hosted_endpoint() {
		let err = Moondream::with_config(MoondreamConfig::default().with_endpoint("https://api.moondream.ai/v1"))
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Configuration);

		let err = Moondream::new("").unwrap_err();
		assert!(matches!(err, MoondreamError::Configuration(_)));
	}

	#[test]
	fn invalid_key_fails_at_construction() {
		let err = Moondream::new("line\nbreak").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Configuration);
	}

	#[test]
	fn custom_endpoint_needs_no_key() {
		let client = Moondream::with_config(MoondreamConfig::default().with_endpoint("http://localhost:2020/v1"));
		assert!(client.is_ok());
	}

	#[tokio::test]
	async fn detect_passes_objects_through() {
		let objects = json!([{ "x_min": 0.1, "y_min": 0.2, "x_max": 0.3, "y_max": 0.4, "label": "cat" }]);
		let transport = FakeTransport::json(json!({ "objects": objects.clone(), "request_id": "r1" }));
		let moondream = client(transport.clone());

		let output = moondream.detect(DetectRequest::new(png(100, 100), "cat")).await.unwrap();
		assert_eq!(Value::Array(output.objects), objects);

		let calls = transport.calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].path, "detect");
		assert!(!calls[0].stream);
		assert_eq!(calls[0].body["object"], "cat");
		assert!(calls[0].body["image_url"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));
		assert!(calls[0].body.get("variant").is_none());
		assert!(calls[0].body.get("stream").is_none());
	}

	#[tokio::test]
	async fn point_forwards_variant_and_encoded_image() {
		let transport = FakeTransport::json(json!({ "points": [{ "x": 0.5, "y": 0.5 }] }));
		let moondream = client(transport.clone());
		let sentinel = EncodedImage::from_url("https://example.com/sentinel.jpg");

		let output = moondream.point(PointRequest::new(sentinel, "face").with_variant("moondream-3")).await.unwrap();
		assert_eq!(output.points, vec![json!({ "x": 0.5, "y": 0.5 })]);

		let body = &transport.calls()[0].body;
		assert_eq!(
			body,
			&json!({
				"image_url": "https://example.com/sentinel.jpg",
				"object": "face",
				"variant": "moondream-3",
			})
		);
	}

	#[tokio::test]
	async fn caption_returns_complete_text() {
		let transport = FakeTransport::json(json!({ "caption": "A red car." }));
		let moondream = client(transport.clone());

		let request = CaptionRequest::new(png(4, 4)).with_length(CaptionLength::Short);
		let output = moondream.caption(request).await.unwrap();
		assert_eq!(output.caption.as_str(), Some("A red car."));

		let call = &transport.calls()[0];
		assert_eq!(call.path, "caption");
		assert_eq!(call.body["length"], "short");
		assert_eq!(call.body["stream"], false);
	}

	#[tokio::test]
	async fn caption_streams_fragments() {
		let transport = FakeTransport::frames(vec![
			"data: {\"chunk\":\"A red\"}\ndata: {\"chu",
			"nk\":\" car.\"}\ndata: {\"completed\":true}\n",
		]);
		let moondream = client(transport.clone());

		let output = moondream.caption(CaptionRequest::new(png(4, 4)).streaming()).await.unwrap();
		let stream = output.caption.into_stream().unwrap();
		let fragments: Vec<String> = stream.map(|fragment| fragment.unwrap()).collect().await;
		assert_eq!(fragments, vec!["A red", " car."]);

		let call = &transport.calls()[0];
		assert!(call.stream);
		assert_eq!(call.body["stream"], true);
	}

	#[tokio::test]
	async fn query_without_image_keeps_reasoning() {
		let transport = FakeTransport::json(json!({
			"answer": "Four.",
			"reasoning": { "text": "I counted the legs.", "grounding": [] },
		}));
		let moondream = client(transport.clone());

		let output = moondream.query(QueryRequest::new("How many legs?").with_reasoning(true)).await.unwrap();
		assert_eq!(output.answer.into_text().await.unwrap(), "Four.");
		assert_eq!(output.reasoning.unwrap()["text"], "I counted the legs.");

		let body = &transport.calls()[0].body;
		assert_eq!(body, &json!({ "question": "How many legs?", "reasoning": true, "stream": false }));
	}

	#[tokio::test]
	async fn query_streams_answer() {
		let transport = FakeTransport::frames(vec!["data: {\"chunk\":\"Yes\"}\n", "data: {\"chunk\":\".\"}"]);
		let moondream = client(transport.clone());

		let request = QueryRequest::new("Is it red?").with_image(png(2, 2)).streaming();
		let output = moondream.query(request).await.unwrap();
		assert!(output.answer.is_streaming());
		assert!(output.reasoning.is_none());
		assert_eq!(output.answer.into_text().await.unwrap(), "Yes.");
		assert_eq!(transport.calls()[0].path, "query");
	}

	#[tokio::test]
	async fn encoding_failure_sends_nothing() {
		let transport = FakeTransport::json(json!({ "objects": [] }));
		let moondream =
			Moondream::from_parts(MoondreamConfig::new("key"), transport.clone(), Arc::new(BrokenCodec)).unwrap();

		let err = moondream.detect(DetectRequest::new(vec![0, 1, 2], "cat")).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Encoding);
		assert!(transport.calls().is_empty());
	}

	#[tokio::test]
	async fn unexpected_response_shape_is_parse_error() {
		let transport = FakeTransport::json(json!({ "answer": 42 }));
		let moondream = client(transport);

		let err = moondream.query(QueryRequest::new("?")).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Parse);
	}
}
