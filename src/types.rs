use serde::{Deserialize, Serialize};

use crate::common::{CaptionLength, Result};
use crate::normalize::ImageInput;
use crate::stream::FragmentStream;

/// Request for `/caption`.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
	pub image: ImageInput,
	pub length: CaptionLength,
	pub stream: bool,
	pub variant: Option<String>,
}

impl CaptionRequest {
	pub fn new(image: impl Into<ImageInput>) -> Self {
		Self { image: image.into(), length: CaptionLength::default(), stream: false, variant: None }
	}

	pub fn with_length(mut self, length: CaptionLength) -> Self {
		self.length = length;
		self
	}

	/// Ask for the caption as a [`FragmentStream`].
	pub fn streaming(mut self) -> Self {
		self.stream = true;
		self
	}

	/// Select a model variant; forwarded verbatim.
	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}
}

/// Request for `/query`. The image is optional for text-only questions.
#[derive(Debug, Clone)]
pub struct QueryRequest {
	pub question: String,
	pub image: Option<ImageInput>,
	pub reasoning: Option<bool>,
	pub stream: bool,
	pub variant: Option<String>,
}

impl QueryRequest {
	pub fn new(question: impl Into<String>) -> Self {
		Self { question: question.into(), image: None, reasoning: None, stream: false, variant: None }
	}

	pub fn with_image(mut self, image: impl Into<ImageInput>) -> Self {
		self.image = Some(image.into());
		self
	}

	/// Toggle extended reasoning before answering.
	pub fn with_reasoning(mut self, reasoning: bool) -> Self {
		self.reasoning = Some(reasoning);
		self
	}

	pub fn streaming(mut self) -> Self {
		self.stream = true;
		self
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}
}

/// Request for `/detect`.
#[derive(Debug, Clone)]
pub struct DetectRequest {
	pub image: ImageInput,
	pub object: String,
	pub variant: Option<String>,
}

impl DetectRequest {
	pub fn new(image: impl Into<ImageInput>, object: impl Into<String>) -> Self {
		Self { image: image.into(), object: object.into(), variant: None }
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}
}

/// Request for `/point`.
#[derive(Debug, Clone)]
pub struct PointRequest {
	pub image: ImageInput,
	pub object: String,
	pub variant: Option<String>,
}

impl PointRequest {
	pub fn new(image: impl Into<ImageInput>, object: impl Into<String>) -> Self {
		Self { image: image.into(), object: object.into(), variant: None }
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}
}

#[derive(Debug, Serialize)]
pub(crate) struct CaptionEnvelope<'a> {
	pub image_url: &'a str,
	pub length: CaptionLength,
	pub stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub variant: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueryEnvelope<'a> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image_url: Option<&'a str>,
	pub question: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning: Option<bool>,
	pub stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub variant: Option<&'a str>,
}

/// Shared by `/detect` and `/point`.
#[derive(Debug, Serialize)]
pub(crate) struct ObjectEnvelope<'a> {
	pub image_url: &'a str,
	pub object: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub variant: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CaptionBody {
	pub caption: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryBody {
	pub answer: String,
	#[serde(default)]
	pub reasoning: Option<serde_json::Value>,
}

/// Generated text, either complete or still arriving.
#[derive(Debug)]
pub enum TextOutput {
	Complete(String),
	Streaming(FragmentStream),
}

impl TextOutput {
	pub fn is_streaming(&self) -> bool {
		matches!(self, TextOutput::Streaming(_))
	}

	/// The complete text, if this is not a stream.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			TextOutput::Complete(text) => Some(text),
			TextOutput::Streaming(_) => None,
		}
	}

	pub fn into_stream(self) -> Option<FragmentStream> {
		match self {
			TextOutput::Complete(_) => None,
			TextOutput::Streaming(stream) => Some(stream),
		}
	}

	/// Resolve to the full text, draining the stream if there is one.
	pub async fn into_text(self) -> Result<String> {
		match self {
			TextOutput::Complete(text) => Ok(text),
			TextOutput::Streaming(stream) => stream.collect_text().await,
		}
	}
}

#[derive(Debug)]
pub struct CaptionOutput {
	pub caption: TextOutput,
}

#[derive(Debug)]
pub struct QueryOutput {
	pub answer: TextOutput,
	/// Reasoning trace, present when reasoning was requested and returned.
	pub reasoning: Option<serde_json::Value>,
}

/// Result of `/detect`: the service's object list, untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectOutput {
	pub objects: Vec<serde_json::Value>,
}

/// Result of `/point`: the service's point list, untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointOutput {
	pub points: Vec<serde_json::Value>,
}

/// Normalized bounding box, coordinates in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

/// Normalized point, coordinates in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

impl DetectOutput {
	/// Read the objects as bounding boxes.
	pub fn bounding_boxes(&self) -> Result<Vec<BoundingBox>> {
		self.objects.iter().map(|object| Ok(BoundingBox::deserialize(object)?)).collect()
	}
}

impl PointOutput {
	/// Read the points as coordinates.
	pub fn coordinates(&self) -> Result<Vec<Point>> {
		self.points.iter().map(|point| Ok(Point::deserialize(point)?)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn query_envelope_skips_unset_fields() {
		let envelope =
			QueryEnvelope { image_url: None, question: "what?", reasoning: None, stream: false, variant: None };
		assert_eq!(serde_json::to_value(&envelope).unwrap(), json!({ "question": "what?", "stream": false }));
	}

	#[test]
	fn caption_envelope_shape() {
		let envelope = CaptionEnvelope {
			image_url: "data:image/jpeg;base64,AA==",
			length: CaptionLength::Short,
			stream: true,
			variant: Some("moondream-3"),
		};
		assert_eq!(
			serde_json::to_value(&envelope).unwrap(),
			json!({
				"image_url": "data:image/jpeg;base64,AA==",
				"length": "short",
				"stream": true,
				"variant": "moondream-3",
			})
		);
	}

	#[test]
	fn request_builders() {
		let request = QueryRequest::new("How many?").with_image(vec![1, 2, 3]).with_reasoning(true).streaming();
		assert!(request.stream);
		assert_eq!(request.reasoning, Some(true));
		assert!(matches!(request.image, Some(ImageInput::Bytes(_))));

		let request = CaptionRequest::new(vec![0]).with_length(CaptionLength::Long).with_variant("v2");
		assert_eq!(request.length, CaptionLength::Long);
		assert_eq!(request.variant.as_deref(), Some("v2"));
		assert!(!request.stream);
	}

	#[test]
	fn typed_geometry_views() {
		let detect: DetectOutput = serde_json::from_value(json!({
			"objects": [{ "x_min": 0.1, "y_min": 0.2, "x_max": 0.5, "y_max": 0.6 }],
			"request_id": "abc",
		}))
		.unwrap();
		assert_eq!(
			detect.bounding_boxes().unwrap(),
			vec![BoundingBox { x_min: 0.1, y_min: 0.2, x_max: 0.5, y_max: 0.6 }]
		);

		let points = PointOutput { points: vec![json!({ "x": 0.25 })] };
		assert!(points.coordinates().is_err());
	}

	#[tokio::test]
	async fn complete_text_resolves_directly() {
		let output = TextOutput::Complete("a cat".to_string());
		assert_eq!(output.as_str(), Some("a cat"));
		assert!(!output.is_streaming());
		assert_eq!(output.into_text().await.unwrap(), "a cat");
	}
}
