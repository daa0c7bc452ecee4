use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};

use crate::common::{BoxError, MoondreamError, Result};

/// JPEG quality used for every transcoded image.
pub const JPEG_QUALITY: u8 = 95;

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// An image reference ready to be placed in a request body.
///
/// Either a self-contained `data:` URI or a URL the service fetches itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
	url: String,
}

impl EncodedImage {
	/// Wrap an existing URL or data URI. No validation or re-encoding happens.
	pub fn from_url(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}

	fn from_jpeg(bytes: &[u8]) -> Self {
		let encoded = general_purpose::STANDARD.encode(bytes);
		Self { url: format!("{JPEG_DATA_URI_PREFIX}{encoded}") }
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn is_data_uri(&self) -> bool {
		self.url.starts_with("data:")
	}

	pub fn into_url(self) -> String {
		self.url
	}
}

/// Anything a task accepts as its image.
#[derive(Debug, Clone)]
pub enum ImageInput {
	/// Raw bytes in any format the codec can decode.
	Bytes(Bytes),
	/// An image already decoded in memory.
	Image(DynamicImage),
	/// Passed through untouched.
	Encoded(EncodedImage),
}

impl From<Bytes> for ImageInput {
	fn from(bytes: Bytes) -> Self {
		ImageInput::Bytes(bytes)
	}
}

impl From<Vec<u8>> for ImageInput {
	fn from(bytes: Vec<u8>) -> Self {
		ImageInput::Bytes(Bytes::from(bytes))
	}
}

impl From<&[u8]> for ImageInput {
	fn from(bytes: &[u8]) -> Self {
		ImageInput::Bytes(Bytes::copy_from_slice(bytes))
	}
}

impl From<DynamicImage> for ImageInput {
	fn from(image: DynamicImage) -> Self {
		ImageInput::Image(image)
	}
}

impl From<&DynamicImage> for ImageInput {
	fn from(image: &DynamicImage) -> Self {
		ImageInput::Image(image.clone())
	}
}

impl From<EncodedImage> for ImageInput {
	fn from(image: EncodedImage) -> Self {
		ImageInput::Encoded(image)
	}
}

/// A decoded raster image, as seen by the normalizer.
pub trait RasterImage {
	/// Pixel width and height, or `None` when they cannot be determined.
	fn dimensions(&self) -> Option<(u32, u32)>;

	/// Re-encode as JPEG at the given quality (1-100).
	fn encode_jpeg(&self, quality: u8) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Decoder for raw image bytes.
pub trait ImageCodec: Send + Sync {
	fn decode(&self, bytes: &[u8]) -> std::result::Result<Box<dyn RasterImage>, BoxError>;
}

/// Default codec backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl ImageCodec for JpegCodec {
	fn decode(&self, bytes: &[u8]) -> std::result::Result<Box<dyn RasterImage>, BoxError> {
		let image = image::load_from_memory(bytes)?;
		Ok(Box::new(image))
	}
}

impl RasterImage for DynamicImage {
	fn dimensions(&self) -> Option<(u32, u32)> {
		let (width, height) = GenericImageView::dimensions(self);
		(width > 0 && height > 0).then_some((width, height))
	}

	fn encode_jpeg(&self, quality: u8) -> std::result::Result<Vec<u8>, BoxError> {
		// JPEG has no alpha channel
		let rgb = self.to_rgb8();
		let mut buffer = Cursor::new(Vec::new());
		JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
		Ok(buffer.into_inner())
	}
}

/// Turn any [`ImageInput`] into an [`EncodedImage`].
///
/// Already-encoded inputs are returned as is. Everything else is decoded,
/// checked for usable dimensions, and re-encoded as a JPEG data URI at
/// [`JPEG_QUALITY`].
pub fn normalize(input: ImageInput, codec: &dyn ImageCodec) -> Result<EncodedImage> {
	match input {
		ImageInput::Encoded(encoded) => Ok(encoded),
		ImageInput::Image(image) => transcode(&image),
		ImageInput::Bytes(bytes) => {
			let image = codec
				.decode(&bytes)
				.map_err(|err| MoondreamError::encoding("failed to decode image bytes", err))?;
			transcode(image.as_ref())
		}
	}
}

fn transcode(image: &dyn RasterImage) -> Result<EncodedImage> {
	let (width, height) = image.dimensions().ok_or_else(|| MoondreamError::Encoding {
		message: "unable to determine image dimensions".to_string(),
		source: None,
	})?;

	let jpeg = image
		.encode_jpeg(JPEG_QUALITY)
		.map_err(|err| MoondreamError::encoding(format!("failed to encode {width}x{height} image as JPEG"), err))?;

	tracing::trace!(width, height, encoded_len = jpeg.len(), "transcoded image");
	Ok(EncodedImage::from_jpeg(&jpeg))
}
