//! Rust SDK for the [Moondream](https://moondream.ai) vision API.
//!
//! ```no_run
//! use moondream::{DetectRequest, Moondream, QueryRequest};
//!
//! # async fn run() -> moondream::Result<()> {
//! let moondream = Moondream::new("your-api-key")?;
//! let image = std::fs::read("assets/demo.jpg").expect("image");
//!
//! let objects = moondream.detect(DetectRequest::new(image.clone(), "person")).await?;
//! println!("{:?}", objects.objects);
//!
//! let answer = moondream.query(QueryRequest::new("What is this?").with_image(image)).await?;
//! println!("{}", answer.answer.into_text().await?);
//! # Ok(())
//! # }
//! ```

mod common;
mod config;
mod moondream;
mod normalize;
mod stream;
mod transport;
mod types;

pub use common::{BoxError, CaptionLength, ErrorKind, MoondreamError, Result};
pub use config::{MoondreamConfig, API_KEY_ENV, DEFAULT_ENDPOINT, ENDPOINT_ENV};
pub use moondream::Moondream;
pub use normalize::{normalize, EncodedImage, ImageCodec, ImageInput, JpegCodec, RasterImage, JPEG_QUALITY};
pub use stream::{decode, FragmentStream, Frame, DATA_PREFIX};
pub use transport::{user_agent, ByteStream, HttpTransport, Transport, AUTH_HEADER};
pub use types::{
	BoundingBox, CaptionOutput, CaptionRequest, DetectOutput, DetectRequest, Point, PointOutput, PointRequest,
	QueryOutput, QueryRequest, TextOutput,
};
