use futures_util::StreamExt;
use moondream::{CaptionRequest, DetectRequest, Moondream, PointRequest, QueryRequest};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	// reads MOONDREAM_API_KEY (and MOONDREAM_ENDPOINT for a local server)
	let moondream = Moondream::from_env()?;

	// load an image from disk
	let image = image::open("assets/demo.jpg")?;

	// example 1: object detection
	// Detect "person" in the image
	let objects = moondream.detect(DetectRequest::new(&image, "person")).await?;
	println!("Detected objects: {:#?}", objects.bounding_boxes()?);

	// example 2: Object Pointing
	// Get center points for "face" in the image
	let points = moondream.point(PointRequest::new(&image, "face")).await?;
	println!("Detected points: {:#?}", points.coordinates()?);

	// example 3: query (VQA)
	// Ask a question about the image
	let answer = moondream.query(QueryRequest::new("What is the girl doing?").with_image(&image)).await?;
	println!("Answer: {}", answer.answer.into_text().await?);

	// example 4: query stream
	// stream an answer about the image
	println!("Streaming answer:");
	let output = moondream.query(QueryRequest::new("What is this?").with_image(&image).streaming()).await?;
	if let Some(mut stream) = output.answer.into_stream() {
		while let Some(chunk) = stream.next().await {
			print!("{}", chunk?);
		}
	}
	println!();

	// example 5: caption
	// Generate a caption for the image
	let caption = moondream.caption(CaptionRequest::new(&image)).await?;
	println!("Caption: {}", caption.caption.into_text().await?);

	// example 6: caption stream
	// stream a caption for the image
	println!("Streaming caption:");
	let output = moondream.caption(CaptionRequest::new(&image).streaming()).await?;
	if let Some(mut stream) = output.caption.into_stream() {
		while let Some(chunk) = stream.next().await {
			print!("{}", chunk?);
		}
	}
	println!();

	Ok(())
}
