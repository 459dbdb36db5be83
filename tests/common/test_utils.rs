use super::mocks::{Behaviour, FakeCaptioner, FakeChat, FakeGenerator, FakeVision};
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use caption_gateway::{
    config::ImageConfig,
    history::{ConversationAccumulator, ConversationStore},
    media::{self, EncodedImage},
    resolver::BackendResolver,
    server::{self, AppState},
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;

pub const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Encode a solid colour PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A preprocessed image as the backends would receive it
pub fn sample_image() -> EncodedImage {
    media::prepare_image(&png_bytes(32, 24), &ImageConfig::default()).unwrap()
}

/// Backends a test app is wired to, kept so tests can inspect them afterwards
pub struct Backends {
    pub vision: Arc<FakeVision>,
    pub captioner: Arc<FakeCaptioner>,
    pub generator: Arc<FakeGenerator>,
    pub chat: Arc<FakeChat>,
}

impl Backends {
    pub fn new(vision: Behaviour, chat: FakeChat) -> Self {
        Self {
            vision: Arc::new(FakeVision::new(vision)),
            captioner: Arc::new(FakeCaptioner::replying("a pink rectangle")),
            generator: Arc::new(FakeGenerator::new(sample_image())),
            chat: Arc::new(chat),
        }
    }

    pub fn resolver(&self) -> BackendResolver {
        BackendResolver::new(
            self.vision.clone(),
            self.captioner.clone(),
            self.generator.clone(),
            self.chat.clone(),
        )
    }
}

/// Create an app over in-memory history and the given backends
pub fn create_test_app(backends: &Backends) -> Router {
    let state = AppState {
        resolver: Arc::new(backends.resolver()),
        conversations: Arc::new(ConversationAccumulator::new(
            Arc::new(ConversationStore::in_memory()),
            None,
        )),
        image: ImageConfig::default(),
    };
    server::router(state, 20 * 1024 * 1024)
}

/// One part of a hand-built multipart body
pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, Vec<u8>),
}

pub fn multipart_body(parts: Vec<FormPart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: Vec<FormPart<'_>>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
