//! Shared test doubles

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::generation::{GenerationError, GenerationResult, GeneratorInfo, ImageGenerator};
use crate::persistence::{FetchedImage, ImageFetcher, ObjectStore, ObjectWrite, PersistError};
use crate::progress::ProgressObserver;

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 80, 40])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn sample_png() -> Vec<u8> {
    encode(ImageFormat::Png)
}

pub fn sample_jpeg() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

/// Collects progress reports
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<(u8, String)>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<(u8, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.events().into_iter().map(|(p, _)| p).collect()
    }

    pub fn is_non_decreasing(&self) -> bool {
        self.percentages().windows(2).all(|w| w[0] <= w[1])
    }
}

impl ProgressObserver for Recorder {
    fn on_progress(&self, percentage: u8, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((percentage, message.to_string()));
    }
}

/// Fetcher returning a fixed result
pub struct ScriptedFetcher {
    result: Result<Vec<u8>, PersistError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn ok(bytes: Vec<u8>) -> Self {
        Self {
            result: Ok(bytes),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn err(error: PersistError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedImage, PersistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone().map(|bytes| FetchedImage {
            bytes,
            content_type: None,
        })
    }
}

/// Object store that always fails
pub struct RejectingStore(pub PersistError);

#[async_trait]
impl ObjectStore for RejectingStore {
    async fn write(&self, _object: ObjectWrite) -> Result<String, PersistError> {
        Err(self.0.clone())
    }
}

/// Generator returning a fixed result and recording prompts
pub struct StaticGenerator {
    result: GenerationResult<String>,
    prompts: Mutex<Vec<String>>,
}

impl StaticGenerator {
    pub fn ok(url: &str) -> Self {
        Self {
            result: Ok(url.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn err(error: GenerationError) -> Self {
        Self {
            result: Err(error),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for StaticGenerator {
    fn info(&self) -> GeneratorInfo {
        GeneratorInfo {
            provider: "Static".into(),
            model: "test".into(),
            urls_expire: true,
        }
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.result.clone()
    }
}
