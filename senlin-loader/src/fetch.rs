use crate::{DecodedImage, LoadError};
use bytes::Bytes;
use futures_util::StreamExt;
use rand::Rng;
use senlin_jobs::AsyncReturn;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
}

impl FetchError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Io(_) => true,
            FetchError::Reqwest(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

/// Where bytes come from. The network in production, memory in tests.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> AsyncReturn<Result<Bytes, FetchError>>;
}

/// Streams a resource over HTTP, collecting the body chunk by chunk.
pub struct HttpFetcher;

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> AsyncReturn<Result<Bytes, FetchError>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = reqwest::get(url).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let total_size = response.content_length().unwrap_or(0);
            let mut bytes_stream = response.bytes_stream();
            let mut bytes = Vec::<u8>::with_capacity(total_size as usize);
            while let Some(bytes_chunk) = bytes_stream.next().await {
                let mut bytes_chunk = Vec::from(bytes_chunk?);
                bytes.append(&mut bytes_chunk);
            }
            Ok(Bytes::from(bytes))
        })
    }
}

/// Serves responses straight from memory, for tests and offline demos.
#[derive(Default)]
pub struct MemoryFetcher {
    entries: std::collections::HashMap<String, Bytes>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Bytes) {
        self.entries.insert(url.into(), bytes);
    }

    /// How many fetches were asked of this fetcher.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> AsyncReturn<Result<Bytes, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .entries
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404));
        Box::pin(async move { result })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt number `attempt`, growing
    /// linearly with a ±25% jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.75..1.25);
        self.base_delay.mul_f64(f64::from(attempt) * jitter)
    }
}

/// Fetches and decodes one resource, retrying transient failures under the
/// policy. Decode failures are terminal; bad bytes do not get better.
pub async fn fetch_and_decode(
    fetcher: &dyn AssetFetcher,
    url: &str,
    policy: RetryPolicy,
) -> Result<Arc<DecodedImage>, LoadError> {
    let mut attempt = 0;
    let bytes = loop {
        attempt += 1;
        match fetcher.fetch(url).await {
            Ok(bytes) => break bytes,
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                bevy::log::debug!("retrying {} in {:?} after: {}", url, delay, e);
                sleep(delay).await;
            }
            Err(e) => return Err(LoadError::Fetch(e.to_string())),
        }
    };
    decode_rgba(&bytes).map(Arc::new)
}

pub fn decode_rgba(bytes: &[u8]) -> Result<DecodedImage, LoadError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| LoadError::Decode(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

async fn sleep(duration: Duration) {
    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(duration).await;
    // on wasm retries fire immediately
    #[cfg(target_arch = "wasm32")]
    let _ = duration;
}

/// Entry point for one fetch task. Network futures need a reactor, which
/// bevy's task pool does not provide, so native targets run a small
/// current-thread runtime inside the task.
pub fn run_fetch(
    fetcher: Arc<dyn AssetFetcher>,
    url: String,
    policy: RetryPolicy,
) -> AsyncReturn<Result<Arc<DecodedImage>, LoadError>> {
    Box::pin(async move {
        let fetch = fetch_and_decode(fetcher.as_ref(), &url, policy);
        #[cfg(not(target_arch = "wasm32"))]
        {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| LoadError::Fetch(e.to_string()))?;
            runtime.block_on(fetch)
        }
        #[cfg(target_arch = "wasm32")]
        {
            fetch.await
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<Bytes, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Bytes, FetchError>>) -> Self {
            ScriptedFetcher {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AssetFetcher for ScriptedFetcher {
        fn fetch(&self, _url: &str) -> AsyncReturn<Result<Bytes, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Status(404)));
            Box::pin(async move { next })
        }
    }

    fn tiny_png() -> Bytes {
        let mut out = Vec::new();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut out),
                image::ImageOutputFormat::Png,
            )
            .unwrap();
        Bytes::from(out)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_decode_round_trip() {
        let decoded = decode_rgba(&tiny_png()).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 2));
        assert_eq!(decoded.rgba.len(), 16);
        assert_eq!(&decoded.rgba[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Status(500).is_transient());
        assert!(FetchError::Status(429).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Status(403).is_transient());
        assert!(FetchError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset")).is_transient());
    }

    #[test]
    fn test_retry_recovers_from_transient_failure() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Status(503)), Ok(tiny_png())]);
        let result = block_on(fetch_and_decode(&fetcher, "https://assets.test/t.png", fast_policy()));
        assert!(result.is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_terminal_failure_does_not_retry() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Status(404)), Ok(tiny_png())]);
        let result = block_on(fetch_and_decode(&fetcher, "https://assets.test/t.png", fast_policy()));
        assert!(matches!(result, Err(LoadError::Fetch(_))));
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_retry_budget_exhausts() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Status(500)),
            Err(FetchError::Status(500)),
            Err(FetchError::Status(500)),
            Ok(tiny_png()),
        ]);
        let result = block_on(fetch_and_decode(&fetcher, "https://assets.test/t.png", fast_policy()));
        assert!(matches!(result, Err(LoadError::Fetch(_))));
        assert_eq!(fetcher.calls(), 3);
    }

    #[test]
    fn test_garbage_bytes_fail_without_retry() {
        let fetcher = ScriptedFetcher::new(vec![Ok(Bytes::from_static(b"not an image"))]);
        let result = block_on(fetch_and_decode(&fetcher, "https://assets.test/t.png", fast_policy()));
        assert!(matches!(result, Err(LoadError::Decode(_))));
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_memory_fetcher_serves_and_counts() {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("https://assets.test/t.png", tiny_png());
        let hit = block_on(fetch_and_decode(&fetcher, "https://assets.test/t.png", fast_policy()));
        assert!(hit.is_ok());
        let miss = block_on(fetch_and_decode(&fetcher, "https://assets.test/missing.png", fast_policy()));
        assert!(matches!(miss, Err(LoadError::Fetch(_))));
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_delay_grows_with_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
        };
        for _ in 0..16 {
            let first = policy.delay_after(1);
            assert!(first >= Duration::from_millis(300) && first <= Duration::from_millis(500));
            let second = policy.delay_after(2);
            assert!(second >= Duration::from_millis(600) && second <= Duration::from_millis(1000));
        }
    }
}
