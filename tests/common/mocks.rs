use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use mockall::mock;
use ollama_gateway::{
    Error, Result,
    upstream::{ChatParams, ChunkStream, GenerateParams, InferenceBackend},
};
use serde_json::Value;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::Notify;

mock! {
    pub Backend {}

    #[async_trait]
    impl InferenceBackend for Backend {
        async fn list_models(&self) -> Result<Value>;
        async fn show_model(&self, name: &str) -> Result<Value>;
        async fn generate(&self, request: &GenerateParams) -> Result<Value>;
        async fn chat(&self, request: &ChatParams) -> Result<Value>;
        async fn pull_model(&self, name: &str) -> Result<Value>;
        async fn generate_stream(&self, request: &GenerateParams) -> Result<ChunkStream>;
    }
}

/// A backend that must never be reached
pub fn untouchable_backend() -> MockBackend {
    let mut backend = MockBackend::new();
    backend.expect_list_models().never();
    backend.expect_show_model().never();
    backend.expect_generate().never();
    backend.expect_chat().never();
    backend.expect_pull_model().never();
    backend.expect_generate_stream().never();
    backend
}

/// One step of a scripted upstream stream
#[derive(Debug, Clone)]
pub enum StreamStep {
    Chunk(Bytes),
    Fail(String),
    /// Never yields again; only cancellation ends the stream
    Hang,
}

pub fn chunk(data: &'static str) -> StreamStep {
    StreamStep::Chunk(Bytes::from_static(data.as_bytes()))
}

/// Flags when the upstream stream object is dropped
#[derive(Debug, Default, Clone)]
pub struct ReleaseProbe {
    released: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ReleaseProbe {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Waits until the stream is dropped; false if `limit` passes first
    pub async fn wait_released(&self, limit: Duration) -> bool {
        if self.is_released() {
            return true;
        }
        tokio::time::timeout(limit, self.notify.notified()).await.is_ok() || self.is_released()
    }
}

struct ReleaseGuard(ReleaseProbe);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.released.store(true, Ordering::SeqCst);
        self.0.notify.notify_one();
    }
}

/// Streaming backend that plays back a script and records what it was sent
pub struct ScriptedBackend {
    steps: Vec<StreamStep>,
    open_error: Option<String>,
    pub probe: ReleaseProbe,
    pub requests: Arc<Mutex<Vec<GenerateParams>>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<StreamStep>) -> Self {
        Self {
            steps,
            open_error: None,
            probe: ReleaseProbe::default(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_to_open(message: &str) -> Self {
        let mut backend = Self::new(Vec::new());
        backend.open_error = Some(message.to_string());
        backend
    }

    pub fn get_requests(&self) -> Vec<GenerateParams> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn list_models(&self) -> Result<Value> {
        Err(Error::upstream("not scripted"))
    }

    async fn show_model(&self, _name: &str) -> Result<Value> {
        Err(Error::upstream("not scripted"))
    }

    async fn generate(&self, _request: &GenerateParams) -> Result<Value> {
        Err(Error::upstream("not scripted"))
    }

    async fn chat(&self, _request: &ChatParams) -> Result<Value> {
        Err(Error::upstream("not scripted"))
    }

    async fn pull_model(&self, _name: &str) -> Result<Value> {
        Err(Error::upstream("not scripted"))
    }

    async fn generate_stream(&self, request: &GenerateParams) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(ref message) = self.open_error {
            return Err(Error::upstream(message.clone()));
        }

        let guard = ReleaseGuard(self.probe.clone());
        let steps = self.steps.clone().into_iter();

        let stream = stream::unfold((steps, guard), |(mut steps, guard)| async move {
            match steps.next()? {
                StreamStep::Chunk(data) => Some((Ok(data), (steps, guard))),
                StreamStep::Fail(message) => Some((Err(Error::upstream(message)), (steps, guard))),
                StreamStep::Hang => {
                    std::future::pending::<()>().await;
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
