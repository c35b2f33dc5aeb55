//! Recording fakes for the processor's collaborators.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use imagen_core::{Artifact, StepRef, StepStatus, StepUpdate, TaskLog, TaskStep};
use imagen_worker::ports::{ArtifactUploader, ImageGenerator, ProcessError, StepApi, TaskLogger};
use imagen_worker::processor::TaskProcessor;

pub const DID: &str = "did:nv:agent";
pub const GATEWAY_URL: &str = "https://gateway.pinata.cloud/ipfs/QmFake";

pub fn step(step_id: &str, status: StepStatus, input_query: &str) -> TaskStep {
    TaskStep {
        did: DID.into(),
        task_id: format!("task-{step_id}"),
        step_id: step_id.into(),
        step_status: status,
        input_query: input_query.into(),
        output: None,
        output_artifacts: Vec::new(),
        is_last: false,
    }
}

pub fn notification(step: &TaskStep) -> StepRef {
    step.step_ref()
}

pub fn png(width: u32, height: u32) -> Artifact {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    Artifact::from_png(buf.into_inner(), "imagen_00001_.png").unwrap()
}

// ---------------------------------------------------------------------------
// StepApi
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSteps {
    pub steps: Mutex<Vec<TaskStep>>,
    pub fetched: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<(StepRef, StepUpdate)>>,
    /// Reject updates carrying this status.
    pub fail_updates_with: Mutex<Option<StepStatus>>,
}

impl FakeSteps {
    pub fn with(steps: Vec<TaskStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps),
            ..Self::default()
        })
    }

    pub fn updates(&self) -> Vec<(StepRef, StepUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepApi for FakeSteps {
    async fn get_step(&self, step_id: &str) -> Result<TaskStep, ProcessError> {
        self.fetched.lock().unwrap().push(step_id.to_string());
        self.steps
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.step_id == step_id)
            .cloned()
            .ok_or_else(|| ProcessError::Other(format!("step {step_id} not found")))
    }

    async fn update_step(&self, step: &StepRef, update: &StepUpdate) -> Result<(), ProcessError> {
        self.updates
            .lock()
            .unwrap()
            .push((step.clone(), update.clone()));
        if *self.fail_updates_with.lock().unwrap() == Some(update.step_status) {
            return Err(ProcessError::Other("update rejected".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskLogger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLogger {
    pub logs: Mutex<Vec<TaskLog>>,
    pub fail: bool,
}

impl FakeLogger {
    pub fn logs(&self) -> Vec<TaskLog> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskLogger for FakeLogger {
    async fn log_task(&self, log: TaskLog) -> Result<(), ProcessError> {
        self.logs.lock().unwrap().push(log);
        if self.fail {
            return Err(ProcessError::Other("socket closed".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ImageGenerator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl FakeGenerator {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<Artifact, ProcessError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(ProcessError::Other("CUDA out of memory".into()));
        }
        Ok(png(16, 16))
    }
}

// ---------------------------------------------------------------------------
// ArtifactUploader
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeUploader {
    pub uploaded: Mutex<Vec<String>>,
    pub fail: bool,
}

impl FakeUploader {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactUploader for FakeUploader {
    async fn upload(&self, artifact: &Artifact) -> Result<String, ProcessError> {
        self.uploaded.lock().unwrap().push(artifact.file_name.clone());
        if self.fail {
            return Err(ProcessError::Other("pinning service unavailable".into()));
        }
        Ok(GATEWAY_URL.to_string())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub steps: Arc<FakeSteps>,
    pub logger: Arc<FakeLogger>,
    pub generator: Arc<FakeGenerator>,
    pub uploader: Arc<FakeUploader>,
}

impl Harness {
    pub fn new(steps: Vec<TaskStep>) -> Self {
        Self {
            steps: FakeSteps::with(steps),
            logger: Arc::default(),
            generator: Arc::default(),
            uploader: Arc::default(),
        }
    }

    pub fn processor(&self) -> TaskProcessor {
        TaskProcessor::new(
            self.steps.clone(),
            self.logger.clone(),
            self.generator.clone(),
            self.uploader.clone(),
        )
    }
}
