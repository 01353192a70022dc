//! Testing utilities for the connector workspace
//!
//! An in-memory execution service ([`FakeService`]) that implements the
//! connector's `Transport` seam, plus the matching event stream
//! ([`FakeEvents`]) and a few fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use comfy_connector::{
    ArtifactRef, ClientId, ConnectorError, EventStream, Frame, HistoryRecord, JobClient, JobId,
    Transport, TransportError, UploadAck, UploadRequest,
};
use comfy_graph::JobGraph;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::Notify;

/// How the fake answers the reachability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// `GET /` answers 200
    Up,
    /// `GET /` answers something else
    Degraded,
    /// Connection refused
    Unreachable,
}

/// One recorded `POST /prompt`
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: JobId,
    pub graph: JobGraph,
    pub client_id: ClientId,
}

#[derive(Debug)]
struct State {
    health: Health,
    auto_complete: bool,
    record_history: bool,
    reject_submissions: Option<(u16, String)>,
    next_job: u64,
    outputs: Vec<(String, ArtifactRef)>,
    artifacts: HashMap<ArtifactRef, Vec<u8>>,
    histories: HashMap<JobId, HistoryRecord>,
    submissions: Vec<Submission>,
    uploads: Vec<UploadRequest>,
    frames: VecDeque<Frame>,
    stream_open: bool,
    connects: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            health: Health::Up,
            auto_complete: true,
            record_history: true,
            reject_submissions: None,
            next_job: 0,
            outputs: Vec::new(),
            artifacts: HashMap::new(),
            histories: HashMap::new(),
            submissions: Vec::new(),
            uploads: Vec::new(),
            frames: VecDeque::new(),
            stream_open: false,
            connects: 0,
        }
    }
}

/// In-memory execution service
///
/// Clones share state, so a test can keep a handle while the client owns
/// another. Each submission is assigned `job-N`; with auto-complete on, the
/// job's progress and terminal `executing` frames are queued immediately and
/// its history lists every output registered through [`with_output`](Self::with_output).
#[derive(Debug, Clone, Default)]
pub struct FakeService {
    state: Arc<Mutex<State>>,
    frames_ready: Arc<Notify>,
}

impl FakeService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image every job will report for `node_id`
    #[must_use]
    pub fn with_output(self, node_id: &str, filename: &str, bytes: Vec<u8>) -> Self {
        {
            let mut state = self.state.lock();
            let artifact = ArtifactRef::output(filename);
            state.outputs.push((node_id.to_string(), artifact.clone()));
            state.artifacts.insert(artifact, bytes);
        }
        self
    }

    pub fn set_health(&self, health: Health) {
        self.state.lock().health = health;
    }

    /// Stop queuing completion frames on submission
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.state.lock().auto_complete = auto_complete;
    }

    /// Leave history empty for subsequent jobs
    pub fn forget_history(&self) {
        self.state.lock().record_history = false;
    }

    /// Answer every submission with an HTTP error
    pub fn reject_submissions(&self, status: u16, body: &str) {
        self.state.lock().reject_submissions = Some((status, body.to_string()));
    }

    /// Queue a frame on the event stream
    pub fn push_frame(&self, frame: Frame) {
        self.state.lock().frames.push_back(frame);
        self.frames_ready.notify_one();
    }

    /// Queue the terminal `executing` frame for `job_id`
    pub fn complete(&self, job_id: &str) {
        self.push_frame(executing_frame(None, job_id));
    }

    /// Close the event connection from the service side
    pub fn drop_event_connection(&self) {
        self.state.lock().stream_open = false;
        self.frames_ready.notify_one();
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.state.lock().uploads.clone()
    }

    /// Number of times the event stream was opened
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Event stream attached to this service
    #[must_use]
    pub fn events(&self) -> FakeEvents {
        FakeEvents {
            service: self.clone(),
        }
    }

    /// Job client wired to this service
    #[must_use]
    pub fn client(&self) -> JobClient<FakeService, FakeEvents> {
        JobClient::new(self.clone(), self.events(), ClientId::generate("TEST"))
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn check_alive(&self) -> Result<bool, ConnectorError> {
        match self.state.lock().health {
            Health::Up => Ok(true),
            Health::Degraded => Ok(false),
            Health::Unreachable => Err(ConnectorError::unreachable(
                "fake-service",
                "connection refused",
            )),
        }
    }

    async fn submit(
        &self,
        graph: &JobGraph,
        client_id: &ClientId,
    ) -> Result<JobId, ConnectorError> {
        let mut state = self.state.lock();
        if let Some((status, body)) = &state.reject_submissions {
            return Err(TransportError::Status {
                endpoint: "/prompt".into(),
                status: *status,
                body: body.clone(),
            }
            .into());
        }

        state.next_job += 1;
        let job_id = JobId::new(format!("job-{}", state.next_job));
        state.submissions.push(Submission {
            job_id: job_id.clone(),
            graph: graph.clone(),
            client_id: client_id.clone(),
        });

        if state.record_history {
            let mut record = HistoryRecord::default();
            for (node_id, artifact) in state.outputs.clone() {
                record = record.with_images(node_id, [artifact]);
            }
            state.histories.insert(job_id.clone(), record);
        }

        if state.auto_complete {
            state.frames.push_back(Frame::Text(
                serde_json::json!({"type": "status", "data": {"status": {"exec_info": {"queue_remaining": 1}}}})
                    .to_string(),
            ));
            state
                .frames
                .push_back(executing_frame(Some("1"), job_id.as_str()));
            state.frames.push_back(Frame::Binary(vec![0, 0, 0, 1]));
            state.frames.push_back(executing_frame(None, job_id.as_str()));
            self.frames_ready.notify_one();
        }

        Ok(job_id)
    }

    async fn fetch_history(&self, job_id: &JobId) -> Result<HistoryRecord, ConnectorError> {
        self.state
            .lock()
            .histories
            .get(job_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("history for job {job_id}")))
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ConnectorError> {
        self.state
            .lock()
            .artifacts
            .get(artifact)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("artifact {artifact}")))
    }

    async fn upload_artifact(&self, request: &UploadRequest) -> Result<UploadAck, ConnectorError> {
        if !request.path.exists() {
            return Err(ConnectorError::io_error(
                &request.path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let name = request
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.state.lock().uploads.push(request.clone());
        Ok(UploadAck {
            name,
            subfolder: request.subfolder.clone().unwrap_or_default(),
            folder_type: request
                .folder_type
                .clone()
                .unwrap_or_else(|| "input".to_string()),
        })
    }
}

/// Event stream of a [`FakeService`]
///
/// Waits indefinitely when no frames are queued, like an idle websocket.
#[derive(Debug, Clone)]
pub struct FakeEvents {
    service: FakeService,
}

impl FakeEvents {
    /// Close the connection from the client side
    pub fn disconnect(&mut self) {
        self.service.state.lock().stream_open = false;
    }
}

#[async_trait]
impl EventStream for FakeEvents {
    fn is_open(&self) -> bool {
        self.service.state.lock().stream_open
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let mut state = self.service.state.lock();
        if state.health == Health::Unreachable {
            return Err(ConnectorError::EventStream("connection refused".into()));
        }
        if !state.stream_open {
            state.stream_open = true;
            state.connects += 1;
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, ConnectorError> {
        loop {
            {
                let mut state = self.service.state.lock();
                if !state.stream_open {
                    return Ok(None);
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Ok(Some(frame));
                }
            }
            self.service.frames_ready.notified().await;
        }
    }
}

/// `executing` frame; `node: None` is the terminal signal
#[must_use]
pub fn executing_frame(node: Option<&str>, job_id: &str) -> Frame {
    Frame::Text(
        serde_json::json!({"type": "executing", "data": {"node": node, "prompt_id": job_id}})
            .to_string(),
    )
}

/// PNG-encoded solid image
#[must_use]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Two-node graph whose `SaveImage` node `"1"` reads from node `"2"`
#[must_use]
pub fn save_image_graph() -> JobGraph {
    JobGraph::from_json_str(
        r#"{"1": {"class_type": "SaveImage", "images": ["2", 0]}, "2": {"class_type": "Foo", "seed": 5}}"#,
    )
    .unwrap()
}

/// Text-to-image workflow in the layout the service's default UI exports
#[must_use]
pub fn txt2img_graph() -> JobGraph {
    JobGraph::from_value(serde_json::json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": 8566257, "steps": 20, "cfg": 8.0,
                "sampler_name": "euler", "scheduler": "normal", "denoise": 1.0,
                "model": ["4", 0], "positive": ["6", 0], "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "v1-5-pruned-emaonly.safetensors"}},
        "5": {"class_type": "EmptyLatentImage", "inputs": {"batch_size": 1, "height": 512, "width": 512}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"clip": ["4", 1], "text": "a red fox in snow"}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"clip": ["4", 1], "text": "blurry"}},
        "8": {"class_type": "VAEDecode", "inputs": {"samples": ["3", 0], "vae": ["4", 2]}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}}
    }))
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_well_formed() {
        assert_eq!(save_image_graph().output_node().as_deref(), Some("1"));
        assert_eq!(txt2img_graph().output_node().as_deref(), Some("9"));
        assert!(image::load_from_memory(&png_bytes(3, 2)).is_ok());
    }

    #[tokio::test]
    async fn submissions_get_sequential_ids() {
        let service = FakeService::new();
        let client_id = ClientId::from_string("t");
        let a = service.submit(&save_image_graph(), &client_id).await.unwrap();
        let b = service.submit(&save_image_graph(), &client_id).await.unwrap();
        assert_eq!(a.as_str(), "job-1");
        assert_eq!(b.as_str(), "job-2");
        assert_eq!(service.submissions().len(), 2);
    }

    #[tokio::test]
    async fn closed_stream_yields_none() {
        let service = FakeService::new();
        let mut events = service.events();
        events.connect().await.unwrap();
        service.drop_event_connection();
        assert_eq!(events.next_frame().await.unwrap(), None);
        assert!(!events.is_open());
    }
}
