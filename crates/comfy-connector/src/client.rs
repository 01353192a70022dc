//! Job client: one submission-to-images cycle
//!
//! # Workflow
//! 1. Open the event stream if it is closed
//! 2. Submit the graph and obtain a job id
//! 3. Read frames until the job's terminal `executing` signal
//! 4. Resolve the `SaveImage` node on the submitted graph
//! 5. Read the job's history and list that node's images
//! 6. Fetch and decode each image, in service order
//!
//! The client takes `&mut self` for a whole cycle, so a single connection
//! never has two jobs in flight and completion signals cannot be confused.

use crate::error::ConnectorError;
use crate::events::{EventStream, ExecutionEvent, Frame};
use crate::transport::Transport;
use crate::types::{ClientId, GeneratedImage, JobId, UploadAck, UploadRequest};
use comfy_graph::JobGraph;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Stage of a job cycle, attached to failure logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStep {
    Connect,
    Submit,
    AwaitCompletion,
    ResolveOutput,
    FetchHistory,
    FetchArtifact,
    Decode,
}

impl Display for JobStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Submit => "submit",
            Self::AwaitCompletion => "await-completion",
            Self::ResolveOutput => "resolve-output",
            Self::FetchHistory => "fetch-history",
            Self::FetchArtifact => "fetch-artifact",
            Self::Decode => "decode",
        };
        f.write_str(name)
    }
}

fn at_step<T>(step: JobStep, result: Result<T, ConnectorError>) -> Result<T, ConnectorError> {
    result.map_err(|e| {
        debug!(%step, error = %e, "job cycle step failed");
        e
    })
}

/// Client for one service connection
#[derive(Debug)]
pub struct JobClient<T, E> {
    transport: T,
    events: E,
    client_id: ClientId,
    completion_timeout: Option<Duration>,
}

impl<T: Transport, E: EventStream> JobClient<T, E> {
    /// Create a client; the event stream is opened lazily
    #[must_use]
    pub fn new(transport: T, events: E, client_id: ClientId) -> Self {
        Self {
            transport,
            events,
            client_id,
            completion_timeout: None,
        }
    }

    /// With an upper bound on the completion wait (`None` waits indefinitely)
    #[inline]
    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Identity scoping this client's events
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Underlying transport
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying event stream
    #[inline]
    #[must_use]
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Mutable event stream
    #[inline]
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Open the event stream unless it is already open
    ///
    /// Frames left over from earlier jobs are dropped first, which also
    /// surfaces a connection the service closed while it sat idle.
    pub async fn ensure_connected(&mut self) -> Result<(), ConnectorError> {
        self.events.discard_pending();
        if self.events.is_open() {
            return Ok(());
        }
        info!(client_id = %self.client_id, "event stream not connected, connecting");
        self.events.connect().await
    }

    /// Queue a graph and return its job id
    pub async fn submit(&self, graph: &JobGraph) -> Result<JobId, ConnectorError> {
        self.transport.submit(graph, &self.client_id).await
    }

    /// Run a graph and return its decoded `SaveImage` outputs
    ///
    /// An `Ok` with no images means the job ran and produced none; every
    /// failure along the way is returned as an error.
    pub async fn generate_images(
        &mut self,
        graph: &JobGraph,
    ) -> Result<Vec<GeneratedImage>, ConnectorError> {
        self.generate_images_with_cancel(graph, &CancellationToken::new())
            .await
    }

    /// [`generate_images`](Self::generate_images) with a cancellable wait
    pub async fn generate_images_with_cancel(
        &mut self,
        graph: &JobGraph,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedImage>, ConnectorError> {
        at_step(JobStep::Connect, self.ensure_connected().await)?;

        let job_id = at_step(JobStep::Submit, self.submit(graph).await)?;
        info!(%job_id, "job submitted");

        at_step(
            JobStep::AwaitCompletion,
            self.wait_for_completion(&job_id, cancel).await,
        )?;
        info!(%job_id, "job finished executing");

        self.collect_images(graph, &job_id).await
    }

    /// Block until the service reports `job_id` has nothing left to execute
    pub async fn wait_for_completion(
        &mut self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        let limit = self.completion_timeout;
        let wait = await_terminal(&mut self.events, job_id);

        let bounded = async {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, wait).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectorError::Timeout {
                        job_id: job_id.clone(),
                        waited: limit,
                    }),
                },
                None => wait.await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ConnectorError::Cancelled { job_id: job_id.clone() }),
            result = bounded => result,
        }
    }

    /// Fetch and decode the outputs of a finished job
    ///
    /// The output node is resolved on `graph`, the graph that was submitted,
    /// not on the copy the service echoes back in its history.
    pub async fn collect_images(
        &self,
        graph: &JobGraph,
        job_id: &JobId,
    ) -> Result<Vec<GeneratedImage>, ConnectorError> {
        let output_node = at_step(
            JobStep::ResolveOutput,
            graph.output_node().ok_or_else(|| {
                ConnectorError::PreconditionFailed(
                    "job graph has no SaveImage node to read outputs from".into(),
                )
            }),
        )?;

        let history = at_step(
            JobStep::FetchHistory,
            self.transport.fetch_history(job_id).await,
        )?;
        let artifacts = at_step(JobStep::FetchHistory, history.images_for(&output_node))?;
        debug!(%job_id, node = %output_node, count = artifacts.len(), "outputs listed");

        let mut images = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let bytes = at_step(
                JobStep::FetchArtifact,
                self.transport.fetch_artifact(&artifact).await,
            )?;
            let image = at_step(
                JobStep::Decode,
                image::load_from_memory(&bytes).map_err(|source| ConnectorError::Decode {
                    filename: artifact.filename.clone(),
                    source,
                }),
            )?;
            images.push(GeneratedImage { artifact, image });
        }

        info!(%job_id, count = images.len(), "images retrieved");
        Ok(images)
    }

    /// Upload a local file for use as a node input
    pub async fn upload_image(&self, request: &UploadRequest) -> Result<UploadAck, ConnectorError> {
        self.transport.upload_artifact(request).await.map_err(|e| {
            debug!(path = %request.path.display(), error = %e, "upload failed");
            e
        })
    }
}

/// Read frames until the terminal signal for `job_id`
async fn await_terminal<E: EventStream>(
    events: &mut E,
    job_id: &JobId,
) -> Result<(), ConnectorError> {
    loop {
        let Some(frame) = events.next_frame().await? else {
            return Err(ConnectorError::EventStream(format!(
                "event stream closed before job {job_id} completed"
            )));
        };

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => {
                trace!(size = bytes.len(), "binary frame discarded");
                continue;
            }
        };

        match ExecutionEvent::parse(&text) {
            Ok(event) if event.is_terminal_for(job_id) => return Ok(()),
            Ok(event) => trace!(?event, "event discarded"),
            Err(e) => debug!(error = %e, "unparseable frame discarded"),
        }
    }
}
