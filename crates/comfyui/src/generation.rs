//! Submit-and-poll image generation against a ComfyUI instance.
//!
//! [`GenerationClient::generate`] runs the full two-phase protocol:
//!
//! 1. `POST /prompt` with the injected node mapping, yielding a prompt id.
//! 2. `GET /history/{prompt_id}` on a fixed interval until an output image
//!    appears or the attempt budget is spent.
//!
//! The client holds no per-job state. Every call owns its own
//! [`GenerationJob`] and polling loop, and the wait between polls is a
//! `tokio::time::sleep`, so concurrent sessions never block each other.

use std::time::Duration;

use assistant_core::workflow::WorkflowGraph;
use serde::Serialize;

use crate::api::{ComfyUIApi, ComfyUIApiError, HISTORY_TIMEOUT, SUBMIT_TIMEOUT};
use crate::history;

/// Delay between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of history polls before giving up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Longest diagnostic (in characters) carried by a [`GenerationError`].
pub const MAX_DIAGNOSTIC_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for the polling phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Total number of polls, including the first.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Longest a single [`GenerationClient::generate`] call can take: the
    /// submit timeout, every history request timing out, and the sleeps
    /// between them.
    pub fn worst_case_turn(&self) -> Duration {
        let polls = HISTORY_TIMEOUT
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX);
        let sleeps = self
            .interval
            .checked_mul(self.max_attempts.saturating_sub(1))
            .unwrap_or(Duration::MAX);
        SUBMIT_TIMEOUT.saturating_add(polls).saturating_add(sleeps)
    }
}

// ---------------------------------------------------------------------------
// Job lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a submitted generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// One submitted prompt, tracked until it reaches a terminal state.
///
/// Terminal jobs are frozen: later transitions are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    job_id: String,
    status: JobStatus,
    artifact_ref: Option<String>,
}

impl GenerationJob {
    fn new(job_id: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            artifact_ref: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn artifact_ref(&self) -> Option<&str> {
        self.artifact_ref.as_deref()
    }

    fn complete(&mut self, artifact_ref: String) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Completed;
            self.artifact_ref = Some(artifact_ref);
        }
    }

    fn fail(&mut self) {
        self.transition(JobStatus::Failed);
    }

    fn time_out(&mut self) {
        self.transition(JobStatus::TimedOut);
    }

    fn transition(&mut self, status: JobStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Terminal failures of a generation request.
///
/// Individual poll failures never surface here; they are retried until the
/// attempt budget runs out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// ComfyUI rejected the workflow or could not be reached at submit time.
    #[error("{0}")]
    Submission(String),

    /// ComfyUI answered but violated the expected contract.
    #[error("{0}")]
    Protocol(String),

    /// No image appeared within the poll budget.
    #[error("Generation timed out after {attempts} polls")]
    TimedOut { attempts: u32 },
}

impl GenerationError {
    /// Whether the caller may reasonably offer "try again".
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::TimedOut { .. })
    }

    fn submission(message: impl AsRef<str>) -> Self {
        GenerationError::Submission(truncate_diagnostic(message.as_ref()))
    }

    fn protocol(message: impl AsRef<str>) -> Self {
        GenerationError::Protocol(truncate_diagnostic(message.as_ref()))
    }
}

/// Truncate a diagnostic to at most [`MAX_DIAGNOSTIC_CHARS`] characters.
pub fn truncate_diagnostic(message: &str) -> String {
    message.chars().take(MAX_DIAGNOSTIC_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Outcome of a single history poll.
enum PollOutcome {
    /// Nothing usable yet (including transient failures).
    NotReady,
    /// An output image is available at this URL.
    Ready(String),
    /// The engine reported that the prompt failed.
    Failed(String),
}

/// Stateless, reentrant ComfyUI generation client.
///
/// Cheap to clone; the inner [`reqwest::Client`] pools connections across
/// calls and base URLs.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    poll: PollConfig,
}

impl GenerationClient {
    pub fn new(poll: PollConfig) -> Self {
        Self::with_client(reqwest::Client::new(), poll)
    }

    pub fn with_client(http: reqwest::Client, poll: PollConfig) -> Self {
        Self { http, poll }
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Submit `graph` to the ComfyUI instance at `base_url` and wait for the
    /// first output image.
    ///
    /// Returns the image's `/view` URL.
    pub async fn generate(
        &self,
        base_url: &str,
        graph: &WorkflowGraph,
    ) -> Result<String, GenerationError> {
        let api = ComfyUIApi::with_client(self.http.clone(), base_url);
        let mut job = self.submit(&api, graph).await?;
        let result = self.wait_for_artifact(&api, &mut job).await;

        tracing::info!(
            prompt_id = %job.job_id(),
            status = ?job.status(),
            "Generation finished",
        );
        result
    }

    /// Liveness probe against `GET {base_url}/system_stats`.
    pub async fn probe(&self, base_url: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        ComfyUIApi::with_client(self.http.clone(), base_url)
            .system_stats()
            .await
    }

    /// Submission phase. No retry is attempted.
    pub async fn submit(
        &self,
        api: &ComfyUIApi,
        graph: &WorkflowGraph,
    ) -> Result<GenerationJob, GenerationError> {
        let client_id = uuid::Uuid::new_v4().to_string();

        let response = api
            .submit_workflow(&graph.to_value(), &client_id)
            .await
            .map_err(|e| {
                tracing::warn!(api_url = %api.api_url(), error = %e, "Workflow submission failed");
                match e {
                    ComfyUIApiError::Request(ref err) if err.is_decode() => {
                        GenerationError::protocol(format!("invalid submission response: {err}"))
                    }
                    other => GenerationError::submission(other.to_string()),
                }
            })?;

        let prompt_id = response
            .prompt_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| GenerationError::protocol("no job id returned"))?;

        tracing::info!(
            api_url = %api.api_url(),
            prompt_id = %prompt_id,
            queue_number = ?response.number,
            "Workflow submitted to ComfyUI",
        );

        Ok(GenerationJob::new(prompt_id))
    }

    /// Polling phase: drive `job` to a terminal state.
    ///
    /// Polls are separated by [`PollConfig::interval`]; there is no sleep
    /// after the final attempt.
    pub async fn wait_for_artifact(
        &self,
        api: &ComfyUIApi,
        job: &mut GenerationJob,
    ) -> Result<String, GenerationError> {
        for attempt in 1..=self.poll.max_attempts {
            match poll_once(api, job.job_id(), attempt).await {
                PollOutcome::Ready(url) => {
                    job.complete(url.clone());
                    return Ok(url);
                }
                PollOutcome::Failed(message) => {
                    job.fail();
                    return Err(GenerationError::protocol(format!(
                        "generation failed: {message}"
                    )));
                }
                PollOutcome::NotReady => {}
            }

            if attempt < self.poll.max_attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        job.time_out();
        tracing::warn!(
            prompt_id = %job.job_id(),
            attempts = self.poll.max_attempts,
            "Generation timed out",
        );
        Err(GenerationError::TimedOut {
            attempts: self.poll.max_attempts,
        })
    }
}

/// Fetch the history once. Transport errors, error statuses, and empty or
/// unparsable bodies all mean "not ready yet".
async fn poll_once(api: &ComfyUIApi, prompt_id: &str, attempt: u32) -> PollOutcome {
    let record = match api.get_history(prompt_id).await {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(prompt_id, attempt, error = %e, "History poll failed, retrying");
            return PollOutcome::NotReady;
        }
    };

    if history::is_empty_history(&record) {
        tracing::debug!(prompt_id, attempt, "Prompt not finished yet");
        return PollOutcome::NotReady;
    }

    if let Some(image) = history::first_image(&record, prompt_id) {
        let url = api.view_url(&image);
        tracing::debug!(prompt_id, attempt, url = %url, "Output image available");
        return PollOutcome::Ready(url);
    }

    if let Some(message) = history::execution_error(&record, prompt_id) {
        return PollOutcome::Failed(message);
    }

    PollOutcome::NotReady
}
