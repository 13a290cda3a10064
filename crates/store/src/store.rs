//! REST-backed application state.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use pitchdeck_api::{ApiClient, ApiError};
use pitchdeck_protocol::{
    Analysis, AnalysisResult, Deck, JobId, KnowledgeFile, StatusMessage,
};

use crate::progress::JobProgress;

/// Everything the client knows about decks, analyses and the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub decks: Vec<Deck>,
    pub current_deck: Option<Deck>,
    pub analysis: Option<Analysis>,
    pub analysis_result: Option<AnalysisResult>,
    pub knowledge_files: Vec<KnowledgeFile>,
    pub loading: bool,
    pub error: Option<String>,
    /// Live progress per job, fed by the status stream.
    pub jobs: HashMap<JobId, JobProgress>,
}

impl AppState {
    fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    fn fail<T>(&mut self, e: ApiError) -> Result<T, ApiError> {
        warn!(error = %e, "request failed");
        self.loading = false;
        self.error = Some(e.to_string());
        Err(e)
    }

    fn finish<T>(&mut self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.loading = false;
                Ok(value)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Folds a status stream message into the job's progress.
    ///
    /// When the job is the tracked analysis, its status follows along.
    pub fn apply_status(&mut self, job_id: &JobId, msg: &StatusMessage) -> &JobProgress {
        let progress = self.jobs.entry(job_id.clone()).or_default();
        progress.apply(msg);

        if let Some(analysis) = self.analysis.as_mut()
            && analysis.id == job_id.as_str()
            && analysis.status != progress.status
        {
            debug!(job = %job_id, status = %progress.status, "analysis status updated from stream");
            analysis.status = progress.status;
        }
        progress
    }

    pub fn job(&self, job_id: &JobId) -> Option<&JobProgress> {
        self.jobs.get(job_id)
    }
}

/// Runs API actions and records their results.
///
/// Every action raises `loading` and clears `error` first; on failure the
/// error's message is stored, `loading` drops and the error is returned.
pub struct AppStore {
    api: ApiClient,
    state: AppState,
}

impl AppStore {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: AppState::default(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Uploads a deck for analysis, then refreshes the deck list.
    pub async fn upload_deck(
        &mut self,
        path: &Path,
        startup_name: &str,
    ) -> Result<Analysis, ApiError> {
        self.state.begin();
        let analysis = match self.api.analyze_deck(path, startup_name).await {
            Ok(analysis) => analysis,
            Err(e) => return self.state.fail(e),
        };
        self.state.analysis = Some(analysis.clone());
        self.fetch_decks().await?;
        Ok(analysis)
    }

    pub async fn fetch_decks(&mut self) -> Result<(), ApiError> {
        self.state.begin();
        let result = self.api.decks().await;
        self.state.finish(result).map(|decks| self.state.decks = decks)
    }

    pub async fn fetch_deck(&mut self, id: &str) -> Result<(), ApiError> {
        self.state.begin();
        let result = self.api.deck(id).await;
        self.state
            .finish(result)
            .map(|deck| self.state.current_deck = Some(deck))
    }

    pub async fn fetch_analysis_status(&mut self, job_id: &JobId) -> Result<(), ApiError> {
        self.state.begin();
        let result = self.api.analysis_status(job_id).await;
        self.state
            .finish(result)
            .map(|analysis| self.state.analysis = Some(analysis))
    }

    pub async fn fetch_analysis_result(&mut self, job_id: &JobId) -> Result<(), ApiError> {
        self.state.begin();
        let result = self.api.analysis_result(job_id).await;
        self.state
            .finish(result)
            .map(|r| self.state.analysis_result = Some(r))
    }

    /// Adds a knowledge file, then refreshes the file list.
    pub async fn upload_knowledge_file(&mut self, path: &Path) -> Result<(), ApiError> {
        self.state.begin();
        if let Err(e) = self.api.upload_knowledge_file(path).await {
            return self.state.fail(e);
        }
        self.fetch_knowledge_files().await
    }

    pub async fn fetch_knowledge_files(&mut self) -> Result<(), ApiError> {
        self.state.begin();
        let result = self.api.knowledge_files().await;
        self.state
            .finish(result)
            .map(|files| self.state.knowledge_files = files)
    }

    /// Replaces the knowledge file list with search hits.
    pub async fn search_knowledge(&mut self, query: &str) -> Result<(), ApiError> {
        self.state.begin();
        let result = self.api.search_knowledge(query).await;
        self.state
            .finish(result)
            .map(|files| self.state.knowledge_files = files)
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.state.error = error;
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }
}
