//! Per-session dashboard state: the accumulated lead list, the in-flight
//! guards for "search" and "search more", and the chat history.
//!
//! Each operation locks the session only to begin and to finish; the
//! provider call runs unlocked. Operations are spawned by the handlers so a
//! dropped HTTP request never leaves a guard stuck.

use crate::errors::AppError;
use crate::models::{ChatMessage, ChatRole, Company, SearchFilters};
use crate::provider_store::ResolvedProvider;
use crate::services::InferenceService;
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Shown when a follow-up search yields nothing new.
pub const NO_MORE_RESULTS_MESSAGE: &str =
    "L'IA non ha trovato altre aziende rilevanti in questa zona con i criteri attuali.";

/// Replaces an empty chat answer.
pub const EMPTY_CHAT_ANSWER: &str = "I couldn't find specific information on that.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardStatus {
    Idle,
    Loading,
    LoadingMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Last message to surface to the user (informational or error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub kind: String,
    pub message: String,
}

impl Notice {
    fn info(kind: &str, message: &str) -> Self {
        Self {
            level: NoticeLevel::Info,
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }

    fn from_error(err: &AppError) -> Self {
        Self {
            level: NoticeLevel::Error,
            kind: err.kind().to_string(),
            message: err.user_message(),
        }
    }
}

/// Inputs captured when a follow-up search starts.
#[derive(Debug, Clone)]
pub struct MoreTicket {
    pub filters: SearchFilters,
    pub existing_names: Vec<String>,
}

/// What a "search more" did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoreOutcome {
    /// New records were appended.
    Appended { added: usize },
    /// The provider had nothing new; the list is unchanged.
    Exhausted,
    /// No previous search, or one already in flight; nothing was sent.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub session_id: Uuid,
    pub status: DashboardStatus,
    pub last_filters: Option<SearchFilters>,
    pub notice: Option<Notice>,
    pub total: usize,
    pub companies: Vec<Company>,
}

#[derive(Debug)]
pub struct DashboardSession {
    id: Uuid,
    companies: Vec<Company>,
    last_filters: Option<SearchFilters>,
    loading: bool,
    loading_more: bool,
    chat_pending: bool,
    notice: Option<Notice>,
    chat: Vec<ChatMessage>,
}

impl DashboardSession {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            companies: Vec::new(),
            last_filters: None,
            loading: false,
            loading_more: false,
            chat_pending: false,
            notice: None,
            chat: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn last_filters(&self) -> Option<&SearchFilters> {
        self.last_filters.as_ref()
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn status(&self) -> DashboardStatus {
        if self.loading {
            DashboardStatus::Loading
        } else if self.loading_more {
            DashboardStatus::LoadingMore
        } else {
            DashboardStatus::Idle
        }
    }

    /// Starts a full-replace search: clears the list and remembers `filters`.
    pub fn begin_search(&mut self, filters: SearchFilters) -> Result<(), AppError> {
        if self.loading {
            return Err(AppError::Conflict("A search is already in progress".to_string()));
        }

        self.loading = true;
        self.notice = None;
        self.companies.clear();
        self.last_filters = Some(filters);
        Ok(())
    }

    pub fn finish_search(&mut self, result: Result<Vec<Company>, AppError>) -> Result<usize, AppError> {
        self.loading = false;
        match result {
            Ok(companies) => {
                let count = companies.len();
                self.companies = companies;
                Ok(count)
            }
            Err(e) => {
                self.notice = Some(Notice::from_error(&e));
                Err(e)
            }
        }
    }

    /// Starts a follow-up search, or returns `None` when there is nothing to
    /// follow up or one is already running.
    pub fn begin_more(&mut self) -> Option<MoreTicket> {
        if self.loading_more {
            return None;
        }
        let filters = self.last_filters.clone()?;

        self.loading_more = true;
        self.notice = None;
        Some(MoreTicket {
            filters,
            existing_names: self.companies.iter().map(|c| c.name.clone()).collect(),
        })
    }

    /// Appends a follow-up batch as-is; no merging or dedupe by identity.
    pub fn finish_more(
        &mut self,
        result: Result<Vec<Company>, AppError>,
    ) -> Result<MoreOutcome, AppError> {
        self.loading_more = false;
        match result {
            Ok(batch) if batch.is_empty() => {
                self.notice = Some(Notice::info("no_more_results", NO_MORE_RESULTS_MESSAGE));
                Ok(MoreOutcome::Exhausted)
            }
            Ok(batch) => {
                let added = batch.len();
                self.companies.extend(batch);
                Ok(MoreOutcome::Appended { added })
            }
            Err(e) => {
                self.notice = Some(Notice::from_error(&e));
                Err(e)
            }
        }
    }

    /// Starts a free-text extraction, which replaces the list on success.
    pub fn begin_raw(&mut self) -> Result<(), AppError> {
        if self.loading {
            return Err(AppError::Conflict("A search is already in progress".to_string()));
        }
        self.loading = true;
        self.notice = None;
        Ok(())
    }

    pub fn finish_raw(&mut self, result: Result<Vec<Company>, AppError>) -> Result<usize, AppError> {
        self.loading = false;
        match result {
            Ok(companies) => {
                let count = companies.len();
                self.companies = companies;
                Ok(count)
            }
            Err(e) => {
                self.notice = Some(Notice::from_error(&e));
                Err(e)
            }
        }
    }

    /// Records the user's message and marks a chat request in flight.
    pub fn begin_chat(&mut self, text: &str) -> Result<(), AppError> {
        if self.chat_pending {
            return Err(AppError::Conflict("A chat reply is already pending".to_string()));
        }
        self.chat_pending = true;
        self.chat.push(ChatMessage::new(ChatRole::User, text));
        Ok(())
    }

    pub fn finish_chat(&mut self, result: Result<String, AppError>) -> Result<ChatMessage, AppError> {
        self.chat_pending = false;
        let text = result?;
        let text = if text.trim().is_empty() {
            EMPTY_CHAT_ANSWER.to_string()
        } else {
            text
        };

        let reply = ChatMessage::new(ChatRole::Model, text);
        self.chat.push(reply.clone());
        Ok(reply)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            session_id: self.id,
            status: self.status(),
            last_filters: self.last_filters.clone(),
            notice: self.notice.clone(),
            total: self.companies.len(),
            companies: self.companies.clone(),
        }
    }
}

pub type SharedSession = Arc<Mutex<DashboardSession>>;

/// Dashboard sessions, evicted after a period of inactivity.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, SharedSession>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, max_sessions: u64) -> Self {
        Self {
            sessions: Cache::builder()
                .time_to_idle(idle_timeout)
                .max_capacity(max_sessions)
                .build(),
        }
    }

    pub async fn create(&self) -> SharedSession {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(DashboardSession::new(id)));
        self.sessions.insert(id, session.clone()).await;
        tracing::info!("Dashboard session {} created", id);
        session
    }

    pub async fn get(&self, id: Uuid) -> Result<SharedSession, AppError> {
        self.sessions
            .get(&id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }
}

// ============ Operations ============

/// Primary search: replaces the list with a fresh batch.
pub async fn run_search(
    session: SharedSession,
    inference: InferenceService,
    provider: ResolvedProvider,
    filters: SearchFilters,
) -> Result<DashboardSnapshot, AppError> {
    session.lock().await.begin_search(filters.clone())?;

    let result = inference.search_companies(&provider, &filters, &[]).await;

    let mut guard = session.lock().await;
    let count = guard.finish_search(result)?;
    tracing::info!("Session {}: search produced {} companies", guard.id(), count);
    Ok(guard.snapshot())
}

/// Follow-up search: appends a batch generated with every known name as
/// the exclusion hint. A no-op when nothing can be followed up.
///
/// The provider is only required once a follow-up actually starts, so a
/// skipped call succeeds even when no usable provider is configured.
pub async fn run_more(
    session: SharedSession,
    inference: InferenceService,
    provider: Result<ResolvedProvider, AppError>,
) -> Result<(MoreOutcome, DashboardSnapshot), AppError> {
    let ticket = session.lock().await.begin_more();
    let Some(ticket) = ticket else {
        let guard = session.lock().await;
        tracing::debug!("Session {}: search-more skipped", guard.id());
        return Ok((MoreOutcome::Skipped, guard.snapshot()));
    };

    let result = match provider {
        Ok(provider) => {
            inference
                .search_companies(&provider, &ticket.filters, &ticket.existing_names)
                .await
        }
        Err(e) => Err(e),
    };

    let mut guard = session.lock().await;
    let outcome = guard.finish_more(result)?;
    tracing::info!("Session {}: search-more {:?}", guard.id(), outcome);
    Ok((outcome, guard.snapshot()))
}

/// Free-text extraction: replaces the list with the extracted records.
pub async fn run_raw(
    session: SharedSession,
    inference: InferenceService,
    provider: ResolvedProvider,
    text: String,
) -> Result<DashboardSnapshot, AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Raw text cannot be empty".to_string()));
    }

    session.lock().await.begin_raw()?;

    let result = inference.process_raw_data(&provider, &text).await;

    let mut guard = session.lock().await;
    let count = guard.finish_raw(result)?;
    tracing::info!("Session {}: extracted {} companies", guard.id(), count);
    Ok(guard.snapshot())
}

/// One chat turn; the provider only ever sees the current message.
pub async fn run_chat(
    session: SharedSession,
    inference: InferenceService,
    provider: ResolvedProvider,
    message: String,
) -> Result<ChatMessage, AppError> {
    if message.trim().is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }

    session.lock().await.begin_chat(&message)?;

    let result = inference.chat_with_search(&provider, &message).await;

    session.lock().await.finish_chat(result)
}
