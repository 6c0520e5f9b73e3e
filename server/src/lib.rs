use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use notes_core::store::{build_index, parse_datetime};
use notes_core::tokenizer::unique_tokens;
use notes_core::{DocId, IndexStats, KeywordIndex, Meeting, MeetingStore, MeetingUpdate, NewMeeting, StorePaths};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const NO_RELEVANT_MEETINGS: &str = "I couldn't find any relevant meetings to answer your question.";

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}
fn default_list_limit() -> usize { 100 }

#[derive(Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize, Deserialize)]
pub struct SearchHit {
    pub meeting_id: DocId,
    pub score: u32,
    pub title: String,
    pub notes: String,
    pub snippet: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct IdsResponse {
    pub query: String,
    pub meeting_ids: Vec<DocId>,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Context handed to the answer generator.
#[derive(Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    /// Set when nothing matched; the generator should not be called.
    pub message: Option<String>,
    pub relevant_meetings: Vec<RelevantMeeting>,
}

#[derive(Serialize, Deserialize)]
pub struct RelevantMeeting {
    pub meeting_id: DocId,
    pub title: String,
    pub score: u32,
    pub notes: String,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub meetings: usize,
    pub index: IndexStats,
}

#[derive(Clone)]
pub struct AppState {
    pub store: MeetingStore,
    pub index: Arc<KeywordIndex>,
    pub admin_token: Option<String>,
    pub ask_limit: usize,
    // a store write and its index write happen as one step
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Open the meeting store and rebuild the keyword index from it.
    pub fn open(data_dir: &str, admin_token: Option<String>, ask_limit: usize) -> Result<Self> {
        let store = MeetingStore::open(&StorePaths::new(data_dir))?;
        let index = build_index(&store)?;
        tracing::info!(data_dir, meetings = store.len(), "store opened");
        Ok(Self { store, index: Arc::new(index), admin_token, ask_limit, write_lock: Arc::new(Mutex::new(())) })
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/meetings", get(list_meetings).post(create_meeting))
        .route("/meetings/:id", get(get_meeting).put(update_meeting).delete(delete_meeting))
        .route("/search", get(search_handler))
        .route("/search/ids", get(search_ids_handler))
        .route("/ask", post(ask_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %err, "store failure");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn not_found(id: DocId) -> ApiError {
    (StatusCode::NOT_FOUND, format!("meeting {id} not found"))
}

fn validate_datetime(value: &str) -> Result<(), ApiError> {
    parse_datetime(value).map(|_| ()).map_err(|e| (StatusCode::BAD_REQUEST, format!("{e:#}")))
}

pub async fn create_meeting(State(state): State<AppState>, headers: HeaderMap, Json(new): Json<NewMeeting>) -> Result<(StatusCode, Json<Meeting>), ApiError> {
    authorize(&state, &headers)?;
    validate_datetime(&new.datetime)?;
    let meeting = {
        let _guard = state.write_lock.lock();
        let meeting = state.store.create(new).map_err(internal)?;
        state.index.add_document(meeting.id, meeting.raw_notes.clone());
        meeting
    };
    tracing::info!(meeting_id = meeting.id, "meeting created");
    Ok((StatusCode::CREATED, Json(meeting)))
}

pub async fn list_meetings(State(state): State<AppState>, Query(params): Query<ListParams>) -> Result<Json<Vec<Meeting>>, ApiError> {
    let meetings = state.store.list(params.skip, params.limit).map_err(internal)?;
    Ok(Json(meetings))
}

pub async fn get_meeting(State(state): State<AppState>, Path(id): Path<DocId>) -> Result<Json<Meeting>, ApiError> {
    state.store.get(id).map_err(internal)?.map(Json).ok_or_else(|| not_found(id))
}

pub async fn update_meeting(State(state): State<AppState>, Path(id): Path<DocId>, headers: HeaderMap, Json(update): Json<MeetingUpdate>) -> Result<Json<Meeting>, ApiError> {
    authorize(&state, &headers)?;
    if let Some(dt) = &update.datetime {
        validate_datetime(dt)?;
    }
    let meeting = {
        let _guard = state.write_lock.lock();
        let meeting = state.store.update(id, update).map_err(internal)?.ok_or_else(|| not_found(id))?;
        state.index.reindex_document(id, meeting.raw_notes.clone());
        meeting
    };
    tracing::info!(meeting_id = id, "meeting updated");
    Ok(Json(meeting))
}

pub async fn delete_meeting(State(state): State<AppState>, Path(id): Path<DocId>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    {
        let _guard = state.write_lock.lock();
        state.store.delete(id).map_err(internal)?.ok_or_else(|| not_found(id))?;
        state.index.remove_document(id);
    }
    tracing::info!(meeting_id = id, "meeting deleted");
    Ok(Json(serde_json::json!({ "message": "Meeting deleted successfully" })))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let (total_hits, ranked) = state.index.ranked_search_with_total(&params.q, k);

    let terms = unique_tokens(&params.q);
    let mut results = Vec::with_capacity(ranked.len());
    for note in ranked {
        // deleted between the index read and now
        let Some(meeting) = state.store.get(note.doc_id).map_err(internal)? else { continue };
        results.push(SearchHit {
            meeting_id: note.doc_id,
            score: note.score,
            title: meeting.title,
            snippet: snippet(&note.text, &terms),
            notes: note.text,
        });
    }

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn search_ids_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<IdsResponse> {
    let meeting_ids = state.index.search(&params.q).into_iter().collect();
    Json(IdsResponse { query: params.q, meeting_ids })
}

pub async fn ask_handler(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Result<Json<AskResponse>, ApiError> {
    let ranked = state.index.ranked_search(&req.question, state.ask_limit);
    let mut relevant_meetings = Vec::with_capacity(ranked.len());
    for note in ranked {
        if let Some(meeting) = state.store.get(note.doc_id).map_err(internal)? {
            relevant_meetings.push(RelevantMeeting { meeting_id: note.doc_id, title: meeting.title, score: note.score, notes: note.text });
        }
    }
    let message = relevant_meetings.is_empty().then(|| NO_RELEVANT_MEETINGS.to_string());
    tracing::debug!(hits = relevant_meetings.len(), "ask context assembled");
    Ok(Json(AskResponse { question: req.question, message, relevant_meetings }))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse { meetings: state.store.len(), index: state.index.stats() })
}

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

fn snippet(text: &str, terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let Some(pattern) = terms_pattern(terms) else {
        return Some(text.chars().take(SNIPPET_AFTER).collect());
    };
    let window = match pattern.find(text) {
        Some(m) => {
            let start = char_floor(text, m.start().saturating_sub(SNIPPET_BEFORE));
            let end = char_floor(text, (m.start() + SNIPPET_AFTER).min(text.len()));
            &text[start..end]
        }
        None => &text[..char_floor(text, SNIPPET_AFTER.min(text.len()))],
    };
    Some(pattern.replace_all(window, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string())
}

/// Case-insensitive whole-word alternation of the query terms.
fn terms_pattern(terms: &[String]) -> Option<regex::Regex> {
    if terms.is_empty() { return None; }
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    regex::RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(true)
        .build()
        .ok()
}

fn char_floor(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(required) = &state.admin_token else { return Ok(()) };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
