//! The HTTP surface (spec §6): a thin `axum` router sitting directly on
//! top of the registry / query engine. Handlers parse query params, call
//! into [`crate::registry::Registry`] / [`crate::query::QueryEngine`], and
//! serialise the result with `serde_json` — this module is ambient wiring,
//! not core logic (spec §1 names the HTTP router an external collaborator).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use axum_extra::extract::Query;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{ArchiveError, QueryError};
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/indexing/list", get(indexing_list))
        .route("/indexing/process", put(indexing_process))
        .route("/indexing/process/all", put(indexing_process_all))
        .route("/archive/tags", get(archive_tags))
        .route("/archive/get/post", get(archive_get_post))
        .route("/archive/get/posts", get(archive_get_posts))
        .route("/archive/load", get(archive_load))
        .route("/archive/load_all", get(archive_load_all))
        .route("/config/", get(config_echo))
        .with_state(AppState { registry })
}

/// Wraps every error this module's handlers can produce, mapping it to the
/// status codes SPEC_FULL assigns (spec §7 table: `UnknownArchive` → 404,
/// `NotAnArchive`/`MissingMember` → 400, store/read failures → 500).
struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError(err)
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        ApiError(QueryError::Archive(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueryError::UnknownArchive(_) => StatusCode::NOT_FOUND,
            QueryError::Archive(ArchiveError::NotAnArchive(_) | ArchiveError::MissingMember { .. }) => {
                StatusCode::BAD_REQUEST
            }
            QueryError::Archive(_) | QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self.0, "request failed");
        (status, self.0.to_string()).into_response()
    }
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
struct NameParam {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    name: String,
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

#[derive(Debug, Deserialize)]
struct PostParams {
    name: String,
    post_id: i64,
}

/// `tags=python&tags=rust` repeated-key query params, parsed by
/// `axum-extra`'s form-aware [`Query`] extractor rather than hand-rolled
/// raw-query splitting.
#[derive(Debug, Deserialize)]
struct PostsQueryParams {
    name: String,
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    tags: Vec<String>,
}

async fn indexing_list(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.registry.discover()?))
}

async fn indexing_process(
    State(state): State<AppState>,
    Query(params): Query<NameParam>,
) -> Result<StatusCode, ApiError> {
    state.registry.process(&params.name).await?;
    Ok(StatusCode::OK)
}

async fn indexing_process_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.registry.process_all().await?;
    Ok(StatusCode::OK)
}

async fn archive_tags(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.registry.get_or_create(&params.name).await?;
    let tags = entry.query_engine.tags_list(params.offset, params.limit).await?;
    Ok(Json(tags))
}

async fn archive_get_post(
    State(state): State<AppState>,
    Query(params): Query<PostParams>,
) -> Result<Response, ApiError> {
    let entry = state.registry.get_or_create(&params.name).await?;
    match entry.query_engine.get_post(params.post_id).await? {
        Some(doc) => Ok(Json(doc).into_response()),
        None => Ok((StatusCode::NOT_FOUND, "post not found").into_response()),
    }
}

async fn archive_get_posts(
    State(state): State<AppState>,
    Query(params): Query<PostsQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.registry.get_or_create(&params.name).await?;
    let posts = entry
        .query_engine
        .query_posts(params.offset, params.limit, &params.tags)
        .await?;
    Ok(Json(posts))
}

async fn archive_load(
    State(state): State<AppState>,
    Query(params): Query<NameParam>,
) -> Result<StatusCode, ApiError> {
    state.registry.get_or_create(&params.name).await?;
    Ok(StatusCode::OK)
}

async fn archive_load_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.registry.load_all().await?;
    Ok(StatusCode::OK)
}

async fn config_echo(State(state): State<AppState>) -> Json<Config> {
    Json(state.registry.config().clone())
}
