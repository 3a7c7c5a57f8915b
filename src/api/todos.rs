//! To-do item endpoints. Every route requires an access token and only ever
//! touches the caller's own items.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::error::{ApiError, ResultExt};
use super::validate::{ValidatedJson, ValidatedPath, ValidatedQuery};
use crate::auth::AccessAuth;
use crate::db::{Database, SortOrder, TodoChanges, TodoFilter};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::pagination::Paginated;

#[derive(Clone)]
pub struct TodosState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(TodosState);

pub fn router(state: TodosState) -> Router {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/{id}", get(get_todo).patch(update_todo).delete(delete_todo))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
struct CreateTodoRequest {
    #[validate(length(min = 1, max = 255, message = "title must be between 1 and 255 characters"))]
    title: String,
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateTodoRequest {
    #[validate(length(min = 1, max = 255, message = "title must be between 1 and 255 characters"))]
    title: Option<String>,
    /// Absent leaves the description alone, `null` clears it.
    #[serde(default, deserialize_with = "present")]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    description: Option<Option<String>>,
    completed: Option<bool>,
}

/// Marks a field that was present in the body, even as `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ListTodosQuery {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    limit: Option<u32>,
    completed: Option<bool>,
    search: Option<String>,
    sort_order: Option<SortOrder>,
}

impl From<ListTodosQuery> for TodoFilter {
    fn from(query: ListTodosQuery) -> Self {
        let defaults = TodoFilter::default();
        TodoFilter {
            page: query.page.unwrap_or(defaults.page),
            limit: query.limit.unwrap_or(defaults.limit),
            completed: query.completed,
            search: query.search,
            sort_order: query.sort_order.unwrap_or(defaults.sort_order),
        }
    }
}

async fn create_todo(
    State(state): State<TodosState>,
    AccessAuth(user): AccessAuth,
    ValidatedJson(payload): ValidatedJson<CreateTodoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let todo = state
        .db
        .todos()
        .create(user.user_id, &payload.title, payload.description.as_deref())
        .await
        .db_err("Failed to create todo")?;

    info!(user_id = user.user_id, todo_id = todo.id, "Todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn list_todos(
    State(state): State<TodosState>,
    AccessAuth(user): AccessAuth,
    ValidatedQuery(query): ValidatedQuery<ListTodosQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TodoFilter::from(query);

    let (todos, total) = state
        .db
        .todos()
        .list(user.user_id, &filter)
        .await
        .db_err("Failed to list todos")?;

    Ok(Json(Paginated::new(todos, filter.page, filter.limit, total)))
}

async fn get_todo(
    State(state): State<TodosState>,
    AccessAuth(user): AccessAuth,
    ValidatedPath(id): ValidatedPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let todo = state
        .db
        .todos()
        .get(id, user.user_id)
        .await
        .db_err("Failed to get todo")?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    Ok(Json(todo))
}

async fn update_todo(
    State(state): State<TodosState>,
    AccessAuth(user): AccessAuth,
    ValidatedPath(id): ValidatedPath<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateTodoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = TodoChanges {
        title: payload.title,
        description: payload.description,
        completed: payload.completed,
    };

    let todo = state
        .db
        .todos()
        .update(id, user.user_id, &changes)
        .await
        .db_err("Failed to update todo")?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<TodosState>,
    AccessAuth(user): AccessAuth,
    ValidatedPath(id): ValidatedPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let todo = state
        .db
        .todos()
        .delete(id, user.user_id)
        .await
        .db_err("Failed to delete todo")?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    info!(user_id = user.user_id, todo_id = todo.id, "Todo deleted");
    Ok(Json(todo))
}
