//! Per-user to-do item storage.
//!
//! Every lookup, update and delete is scoped by `user_id` in the SQL itself,
//! so another user's item is indistinguishable from a missing one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::QueryBuilder;
use sqlx::sqlite::{Sqlite, SqlitePool};

const TODO_COLUMNS: &str = "id, user_id, title, description, completed, created_at, updated_at";

#[derive(Clone)]
pub struct TodoStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordering by creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filtering and paging for a todo listing. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct TodoFilter {
    pub page: u32,
    pub limit: u32,
    pub completed: Option<bool>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    pub sort_order: SortOrder,
}

impl Default for TodoFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            completed: None,
            search: None,
            sort_order: SortOrder::Desc,
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TodoChanges {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
}

/// Lowercased copy of a title kept for search. SQLite's LIKE only folds ASCII.
fn fold(title: &str) -> String {
    title.to_lowercase()
}

/// Escape LIKE wildcards so user input matches literally.
fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, user_id: i64, filter: &TodoFilter) {
    builder.push(" WHERE user_id = ").push_bind(user_id);

    if let Some(completed) = filter.completed {
        builder.push(" AND completed = ").push_bind(completed);
    }

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        builder
            .push(" AND title_folded LIKE ")
            .push_bind(like_pattern(&fold(search)))
            .push(" ESCAPE '\\'");
    }
}

impl TodoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<Todo, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as(&format!(
            "INSERT INTO todos (user_id, title, title_folded, description, completed, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?) RETURNING {TODO_COLUMNS}"
        ))
        .bind(user_id)
        .bind(title)
        .bind(fold(title))
        .bind(description)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a todo owned by `user_id`.
    pub async fn get(&self, id: i64, user_id: i64) -> Result<Option<Todo>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List one page of a user's todos along with the total number matching the filter.
    pub async fn list(
        &self,
        user_id: i64,
        filter: &TodoFilter,
    ) -> Result<(Vec<Todo>, i64), sqlx::Error> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM todos");
        push_filters(&mut count, user_id, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let order = filter.sort_order.as_sql();
        let offset = i64::from(filter.page.saturating_sub(1)) * i64::from(filter.limit);

        let mut select = QueryBuilder::new(format!("SELECT {TODO_COLUMNS} FROM todos"));
        push_filters(&mut select, user_id, filter);
        select
            .push(format!(" ORDER BY created_at {order}, id {order}"))
            .push(" LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(offset);

        let todos = select.build_query_as().fetch_all(&self.pool).await?;
        Ok((todos, total))
    }

    /// Apply a partial update to a todo owned by `user_id`.
    pub async fn update(
        &self,
        id: i64,
        user_id: i64,
        changes: &TodoChanges,
    ) -> Result<Option<Todo>, sqlx::Error> {
        sqlx::query_as(&format!(
            "UPDATE todos SET
                title = COALESCE(?, title),
                title_folded = COALESCE(?, title_folded),
                description = CASE WHEN ? THEN ? ELSE description END,
                completed = COALESCE(?, completed),
                updated_at = ?
             WHERE id = ? AND user_id = ?
             RETURNING {TODO_COLUMNS}"
        ))
        .bind(changes.title.as_deref())
        .bind(changes.title.as_deref().map(fold))
        .bind(changes.description.is_some())
        .bind(changes.description.as_ref().and_then(|d| d.as_deref()))
        .bind(changes.completed)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a todo owned by `user_id`, returning the removed row.
    pub async fn delete(&self, id: i64, user_id: i64) -> Result<Option<Todo>, sqlx::Error> {
        sqlx::query_as(&format!(
            "DELETE FROM todos WHERE id = ? AND user_id = ? RETURNING {TODO_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.users().create("a@x.com", "hash").await.unwrap();
        let bob = db.users().create("b@x.com", "hash").await.unwrap();
        (db, alice.id, bob.id)
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("milk"), "%milk%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let (db, alice, _) = setup().await;

        let todo = db.todos().create(alice, "buy milk", None).await.unwrap();
        assert_eq!(todo.title, "buy milk");
        assert_eq!(todo.description, None);
        assert!(!todo.completed);
        assert_eq!(todo.user_id, alice);
    }

    #[tokio::test]
    async fn test_foreign_todo_is_invisible() {
        let (db, alice, bob) = setup().await;
        let todo = db.todos().create(alice, "secret", None).await.unwrap();

        assert!(db.todos().get(todo.id, bob).await.unwrap().is_none());
        let changes = TodoChanges {
            completed: Some(true),
            ..Default::default()
        };
        assert!(db.todos().update(todo.id, bob, &changes).await.unwrap().is_none());
        assert!(db.todos().delete(todo.id, bob).await.unwrap().is_none());

        let still_there = db.todos().get(todo.id, alice).await.unwrap().unwrap();
        assert!(!still_there.completed);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let (db, alice, _) = setup().await;
        let todo = db
            .todos()
            .create(alice, "buy milk", Some("2 litres"))
            .await
            .unwrap();

        let changes = TodoChanges {
            completed: Some(true),
            ..Default::default()
        };
        let updated = db.todos().update(todo.id, alice, &changes).await.unwrap().unwrap();

        assert!(updated.completed);
        assert_eq!(updated.title, "buy milk");
        assert_eq!(updated.description.as_deref(), Some("2 litres"));
        assert!(updated.updated_at >= todo.updated_at);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let (db, alice, bob) = setup().await;
        let todos = db.todos();
        for i in 0..5 {
            let todo = todos.create(alice, &format!("Task {i}"), None).await.unwrap();
            if i % 2 == 0 {
                let done = TodoChanges {
                    completed: Some(true),
                    ..Default::default()
                };
                todos.update(todo.id, alice, &done).await.unwrap();
            }
        }
        todos.create(alice, "Groceries", None).await.unwrap();
        todos.create(bob, "Task for bob", None).await.unwrap();

        let (page, total) = todos.list(alice, &TodoFilter::default()).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 6);
        // Newest first by default.
        assert_eq!(page[0].title, "Groceries");

        let filter = TodoFilter {
            completed: Some(true),
            ..Default::default()
        };
        let (_, total) = todos.list(alice, &filter).await.unwrap();
        assert_eq!(total, 3);

        let filter = TodoFilter {
            search: Some("task".into()),
            sort_order: SortOrder::Asc,
            limit: 2,
            page: 2,
            ..Default::default()
        };
        let (page, total) = todos.list(alice, &filter).await.unwrap();
        assert_eq!(total, 5);
        let titles: Vec<_> = page.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Task 2", "Task 3"]);

        let filter = TodoFilter {
            page: 10,
            ..Default::default()
        };
        let (page, total) = todos.list(alice, &filter).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_clear_description() {
        let (db, alice, _) = setup().await;
        let todo = db
            .todos()
            .create(alice, "buy milk", Some("2 litres"))
            .await
            .unwrap();

        let changes = TodoChanges {
            description: Some(None),
            ..Default::default()
        };
        let updated = db.todos().update(todo.id, alice, &changes).await.unwrap().unwrap();
        assert_eq!(updated.description, None);

        let changes = TodoChanges {
            description: Some(Some("1 litre".into())),
            ..Default::default()
        };
        let updated = db.todos().update(todo.id, alice, &changes).await.unwrap().unwrap();
        assert_eq!(updated.description.as_deref(), Some("1 litre"));
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let (db, alice, _) = setup().await;
        let todo = db.todos().create(alice, "Éclair", None).await.unwrap();
        db.todos().create(alice, "Bread", None).await.unwrap();

        let filter = TodoFilter {
            search: Some("éCLAIR".into()),
            ..Default::default()
        };
        let (page, total) = db.todos().list(alice, &filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].title, "Éclair");

        // Renaming keeps the search column in step.
        let changes = TodoChanges {
            title: Some("ÜBER cake".into()),
            ..Default::default()
        };
        db.todos().update(todo.id, alice, &changes).await.unwrap();
        let filter = TodoFilter {
            search: Some("über".into()),
            ..Default::default()
        };
        let (page, _) = db.todos().list(alice, &filter).await.unwrap();
        assert_eq!(page[0].title, "ÜBER cake");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let (db, alice, _) = setup().await;
        db.todos().create(alice, "100% done", None).await.unwrap();
        db.todos().create(alice, "1000 things", None).await.unwrap();

        let filter = TodoFilter {
            search: Some("0%".into()),
            ..Default::default()
        };
        let (page, total) = db.todos().list(alice, &filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].title, "100% done");
    }

    #[tokio::test]
    async fn test_delete_returns_row() {
        let (db, alice, _) = setup().await;
        let todo = db.todos().create(alice, "buy milk", None).await.unwrap();

        let removed = db.todos().delete(todo.id, alice).await.unwrap().unwrap();
        assert_eq!(removed.id, todo.id);
        assert!(db.todos().get(todo.id, alice).await.unwrap().is_none());
    }
}
