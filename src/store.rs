use crate::models::{Comment, Message, SortOrder, User};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

/// Typed access to the board's tables.
#[derive(Clone)]
pub struct Store {
    db: SqlitePool,
}

impl Store {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    // --- messages ---

    pub async fn create_message(
        &self,
        name: &str,
        content: &str,
        user_id: Option<i64>,
    ) -> Result<Message, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "INSERT INTO messages (name, content, likes, created_at, user_id) VALUES (?, ?, 0, ?, ?)
             RETURNING id, name, content, likes, created_at, user_id",
        )
        .bind(name)
        .bind(content)
        .bind(Utc::now().naive_utc())
        .bind(user_id)
        .fetch_one(&self.db)
        .await
    }

    pub async fn list_messages(&self, order: SortOrder) -> Result<Vec<Message>, sqlx::Error> {
        // The id breaks ties between rows written within the same clock tick.
        let sql = match order {
            SortOrder::Asc => {
                "SELECT id, name, content, likes, created_at, user_id FROM messages ORDER BY created_at ASC, id ASC"
            }
            SortOrder::Desc => {
                "SELECT id, name, content, likes, created_at, user_id FROM messages ORDER BY created_at DESC, id DESC"
            }
        };
        sqlx::query_as::<_, Message>(sql).fetch_all(&self.db).await
    }

    pub async fn get_message(&self, id: i64) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "SELECT id, name, content, likes, created_at, user_id FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
    }

    /// Returns false if no such message exists.
    pub async fn like_message(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE messages SET likes = likes + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_message(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_messages(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM messages").execute(&self.db).await?;
        Ok(result.rows_affected())
    }

    // --- comments ---

    pub async fn create_comment(
        &self,
        message_id: i64,
        name: &str,
        content: &str,
        user_id: Option<i64>,
    ) -> Result<Comment, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (message_id, name, content, created_at, user_id) VALUES (?, ?, ?, ?, ?)
             RETURNING id, message_id, name, content, created_at, user_id",
        )
        .bind(message_id)
        .bind(name)
        .bind(content)
        .bind(Utc::now().naive_utc())
        .bind(user_id)
        .fetch_one(&self.db)
        .await
    }

    /// All comments, oldest first.
    pub async fn list_comments(&self) -> Result<Vec<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "SELECT id, message_id, name, content, created_at, user_id FROM comments
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.db)
        .await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- users & sessions ---

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)
             RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now().naive_utc())
        .fetch_one(&self.db)
        .await
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
    }

    /// Removes the user. Their sessions go with them; their messages and
    /// comments stay, detached.
    pub async fn delete_user(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_session(&self, user_id: i64) -> Result<String, sqlx::Error> {
        let token = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(Utc::now().naive_utc())
            .execute(&self.db)
            .await?;
        Ok(token)
    }

    pub async fn user_for_session(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.password_hash
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_database;

    async fn store() -> Store {
        Store::new(init_database(":memory:").await.unwrap())
    }

    #[tokio::test]
    async fn listing_respects_order() {
        let store = store().await;
        let first = store.create_message("a", "first", None).await.unwrap();
        let second = store.create_message("b", "second", None).await.unwrap();

        let desc = store.list_messages(SortOrder::Desc).await.unwrap();
        assert_eq!(desc.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let asc = store.list_messages(SortOrder::Asc).await.unwrap();
        assert_eq!(asc.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn like_increments_and_reports_missing() {
        let store = store().await;
        let msg = store.create_message("a", "hello", None).await.unwrap();
        assert_eq!(msg.likes, 0);

        assert!(store.like_message(msg.id).await.unwrap());
        assert!(store.like_message(msg.id).await.unwrap());
        assert_eq!(store.get_message(msg.id).await.unwrap().unwrap().likes, 2);

        assert!(!store.like_message(9999).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_message_cascades_to_comments() {
        let store = store().await;
        let msg = store.create_message("a", "hello", None).await.unwrap();
        store.create_comment(msg.id, "b", "reply", None).await.unwrap();
        assert_eq!(store.list_comments().await.unwrap().len(), 1);

        assert!(store.delete_message(msg.id).await.unwrap());
        assert!(store.list_comments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comment_on_missing_message_is_rejected() {
        let store = store().await;
        assert!(store.create_comment(42, "b", "reply", None).await.is_err());
    }

    #[tokio::test]
    async fn deleting_user_detaches_content_and_drops_sessions() {
        let store = store().await;
        let user = store.create_user("alice", "hash").await.unwrap();
        let msg = store.create_message("Alice", "mine", Some(user.id)).await.unwrap();
        let comment = store.create_comment(msg.id, "Alice", "also mine", Some(user.id)).await.unwrap();
        let token = store.create_session(user.id).await.unwrap();

        assert!(store.delete_user(user.id).await.unwrap());

        let msg = store.get_message(msg.id).await.unwrap().unwrap();
        assert_eq!(msg.user_id, None);
        let comments = store.list_comments().await.unwrap();
        assert_eq!(comments[0].id, comment.id);
        assert_eq!(comments[0].user_id, None);
        assert!(store.user_for_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = store().await;
        store.create_user("alice", "hash").await.unwrap();
        let err = store.create_user("alice", "other").await.unwrap_err();
        assert!(err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = store().await;
        store.create_message("a", "1", None).await.unwrap();
        store.create_message("b", "2", None).await.unwrap();
        assert_eq!(store.clear_messages().await.unwrap(), 2);
        assert!(store.list_messages(SortOrder::Desc).await.unwrap().is_empty());
    }
}
