use async_trait::async_trait;
use chrono::Utc;
use course_core::model::{CompletionSet, CourseId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, lesson_key_from_str, ser};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn read_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CompletionSet>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let course = id_i64("course_id", course_id.value())?;

        let rows = sqlx::query(
            r"
                SELECT lesson_key
                FROM lesson_completions
                WHERE user_id = ?1 AND course_id = ?2
                ORDER BY lesson_key
            ",
        )
        .bind(user)
        .bind(course)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut set = CompletionSet::new();
        for row in rows {
            let raw: String = row.try_get("lesson_key").map_err(ser)?;
            match lesson_key_from_str(&raw) {
                Some(key) => {
                    set.insert(key);
                }
                None => tracing::warn!(
                    user_id = %user_id,
                    course_id = %course_id,
                    lesson_key = %raw,
                    "skipping unparsable persisted lesson key"
                ),
            }
        }
        Ok(Some(set))
    }

    async fn save_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        set: &CompletionSet,
    ) -> Result<(), StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let course = id_i64("course_id", course_id.value())?;
        let recorded_at = Utc::now();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Rewrites the whole scope; pruned keys must disappear from disk.
        sqlx::query("DELETE FROM lesson_completions WHERE user_id = ?1 AND course_id = ?2")
            .bind(user)
            .bind(course)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for key in set.iter() {
            sqlx::query(
                r"
                    INSERT INTO lesson_completions (user_id, course_id, lesson_key, recorded_at)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(user)
            .bind(course)
            .bind(key.to_string())
            .bind(recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
