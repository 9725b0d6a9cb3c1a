//! Database operations for the project-scoped file upload surface.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DbError, DbResult};

use super::models::ProjectFileRow;

pub async fn prepare(pool: &PgPool, project_id: &str, object_key: &str, filename: &str) -> DbResult<ProjectFileRow> {
    let row = sqlx::query_as::<_, ProjectFileRow>(
        r#"
        INSERT INTO project_files (project_id, object_key, filename, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'pending', $4, $4)
        RETURNING id, project_id, object_key, filename, content_type, size_bytes, status, created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(object_key)
    .bind(filename)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("project_file", object_key);
            }
        }
        DbError::from(e)
    })?;

    Ok(row)
}

pub async fn mark_uploaded(pool: &PgPool, id: Uuid, content_type: Option<&str>, size_bytes: i64) -> DbResult<ProjectFileRow> {
    sqlx::query_as::<_, ProjectFileRow>(
        r#"
        UPDATE project_files
        SET status = 'uploaded', content_type = $2, size_bytes = $3, updated_at = $4
        WHERE id = $1
        RETURNING id, project_id, object_key, filename, content_type, size_bytes, status, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(content_type)
    .bind(size_bytes)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("project_file", &id.to_string()))
}

pub async fn register(pool: &PgPool, id: Uuid) -> DbResult<ProjectFileRow> {
    sqlx::query_as::<_, ProjectFileRow>(
        r#"
        UPDATE project_files SET status = 'registered', updated_at = $2
        WHERE id = $1 RETURNING id, project_id, object_key, filename, content_type, size_bytes, status, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("project_file", &id.to_string()))
}

pub async fn get(pool: &PgPool, project_id: &str, id: Uuid) -> DbResult<ProjectFileRow> {
    sqlx::query_as::<_, ProjectFileRow>(
        r#"
        SELECT id, project_id, object_key, filename, content_type, size_bytes, status, created_at, updated_at
        FROM project_files WHERE project_id = $1 AND id = $2
        "#,
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("project_file", &id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_is_project_scoped() {
        let key = format!("projects/{}/files/{}", "proj1", Uuid::new_v4());
        assert!(key.starts_with("projects/proj1/files/"));
    }
}
