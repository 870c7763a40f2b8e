//! SQLite-backed [`DocumentStore`].

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{RepoDocument, Revision};
use crate::store::{DocumentStore, Upsert};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    revision: String,
    body: String,
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl From<&Database> for SqliteStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<(RepoDocument, Revision)>> {
        let row: Option<DocumentRow> = sqlx::query_as(include_str!("../queries/get_document.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some((RepoDocument::decode(&row.body)?, row.revision.parse::<Revision>()?)))
    }

    #[tracing::instrument(level = "debug", skip(self, document))]
    async fn insert(&self, key: &str, document: &RepoDocument, revision: Option<&Revision>) -> Result<Upsert> {
        let body = document.encode()?;
        let now = UtcDateTime::now().unix_timestamp();
        let (next, result) = match revision {
            None => {
                let next = Revision::first(&body);
                let result = sqlx::query(include_str!("../queries/insert_document.sql"))
                    .bind(key)
                    .bind(next.to_string())
                    .bind(&body)
                    .bind(now)
                    .execute(&self.pool)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                (next, result)
            },
            Some(current) => {
                let next = current.next(&body);
                let result = sqlx::query(include_str!("../queries/update_document.sql"))
                    .bind(key)
                    .bind(next.to_string())
                    .bind(&body)
                    .bind(now)
                    .bind(current.to_string())
                    .execute(&self.pool)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                (next, result)
            },
        };
        if result.rows_affected() == 0 {
            return Ok(Upsert::Conflict);
        }
        Ok(Upsert::Written(next))
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_documents.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("document count"))
    }
}
