//! Metadata store: the entity records that name each object and place it in
//! a group. Backed by SQLite.

use crate::models::entity::Entity;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct MetadataRepository {
    pub db: Arc<SqlitePool>,
}

impl MetadataRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema statement by statement.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// All entities, or only those of one group, ordered by id.
    pub async fn find_entities(&self, gnos_id: Option<&str>) -> Result<Vec<Entity>, sqlx::Error> {
        let entities = match gnos_id {
            Some(gnos_id) => {
                sqlx::query_as::<_, Entity>(
                    "SELECT id, gnos_id, file_name, project_code, access
                     FROM entities WHERE gnos_id = ? ORDER BY id",
                )
                .bind(gnos_id)
                .fetch_all(&*self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, Entity>(
                    "SELECT id, gnos_id, file_name, project_code, access
                     FROM entities ORDER BY id",
                )
                .fetch_all(&*self.db)
                .await?
            }
        };
        debug!(gnos_id = ?gnos_id, count = entities.len(), "found entities");
        Ok(entities)
    }
}
