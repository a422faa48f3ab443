use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::knowledge::{chunk_text, KnowledgeChunk, KnowledgeFile, DEFAULT_CHUNK_CHARS};

use super::{format_timestamp, parse_column, parse_timestamp, to_u32, KnowledgeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlKnowledgeRepository {
    pool: DbPool,
    chunk_chars: usize,
}

impl SqlKnowledgeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, chunk_chars: DEFAULT_CHUNK_CHARS }
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }
}

#[async_trait]
impl KnowledgeRepository for SqlKnowledgeRepository {
    async fn create_file(
        &self,
        name: &str,
        category: Option<ProductCategory>,
        content: &str,
    ) -> Result<KnowledgeFile, RepositoryError> {
        let chunks = chunk_text(content, self.chunk_chars);
        let file = KnowledgeFile {
            id: format!("KF-{}", uuid::Uuid::new_v4().simple()),
            name: name.trim().to_string(),
            category,
            chunk_count: u32::try_from(chunks.len()).map_err(|_| {
                RepositoryError::Decode(format!("too many chunks: {}", chunks.len()))
            })?,
            created_at: Utc::now(),
        };
        let category = category.map(|category| category.as_str());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO knowledge_files (id, name, category, chunk_count, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.name)
        .bind(category)
        .bind(i64::from(file.chunk_count))
        .bind(format_timestamp(&file.created_at))
        .execute(&mut *tx)
        .await?;

        for (position, content) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO knowledge_chunks (id, file_id, category, position, content) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(format!("KC-{}", uuid::Uuid::new_v4().simple()))
            .bind(&file.id)
            .bind(category)
            .bind(position as i64)
            .bind(content)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(file)
    }

    async fn list_files(&self) -> Result<Vec<KnowledgeFile>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, category, chunk_count, created_at FROM knowledge_files ORDER BY created_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(file_from_row).collect()
    }

    async fn candidate_chunks(
        &self,
        category: ProductCategory,
    ) -> Result<Vec<KnowledgeChunk>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_id, category, position, content
            FROM knowledge_chunks
            WHERE category IS NULL OR category = 'indefinido' OR category = ?
            ORDER BY file_id, position
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }
}

fn optional_category(value: Option<String>) -> Result<Option<ProductCategory>, RepositoryError> {
    value.map(|value| parse_column("category", &value)).transpose()
}

fn file_from_row(row: &SqliteRow) -> Result<KnowledgeFile, RepositoryError> {
    let chunk_count: i64 = row.try_get("chunk_count")?;
    Ok(KnowledgeFile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: optional_category(row.try_get("category")?)?,
        chunk_count: to_u32("chunk_count", chunk_count)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<KnowledgeChunk, RepositoryError> {
    let position: i64 = row.try_get("position")?;
    Ok(KnowledgeChunk {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        category: optional_category(row.try_get("category")?)?,
        position: to_u32("position", position)?,
        content: row.try_get("content")?,
    })
}
