//! SQLite-backed vector store using the `sqlite-vec` extension.
//!
//! rig-sqlite manages the `evidence` table and its `evidence_embeddings`
//! side table; queries that rig-sqlite does not expose (per-case cosine
//! search, deletion, counting) go through a cloned raw connection.

use rig::OneOrMany;
use rig::embeddings::{Embedding, EmbeddingModel};
use rig_sqlite::{Column, ColumnValue, SqliteVectorStore, SqliteVectorStoreTable};
use serde::{Deserialize, Serialize};
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;
use tokio_rusqlite::{Connection, ffi};

use async_trait::async_trait;

use crate::paths::CaseId;
use crate::store::VectorBackend;
use crate::types::{ChunkProvenance, CoreError, EvidenceChunk};

/// Row shape persisted for each chunk. Provenance is carried as a JSON
/// column so the table schema stays stable as provenance grows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub id: String,
    pub case_id: String,
    pub file_name: String,
    pub content: String,
    pub provenance: serde_json::Value,
}

impl SqliteVectorStoreTable for EvidenceRow {
    fn name() -> &'static str {
        "evidence"
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("case_id", "TEXT").indexed(),
            Column::new("file_name", "TEXT"),
            Column::new("provenance", "TEXT"),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("case_id", Box::new(self.case_id.clone())),
            ("file_name", Box::new(self.file_name.clone())),
            ("provenance", Box::new(self.provenance.to_string())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

/// Maps a case id onto a store namespace: alphanumerics kept, everything
/// else replaced with `_`, prefixed and truncated to 63 chars.
pub fn case_namespace(case: &CaseId) -> String {
    let safe: String = case
        .as_str()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let mut name = format!("case_{safe}");
    name.truncate(63);
    name
}

/// Persistent evidence vector store. The embedding model parameter only
/// sizes the embeddings table; query vectors are supplied by callers.
#[derive(Clone)]
pub struct SqliteEvidenceStore<E>
where
    E: EmbeddingModel + 'static,
{
    inner: SqliteVectorStore<E, EvidenceRow>,
    /// Cloned connection for direct SQL not covered by rig-sqlite.
    conn: Connection,
}

impl<E> SqliteEvidenceStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    pub async fn open(path: impl AsRef<Path>, model: &E) -> Result<Self, CoreError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(tokio_rusqlite::Error::Rusqlite(err)),
            }
        })
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;
        let conn_for_queries = conn.clone();
        let store = SqliteVectorStore::new(conn, model)
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        Ok(Self {
            inner: store,
            conn: conn_for_queries,
        })
    }

    fn register_sqlite_vec() -> Result<(), CoreError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(CoreError::Storage)
    }
}

#[async_trait]
impl<E> VectorBackend for SqliteEvidenceStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    async fn add_chunks(
        &self,
        case: &CaseId,
        chunks: Vec<(EvidenceChunk, Vec<f32>)>,
    ) -> Result<(), CoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let namespace = case_namespace(case);
        let mut rows = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks {
            let provenance = serde_json::to_value(&chunk.provenance)?;
            let row = EvidenceRow {
                id: chunk.provenance.chunk_id.clone(),
                case_id: namespace.clone(),
                file_name: chunk.provenance.file_name.clone(),
                content: chunk.text.clone(),
                provenance,
            };
            let converted: Vec<f64> = embedding.into_iter().map(|value| value as f64).collect();
            let embed = Embedding {
                document: chunk.text,
                vec: converted,
            };
            rows.push((row, OneOrMany::one(embed)));
        }
        self.inner
            .add_rows(rows)
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        Ok(())
    }

    async fn delete_chunks(
        &self,
        case: &CaseId,
        chunk_ids: &[String],
    ) -> Result<usize, CoreError> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let namespace = case_namespace(case);
        let ids: Vec<String> = chunk_ids.to_vec();

        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut deleted = 0usize;
                for id in &ids {
                    deleted += tx
                        .execute(
                            "DELETE FROM evidence WHERE id = ? AND case_id = ?",
                            [id.as_str(), namespace.as_str()],
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute("DELETE FROM evidence_embeddings WHERE id = ?", [id.as_str()])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(deleted)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn query(
        &self,
        case: &CaseId,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(EvidenceChunk, f32)>, CoreError> {
        let namespace = case_namespace(case);
        let embedding_json =
            serde_json::to_string(embedding).map_err(|err| CoreError::Storage(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.id as id, c.file_name as file_name, c.content as content, \
                         c.provenance as provenance, \
                         vec_distance_cosine(e.embedding, vec_f32(?)) as distance \
                         FROM evidence c \
                         JOIN evidence_embeddings e ON c.id = e.id \
                         WHERE c.case_id = ? \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([embedding_json.as_str(), namespace.as_str()], |row| {
                        let id: String = row.get(0)?;
                        let file_name: String = row.get(1)?;
                        let content: String = row.get(2)?;
                        let provenance_raw: String = row.get(3)?;
                        let distance: f32 = row.get(4)?;
                        let provenance: ChunkProvenance = serde_json::from_str(&provenance_raw)
                            .unwrap_or(ChunkProvenance {
                                chunk_id: id,
                                file_name,
                                page_num: None,
                                para_idx: None,
                                char_start: 0,
                                char_end: 0,
                                ocr: false,
                            });
                        Ok((
                            EvidenceChunk {
                                text: content,
                                provenance,
                            },
                            distance,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn count(&self, case: &CaseId) -> Result<usize, CoreError> {
        let namespace = case_namespace(case);
        self.conn
            .call(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM evidence WHERE case_id = ?",
                        [namespace.as_str()],
                        |row| row.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn drop_case(&self, case: &CaseId) -> Result<(), CoreError> {
        let namespace = case_namespace(case);
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "DELETE FROM evidence_embeddings WHERE id IN \
                     (SELECT id FROM evidence WHERE case_id = ?)",
                    [namespace.as_str()],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "DELETE FROM evidence WHERE case_id = ?",
                    [namespace.as_str()],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }
}
