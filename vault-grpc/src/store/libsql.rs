use std::ops::Range;
use std::path::Path;

use libsql::{Builder, Connection, Database, Row, params};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use vault_core::{
    ChunkRecord, FileId, FileRecord, ListQuery, MetaEntry, NewFile, Result, Sealed, UserId,
    VaultError,
};

use super::ChunkStore;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    filename      TEXT    NOT NULL,
    mime_type     TEXT    NOT NULL,
    original_size INTEGER NOT NULL,
    description   TEXT    NOT NULL DEFAULT '',
    chunk_size    INTEGER NOT NULL,
    total_chunks  INTEGER NOT NULL,
    is_complete   INTEGER NOT NULL DEFAULT 0,
    is_deleted    INTEGER NOT NULL DEFAULT 0,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER
);

CREATE INDEX IF NOT EXISTS files_by_owner ON files (user_id, is_deleted, is_complete);

CREATE TABLE IF NOT EXISTS file_chunks (
    file_id              INTEGER NOT NULL REFERENCES files (id) ON DELETE CASCADE,
    chunk_index          INTEGER NOT NULL,
    encrypted_data       BLOB    NOT NULL,
    encryption_algorithm TEXT    NOT NULL,
    iv                   BLOB    NOT NULL,
    created_at           INTEGER NOT NULL,
    UNIQUE (file_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS file_meta (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id    INTEGER NOT NULL REFERENCES files (id) ON DELETE CASCADE,
    name       TEXT    NOT NULL,
    value      TEXT    NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

const FILE_COLUMNS: &str = "f.id, f.user_id, f.filename, f.mime_type, f.original_size, \
     f.description, f.chunk_size, f.total_chunks, f.is_complete, f.is_deleted, f.created_at";

const LIST_WHERE: &str = "f.user_id = ?1 AND f.is_deleted = 0 AND f.is_complete = 1 AND (\
     f.filename LIKE ?2 ESCAPE '\\' OR f.description LIKE ?2 ESCAPE '\\' \
     OR f.mime_type LIKE ?2 ESCAPE '\\' \
     OR EXISTS (SELECT 1 FROM file_meta m WHERE m.file_id = f.id \
                AND (m.name LIKE ?2 ESCAPE '\\' OR m.value LIKE ?2 ESCAPE '\\')))";

/// SQLite-backed store (local file or `:memory:`).
///
/// A single connection serialises every statement, so workers never race
/// on SQLite's writer lock.
pub struct LibsqlStore {
    _db: Database,
    conn: Mutex<Connection>,
}

impl LibsqlStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new_local(path.as_ref())
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;
        conn.execute_batch(SCHEMA).await.map_err(db_err)?;
        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::open(":memory:").await
    }

    async fn load_meta(conn: &Connection, file_id: FileId) -> Result<Vec<MetaEntry>> {
        let mut rows = conn
            .query(
                "SELECT id, name, value FROM file_meta WHERE file_id = ?1 ORDER BY created_at, id",
                params![file_id],
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(MetaEntry {
                id: row.get::<i64>(0).map_err(db_err)?,
                name: row.get::<String>(1).map_err(db_err)?,
                value: row.get::<String>(2).map_err(db_err)?,
            });
        }
        Ok(out)
    }
}

fn db_err(e: libsql::Error) -> VaultError {
    VaultError::Persistence(e.to_string())
}

fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn ts(secs: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| VaultError::Persistence(format!("bad timestamp {secs}: {e}")))
}

fn like_pattern(query: &ListQuery) -> String {
    match &query.filter {
        None => "%".to_string(),
        Some(f) => {
            let escaped = f
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        }
    }
}

fn file_from_row(row: &Row) -> Result<FileRecord> {
    let size: i64 = row.get(4).map_err(db_err)?;
    let chunk_size: i64 = row.get(6).map_err(db_err)?;
    let total_chunks: i64 = row.get(7).map_err(db_err)?;
    Ok(FileRecord {
        id: row.get(0).map_err(db_err)?,
        owner_id: UserId(row.get(1).map_err(db_err)?),
        filename: row.get(2).map_err(db_err)?,
        mime_type: row.get(3).map_err(db_err)?,
        original_size: size.max(0) as u64,
        description: row.get(5).map_err(db_err)?,
        chunk_size: chunk_size.max(0) as u32,
        total_chunks: total_chunks.max(0) as u32,
        is_complete: row.get::<i64>(8).map_err(db_err)? != 0,
        is_deleted: row.get::<i64>(9).map_err(db_err)? != 0,
        created_at: ts(row.get(10).map_err(db_err)?)?,
        meta: Vec::new(),
    })
}

impl ChunkStore for LibsqlStore {
    async fn create_file_record(&self, owner: UserId, file: &NewFile) -> Result<FileId> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(db_err)?;
        let created = now_ts();
        let mut rows = tx
            .query(
                "INSERT INTO files (user_id, filename, mime_type, original_size, description, \
                 chunk_size, total_chunks, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING id",
                params![
                    owner.0,
                    file.filename.as_str(),
                    file.mime_type.as_str(),
                    file.original_size as i64,
                    file.description.as_str(),
                    file.chunk_size as i64,
                    file.total_chunks as i64,
                    created
                ],
            )
            .await
            .map_err(db_err)?;
        let id: i64 = match rows.next().await.map_err(db_err)? {
            Some(row) => row.get(0).map_err(db_err)?,
            None => return Err(VaultError::Persistence("insert returned no id".into())),
        };
        drop(rows);
        for (name, value) in &file.meta {
            tx.execute(
                "INSERT INTO file_meta (file_id, name, value, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, name.as_str(), value.as_str(), created],
            )
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(id)
    }

    async fn save_chunk(&self, file_id: FileId, chunk_index: u32, sealed: Sealed) -> Result<()> {
        let conn = self.conn.lock().await;
        let res = conn
            .execute(
                "INSERT INTO file_chunks (file_id, chunk_index, encrypted_data, \
                 encryption_algorithm, iv, created_at) \
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6 \
                 WHERE EXISTS (SELECT 1 FROM files WHERE id = ?1 AND is_deleted = 0)",
                params![
                    file_id,
                    chunk_index as i64,
                    sealed.ciphertext,
                    sealed.algorithm,
                    sealed.iv,
                    now_ts()
                ],
            )
            .await;
        match res {
            Ok(0) => Err(VaultError::NotFound),
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                Err(VaultError::DuplicateChunk {
                    file_id,
                    chunk_index,
                })
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn mark_file_complete(&self, file_id: FileId, total_bytes: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT f.total_chunks, \
                   (SELECT COUNT(*) FROM file_chunks c WHERE c.file_id = f.id), \
                   (SELECT COUNT(*) FROM file_chunks c WHERE c.file_id = f.id \
                      AND c.chunk_index >= 0 AND c.chunk_index < f.total_chunks) \
                 FROM files f WHERE f.id = ?1 AND f.is_deleted = 0",
                params![file_id],
            )
            .await
            .map_err(db_err)?;
        let (total, stored, in_range): (i64, i64, i64) = match rows.next().await.map_err(db_err)? {
            Some(row) => (
                row.get(0).map_err(db_err)?,
                row.get(1).map_err(db_err)?,
                row.get(2).map_err(db_err)?,
            ),
            None => return Err(VaultError::NotFound),
        };
        drop(rows);
        if stored != total || in_range != total {
            return Err(VaultError::Validation(format!(
                "file {file_id} has {stored} of {total} chunks"
            )));
        }
        conn.execute(
            "UPDATE files SET is_complete = 1, original_size = ?2, updated_at = ?3 \
             WHERE id = ?1 AND is_deleted = 0",
            params![file_id, total_bytes as i64, now_ts()],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_file_info(&self, file_id: FileId, owner: UserId) -> Result<FileRecord> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files f \
                     WHERE f.id = ?1 AND f.user_id = ?2 AND f.is_deleted = 0"
                ),
                params![file_id, owner.0],
            )
            .await
            .map_err(db_err)?;
        let mut record = match rows.next().await.map_err(db_err)? {
            Some(row) => file_from_row(&row)?,
            None => return Err(VaultError::NotFound),
        };
        drop(rows);
        record.meta = Self::load_meta(&conn, file_id).await?;
        Ok(record)
    }

    async fn get_chunks_in_range(&self, file_id: FileId, range: Range<u32>) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT chunk_index, encrypted_data, encryption_algorithm, iv, created_at \
                 FROM file_chunks \
                 WHERE file_id = ?1 AND chunk_index >= ?2 AND chunk_index < ?3 \
                 ORDER BY chunk_index",
                params![file_id, range.start as i64, range.end as i64],
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::with_capacity(range.len());
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let index: i64 = row.get(0).map_err(db_err)?;
            out.push(ChunkRecord {
                file_id,
                chunk_index: index as u32,
                encrypted: row.get::<Vec<u8>>(1).map_err(db_err)?,
                algorithm: row.get::<String>(2).map_err(db_err)?,
                iv: row.get::<Vec<u8>>(3).map_err(db_err)?,
                created_at: ts(row.get(4).map_err(db_err)?)?,
            });
        }
        Ok(out)
    }

    async fn delete_file(&self, owner: UserId, file_id: FileId) -> Result<()> {
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(
                "UPDATE files SET is_deleted = 1, updated_at = ?3 \
                 WHERE id = ?1 AND user_id = ?2 AND is_deleted = 0",
                params![file_id, owner.0, now_ts()],
            )
            .await
            .map_err(db_err)?;
        if affected != 1 {
            return Err(VaultError::NotFound);
        }
        Ok(())
    }

    async fn list_files(&self, owner: UserId, query: &ListQuery) -> Result<(Vec<FileRecord>, u64)> {
        let conn = self.conn.lock().await;
        let pattern = like_pattern(query);

        let mut rows = conn
            .query(
                &format!("SELECT COUNT(*) FROM files f WHERE {LIST_WHERE}"),
                params![owner.0, pattern.as_str()],
            )
            .await
            .map_err(db_err)?;
        let total: i64 = match rows.next().await.map_err(db_err)? {
            Some(row) => row.get(0).map_err(db_err)?,
            None => 0,
        };
        drop(rows);

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files f WHERE {LIST_WHERE} \
                     ORDER BY f.created_at DESC, f.id DESC LIMIT ?3 OFFSET ?4"
                ),
                params![
                    owner.0,
                    pattern.as_str(),
                    query.per_page as i64,
                    query.offset() as i64
                ],
            )
            .await
            .map_err(db_err)?;
        let mut files = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            files.push(file_from_row(&row)?);
        }
        Ok((files, total.max(0) as u64))
    }

    async fn purge_file(&self, file_id: FileId) -> Result<()> {
        let conn = self.conn.lock().await;
        // chunk and meta rows go with it (ON DELETE CASCADE)
        let affected = conn
            .execute("DELETE FROM files WHERE id = ?1", params![file_id])
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(VaultError::NotFound);
        }
        Ok(())
    }
}
