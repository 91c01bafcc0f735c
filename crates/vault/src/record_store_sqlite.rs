//! SQLite-backed record store using sqlx.

use std::path::Path;

use {
    async_trait::async_trait,
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    },
};

use crate::{
    error::RecordError,
    record::{Record, RecordId, SealedField},
    record_store::RecordStore,
};

const SELECT_COLUMNS: &str =
    "SELECT id, service, username, ciphertext, nonce, tag, cipher_version FROM records";

/// SQLite-backed persistence for encrypted records.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self, RecordError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open (or create) the database file at `path` in WAL mode and run
    /// migrations.
    pub async fn open(path: &Path) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_record(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let version: i64 = row.try_get("cipher_version")?;
    Ok(Record {
        id: RecordId::new(row.try_get::<i64, _>("id")? as u64),
        service: row.try_get("service")?,
        username: row.try_get("username")?,
        sealed: SealedField {
            ciphertext: row.try_get("ciphertext")?,
            nonce: row.try_get("nonce")?,
            tag: row.try_get("tag")?,
        },
        // Out-of-range versions surface as UnsupportedVersion on decrypt.
        cipher_version: u8::try_from(version).unwrap_or(u8::MAX),
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn allocate_id(&self) -> Result<RecordId, RecordError> {
        let next: i64 = sqlx::query_scalar(
            "UPDATE record_sequence SET next_id = next_id + 1 WHERE id = 1 RETURNING next_id - 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(RecordId::new(next as u64))
    }

    async fn insert(&self, record: &Record) -> Result<(), RecordError> {
        let result = sqlx::query(
            "INSERT INTO records (id, service, username, ciphertext, nonce, tag, cipher_version)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.get() as i64)
        .bind(&record.service)
        .bind(&record.username)
        .bind(&record.sealed.ciphertext)
        .bind(&record.sealed.nonce)
        .bind(&record.sealed.tag)
        .bind(i64::from(record.cipher_version))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RecordError::Duplicate(record.id))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &Record) -> Result<(), RecordError> {
        let result = sqlx::query(
            "UPDATE records
             SET service = ?, username = ?, ciphertext = ?, nonce = ?, tag = ?,
                 cipher_version = ?, updated_at = datetime('now')
             WHERE id = ?",
        )
        .bind(&record.service)
        .bind(&record.username)
        .bind(&record.sealed.ciphertext)
        .bind(&record.sealed.nonce)
        .bind(&record.sealed.tag)
        .bind(i64::from(record.cipher_version))
        .bind(record.id.get() as i64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(record.id));
        }
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<(), RecordError> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id.get() as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Record, RecordError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.get() as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RecordError::NotFound(id))?;
        Ok(row_to_record(&row)?)
    }

    async fn list(&self) -> Result<Vec<Record>, RecordError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY seq"))
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    async fn snapshot(&self, dest: &Path) -> Result<(), RecordError> {
        if tokio::fs::try_exists(dest)
            .await
            .map_err(sqlx::Error::Io)?
        {
            return Err(RecordError::Snapshot(format!(
                "{} already exists",
                dest.display()
            )));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        // VACUUM INTO reads inside a single transaction, so the copy reflects
        // one commit boundary.
        sqlx::query("VACUUM INTO ?")
            .bind(dest.display().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
