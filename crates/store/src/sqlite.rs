//! SQLite backend with FTS5 full-text search.
//!
//! One database file, WAL journal. The `memories` table carries an FTS5
//! virtual table for ranked keyword search (BM25), kept in sync by
//! triggers. Embeddings are stored as little-endian f32 blobs and ranked
//! in-process; SQLite has no native vector primitive and the per-pair row
//! counts stay small.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use counterforce_core::error::StoreError;
use counterforce_core::memory::{ElectionStatus, MemoryKind, MemoryRecord};
use counterforce_core::persona::{DriftConfig, Persona, SoulDefinition, SoulValidation};
use counterforce_core::relationship::{Relationship, TrustLevel};
use counterforce_core::setting::UserSetting;
use counterforce_core::EntropyState;

use crate::vector::rank_by_similarity;
use crate::PersonaStore;

/// Production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database at `path` and run migrations.
    /// Pass `":memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: &[(&str, &str)] = &[
            (
                "personas table",
                r#"
                CREATE TABLE IF NOT EXISTS personas (
                    id              TEXT PRIMARY KEY,
                    slug            TEXT UNIQUE NOT NULL,
                    name            TEXT NOT NULL,
                    soul_content    TEXT NOT NULL,
                    soul_hash       TEXT NOT NULL,
                    soul_version    INTEGER NOT NULL DEFAULT 1,
                    drift_enabled   INTEGER NOT NULL DEFAULT 1,
                    drift_threshold REAL NOT NULL DEFAULT 0.3
                )
                "#,
            ),
            (
                "soul_validations table",
                r#"
                CREATE TABLE IF NOT EXISTS soul_validations (
                    id          TEXT PRIMARY KEY,
                    persona_id  TEXT NOT NULL,
                    valid       INTEGER NOT NULL,
                    checked_at  TEXT NOT NULL,
                    detail      TEXT
                )
                "#,
            ),
            (
                "relationships table",
                r#"
                CREATE TABLE IF NOT EXISTS relationships (
                    persona_id        TEXT NOT NULL,
                    user_id           TEXT NOT NULL,
                    familiarity       REAL NOT NULL DEFAULT 0.0,
                    trust_level       TEXT NOT NULL DEFAULT 'stranger',
                    interaction_count INTEGER NOT NULL DEFAULT 0,
                    summary           TEXT,
                    preferences       TEXT,
                    created_at        TEXT NOT NULL,
                    updated_at        TEXT NOT NULL,
                    PRIMARY KEY (persona_id, user_id)
                )
                "#,
            ),
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                    id         TEXT UNIQUE NOT NULL,
                    persona_id TEXT NOT NULL,
                    user_id    TEXT NOT NULL,
                    content    TEXT NOT NULL,
                    kind       TEXT NOT NULL,
                    importance REAL NOT NULL DEFAULT 0.0,
                    embedding  BLOB,
                    created_at TEXT NOT NULL,
                    election   TEXT NOT NULL DEFAULT 'elect'
                )
                "#,
            ),
            (
                "memories FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                    content,
                    content='memories',
                    content_rowid='iid',
                    tokenize='porter unicode61'
                )
                "#,
            ),
            (
                "memories insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                    INSERT INTO memories_fts(rowid, content)
                    VALUES (new.iid, new.content);
                END
                "#,
            ),
            (
                "memories delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                    INSERT INTO memories_fts(memories_fts, rowid, content)
                    VALUES ('delete', old.iid, old.content);
                END
                "#,
            ),
            (
                "memories update trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
                    INSERT INTO memories_fts(memories_fts, rowid, content)
                    VALUES ('delete', old.iid, old.content);
                    INSERT INTO memories_fts(rowid, content)
                    VALUES (new.iid, new.content);
                END
                "#,
            ),
            (
                "memories pair index",
                "CREATE INDEX IF NOT EXISTS idx_memories_pair ON memories(persona_id, user_id, created_at DESC)",
            ),
            (
                "entropy_states table",
                r#"
                CREATE TABLE IF NOT EXISTS entropy_states (
                    persona_id TEXT NOT NULL,
                    user_id    TEXT NOT NULL,
                    value      REAL NOT NULL DEFAULT 0.0,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (persona_id, user_id)
                )
                "#,
            ),
            (
                "persona_activity table",
                r#"
                CREATE TABLE IF NOT EXISTS persona_activity (
                    persona_id     TEXT PRIMARY KEY,
                    last_active_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "completed_sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS completed_sessions (
                    session_id   TEXT PRIMARY KEY,
                    completed_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "user_settings table",
                r#"
                CREATE TABLE IF NOT EXISTS user_settings (
                    persona_id   TEXT NOT NULL,
                    user_id      TEXT NOT NULL,
                    meeting_time TEXT,
                    venue        TEXT,
                    atmosphere   TEXT,
                    updated_at   TEXT,
                    PRIMARY KEY (persona_id, user_id)
                )
                "#,
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    // --- Row mapping ---

    fn row_to_persona(row: &sqlx::sqlite::SqliteRow) -> Result<Persona, StoreError> {
        let drift_enabled: i64 = row
            .try_get("drift_enabled")
            .map_err(|e| StoreError::QueryFailed(format!("drift_enabled column: {e}")))?;
        let soul_version: i64 = row
            .try_get("soul_version")
            .map_err(|e| StoreError::QueryFailed(format!("soul_version column: {e}")))?;
        Ok(Persona {
            id: Self::get_text(row, "id")?,
            slug: Self::get_text(row, "slug")?,
            name: Self::get_text(row, "name")?,
            soul: SoulDefinition {
                content: Self::get_text(row, "soul_content")?,
                integrity_hash: Self::get_text(row, "soul_hash")?,
                version: soul_version as u32,
            },
            drift_config: DriftConfig {
                enabled: drift_enabled != 0,
                severity_threshold: row.try_get("drift_threshold").unwrap_or(0.3),
            },
        })
    }

    fn row_to_relationship(row: &sqlx::sqlite::SqliteRow) -> Result<Relationship, StoreError> {
        let trust: String = Self::get_text(row, "trust_level")?;
        let interaction_count: i64 = row
            .try_get("interaction_count")
            .map_err(|e| StoreError::QueryFailed(format!("interaction_count column: {e}")))?;
        Ok(Relationship {
            persona_id: Self::get_text(row, "persona_id")?,
            user_id: Self::get_text(row, "user_id")?,
            familiarity: row.try_get("familiarity").unwrap_or(0.0),
            trust_level: parse_trust(&trust),
            interaction_count: interaction_count.max(0) as u64,
            summary: row.try_get("summary").ok().flatten(),
            preferences: row.try_get("preferences").ok().flatten(),
            created_at: Self::get_datetime(row, "created_at")?,
            updated_at: Self::get_datetime(row, "updated_at")?,
            fallback: false,
        })
    }

    fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryRecord, StoreError> {
        let kind: String = Self::get_text(row, "kind")?;
        let election: String = Self::get_text(row, "election")?;
        let embedding: Option<Vec<u8>> = row.try_get("embedding").ok().flatten();
        Ok(MemoryRecord {
            id: Self::get_text(row, "id")?,
            persona_id: Self::get_text(row, "persona_id")?,
            user_id: Self::get_text(row, "user_id")?,
            content: Self::get_text(row, "content")?,
            kind: parse_kind(&kind),
            importance: row.try_get("importance").unwrap_or(0.0),
            embedding: embedding.map(|blob| blob_to_embedding(&blob)),
            created_at: Self::get_datetime(row, "created_at")?,
            election: parse_election(&election),
            score: 0.0,
        })
    }

    fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, StoreError> {
        row.try_get(column)
            .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
    }

    fn get_datetime(
        row: &sqlx::sqlite::SqliteRow,
        column: &str,
    ) -> Result<DateTime<Utc>, StoreError> {
        let raw: String = Self::get_text(row, column)?;
        Ok(DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()))
    }

    /// Build a safe FTS5 query from search tokens: each token quoted,
    /// prefix-matched, joined with OR.
    fn build_fts_query(tokens: &[String]) -> String {
        tokens
            .iter()
            .filter_map(|t| {
                let clean: String = t
                    .chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if clean.is_empty() {
                    None
                } else {
                    Some(format!("\"{clean}\"*"))
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

fn parse_trust(raw: &str) -> TrustLevel {
    match raw {
        "acquaintance" => TrustLevel::Acquaintance,
        "familiar" => TrustLevel::Familiar,
        "confidant" => TrustLevel::Confidant,
        _ => TrustLevel::Stranger,
    }
}

fn trust_to_str(level: TrustLevel) -> &'static str {
    level.as_str()
}

fn parse_kind(raw: &str) -> MemoryKind {
    match raw {
        "learning" => MemoryKind::Learning,
        "insight" => MemoryKind::Insight,
        _ => MemoryKind::Interaction,
    }
}

fn kind_to_str(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Interaction => "interaction",
        MemoryKind::Learning => "learning",
        MemoryKind::Insight => "insight",
    }
}

fn parse_election(raw: &str) -> ElectionStatus {
    match raw {
        "borderline" => ElectionStatus::Borderline,
        "preterite" => ElectionStatus::Preterite,
        _ => ElectionStatus::Elect,
    }
}

fn election_to_str(election: ElectionStatus) -> &'static str {
    match election {
        ElectionStatus::Elect => "elect",
        ElectionStatus::Borderline => "borderline",
        ElectionStatus::Preterite => "preterite",
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[async_trait]
impl PersonaStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_persona(&self, id: &str) -> Result<Option<Persona>, StoreError> {
        let row = sqlx::query("SELECT * FROM personas WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_persona: {e}")))?;
        row.as_ref().map(Self::row_to_persona).transpose()
    }

    async fn get_persona_by_slug(&self, slug: &str) -> Result<Option<Persona>, StoreError> {
        let row = sqlx::query("SELECT * FROM personas WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_persona_by_slug: {e}")))?;
        row.as_ref().map(Self::row_to_persona).transpose()
    }

    async fn upsert_persona(&self, persona: &Persona) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO personas
                (id, slug, name, soul_content, soul_hash, soul_version, drift_enabled, drift_threshold)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                name = excluded.name,
                soul_content = excluded.soul_content,
                soul_hash = excluded.soul_hash,
                soul_version = excluded.soul_version,
                drift_enabled = excluded.drift_enabled,
                drift_threshold = excluded.drift_threshold
            "#,
        )
        .bind(&persona.id)
        .bind(&persona.slug)
        .bind(&persona.name)
        .bind(&persona.soul.content)
        .bind(&persona.soul.integrity_hash)
        .bind(persona.soul.version as i64)
        .bind(persona.drift_config.enabled as i64)
        .bind(persona.drift_config.severity_threshold)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("upsert_persona: {e}")))?;
        Ok(())
    }

    async fn record_soul_validation(&self, validation: &SoulValidation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO soul_validations (id, persona_id, valid, checked_at, detail) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&validation.persona_id)
        .bind(validation.valid as i64)
        .bind(validation.checked_at.to_rfc3339())
        .bind(&validation.detail)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("record_soul_validation: {e}")))?;
        Ok(())
    }

    async fn get_relationship(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<Relationship>, StoreError> {
        let row = sqlx::query("SELECT * FROM relationships WHERE persona_id = ? AND user_id = ?")
            .bind(persona_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_relationship: {e}")))?;
        row.as_ref().map(Self::row_to_relationship).transpose()
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO relationships
                (persona_id, user_id, familiarity, trust_level, interaction_count,
                 summary, preferences, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(persona_id, user_id) DO UPDATE SET
                familiarity = excluded.familiarity,
                trust_level = excluded.trust_level,
                interaction_count = excluded.interaction_count,
                summary = excluded.summary,
                preferences = excluded.preferences,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relationship.persona_id)
        .bind(&relationship.user_id)
        .bind(relationship.familiarity)
        .bind(trust_to_str(relationship.trust_level))
        .bind(relationship.interaction_count as i64)
        .bind(&relationship.summary)
        .bind(&relationship.preferences)
        .bind(relationship.created_at.to_rfc3339())
        .bind(relationship.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("upsert_relationship: {e}")))?;
        Ok(())
    }

    async fn insert_memory(&self, memory: &MemoryRecord) -> Result<String, StoreError> {
        let id = if memory.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            memory.id.clone()
        };
        let blob = memory.embedding.as_deref().map(embedding_to_blob);
        sqlx::query(
            r#"
            INSERT INTO memories
                (id, persona_id, user_id, content, kind, importance, embedding, created_at, election)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&memory.persona_id)
        .bind(&memory.user_id)
        .bind(&memory.content)
        .bind(kind_to_str(memory.kind))
        .bind(memory.importance)
        .bind(blob)
        .bind(memory.created_at.to_rfc3339())
        .bind(election_to_str(memory.election))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("insert_memory: {e}")))?;
        Ok(id)
    }

    async fn list_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memories
            WHERE persona_id = ? AND user_id = ? AND election != 'preterite'
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(persona_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list_memories: {e}")))?;
        rows.iter().map(Self::row_to_memory).collect()
    }

    async fn keyword_search_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let fts_query = Self::build_fts_query(tokens);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT m.*, bm25(memories_fts) AS rank
            FROM memories_fts
            JOIN memories m ON m.iid = memories_fts.rowid
            WHERE memories_fts MATCH ?
              AND m.persona_id = ? AND m.user_id = ? AND m.election != 'preterite'
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(persona_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("keyword_search_memories: {e}")))?;

        rows.iter()
            .map(|row| {
                let mut memory = Self::row_to_memory(row)?;
                // bm25 returns lower-is-better; flip into a positive score
                let rank: f64 = row.try_get("rank").unwrap_or(0.0);
                memory.score = -rank;
                Ok(memory)
            })
            .collect()
    }

    async fn similarity_search_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memories
            WHERE persona_id = ? AND user_id = ?
              AND election != 'preterite' AND embedding IS NOT NULL
            "#,
        )
        .bind(persona_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("similarity_search_memories: {e}")))?;

        let candidates: Vec<MemoryRecord> = rows
            .iter()
            .map(Self::row_to_memory)
            .collect::<Result<_, _>>()?;
        Ok(rank_by_similarity(&candidates, query_embedding, limit))
    }

    async fn list_preterite_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memories
            WHERE persona_id = ? AND user_id = ? AND election = 'preterite'
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(persona_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list_preterite_memories: {e}")))?;
        rows.iter().map(Self::row_to_memory).collect()
    }

    async fn update_memory_election(
        &self,
        id: &str,
        election: ElectionStatus,
        content: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE memories SET election = ?, content = ? WHERE id = ?")
            .bind(election_to_str(election))
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("update_memory_election: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "memory".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    async fn get_entropy(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<EntropyState>, StoreError> {
        let row = sqlx::query("SELECT * FROM entropy_states WHERE persona_id = ? AND user_id = ?")
            .bind(persona_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_entropy: {e}")))?;
        row.map(|row| {
            Ok(EntropyState {
                persona_id: Self::get_text(&row, "persona_id")?,
                user_id: Self::get_text(&row, "user_id")?,
                value: row.try_get("value").unwrap_or(0.0),
                updated_at: Self::get_datetime(&row, "updated_at")?,
            })
        })
        .transpose()
    }

    async fn upsert_entropy(&self, state: &EntropyState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO entropy_states (persona_id, user_id, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(persona_id, user_id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.persona_id)
        .bind(&state.user_id)
        .bind(state.value)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("upsert_entropy: {e}")))?;
        Ok(())
    }

    async fn get_last_active(&self, persona_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query("SELECT last_active_at FROM persona_activity WHERE persona_id = ?")
            .bind(persona_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_last_active: {e}")))?;
        Ok(row.map(|row| {
            let raw: String = row.try_get("last_active_at").unwrap_or_default();
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        }))
    }

    async fn set_last_active(
        &self,
        persona_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO persona_activity (persona_id, last_active_at)
            VALUES (?, ?)
            ON CONFLICT(persona_id) DO UPDATE SET last_active_at = excluded.last_active_at
            "#,
        )
        .bind(persona_id)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("set_last_active: {e}")))?;
        Ok(())
    }

    async fn session_completed(&self, session_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM completed_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("session_completed: {e}")))?;
        Ok(row.is_some())
    }

    async fn mark_session_completed(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO completed_sessions (session_id, completed_at) VALUES (?, ?)",
        )
        .bind(session_id)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("mark_session_completed: {e}")))?;
        Ok(())
    }

    async fn get_user_setting(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<UserSetting>, StoreError> {
        let row = sqlx::query("SELECT * FROM user_settings WHERE persona_id = ? AND user_id = ?")
            .bind(persona_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_user_setting: {e}")))?;
        row.map(|row| {
            let updated_raw: Option<String> = row.try_get("updated_at").ok().flatten();
            Ok(UserSetting {
                persona_id: Self::get_text(&row, "persona_id")?,
                user_id: Self::get_text(&row, "user_id")?,
                meeting_time: row.try_get("meeting_time").ok().flatten(),
                venue: row.try_get("venue").ok().flatten(),
                atmosphere: row.try_get("atmosphere").ok().flatten(),
                updated_at: updated_raw.and_then(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok()
                }),
            })
        })
        .transpose()
    }

    async fn upsert_user_setting(&self, setting: &UserSetting) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (persona_id, user_id, meeting_time, venue, atmosphere, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(persona_id, user_id) DO UPDATE SET
                meeting_time = excluded.meeting_time,
                venue = excluded.venue,
                atmosphere = excluded.atmosphere,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&setting.persona_id)
        .bind(&setting.user_id)
        .bind(&setting.meeting_time)
        .bind(&setting.venue)
        .bind(&setting.atmosphere)
        .bind(setting.updated_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::InsertFailed(format!("upsert_user_setting: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterforce_core::memory::MemoryKind;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn memory(content: &str, importance: f64, embedding: Option<Vec<f32>>) -> MemoryRecord {
        let mut m = MemoryRecord::new("p1", "u1", content, MemoryKind::Interaction, importance, Utc::now());
        m.embedding = embedding;
        m
    }

    #[tokio::test]
    async fn persona_round_trip() {
        let (store, _dir) = temp_store().await;
        let persona = Persona {
            id: "p1".into(),
            slug: "slothrop".into(),
            name: "Slothrop".into(),
            soul: SoulDefinition {
                content: "## Voice\nparanoid".into(),
                integrity_hash: "abc123".into(),
                version: 2,
            },
            drift_config: DriftConfig {
                enabled: false,
                severity_threshold: 0.4,
            },
        };
        store.upsert_persona(&persona).await.unwrap();

        let by_id = store.get_persona("p1").await.unwrap().unwrap();
        assert_eq!(by_id.slug, "slothrop");
        assert_eq!(by_id.soul.version, 2);
        assert!(!by_id.drift_config.enabled);

        let by_slug = store.get_persona_by_slug("slothrop").await.unwrap().unwrap();
        assert_eq!(by_slug.id, "p1");

        assert!(store.get_persona("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fts_keyword_search() {
        let (store, _dir) = temp_store().await;
        store.insert_memory(&memory("we talked about rockets and the war", 0.5, None)).await.unwrap();
        store.insert_memory(&memory("breakfast was bananas again", 0.5, None)).await.unwrap();

        let results = store
            .keyword_search_memories("p1", "u1", &["rockets".into()], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("rockets"));
    }

    #[tokio::test]
    async fn similarity_search_orders_by_cosine() {
        let (store, _dir) = temp_store().await;
        store.insert_memory(&memory("a", 0.5, Some(vec![1.0, 0.0]))).await.unwrap();
        store.insert_memory(&memory("b", 0.5, Some(vec![0.0, 1.0]))).await.unwrap();
        store.insert_memory(&memory("no embedding", 0.5, None)).await.unwrap();

        let results = store
            .similarity_search_memories("p1", "u1", &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn embedding_blob_survives_round_trip() {
        let (store, _dir) = temp_store().await;
        let embedding = vec![0.25f32, -1.5, 3.75];
        store.insert_memory(&memory("vectorized", 0.5, Some(embedding.clone()))).await.unwrap();

        let listed = store.list_memories("p1", "u1", 10).await.unwrap();
        assert_eq!(listed[0].embedding.as_deref(), Some(embedding.as_slice()));
    }

    #[tokio::test]
    async fn consignment_excludes_from_search_but_lists_preterite() {
        let (store, _dir) = temp_store().await;
        let id = store.insert_memory(&memory("secret rocket plans", 0.9, None)).await.unwrap();
        store
            .update_memory_election(&id, ElectionStatus::Preterite, "secret [...] plans")
            .await
            .unwrap();

        assert!(store
            .keyword_search_memories("p1", "u1", &["secret".into()], 10)
            .await
            .unwrap()
            .is_empty());
        let preterite = store.list_preterite_memories("p1", "u1", 10).await.unwrap();
        assert_eq!(preterite.len(), 1);
        assert_eq!(preterite[0].content, "secret [...] plans");
    }

    #[tokio::test]
    async fn update_missing_memory_is_not_found() {
        let (store, _dir) = temp_store().await;
        let err = store
            .update_memory_election("nope", ElectionStatus::Preterite, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn relationship_upsert_updates_in_place() {
        let (store, _dir) = temp_store().await;
        let now = Utc::now();
        let mut rel = Relationship::stranger("p1", "u1", now);
        store.upsert_relationship(&rel).await.unwrap();

        rel.familiarity = 0.55;
        rel.trust_level = TrustLevel::Familiar;
        rel.interaction_count = 7;
        store.upsert_relationship(&rel).await.unwrap();

        let loaded = store.get_relationship("p1", "u1").await.unwrap().unwrap();
        assert!((loaded.familiarity - 0.55).abs() < 1e-9);
        assert_eq!(loaded.trust_level, TrustLevel::Familiar);
        assert_eq!(loaded.interaction_count, 7);
    }

    #[tokio::test]
    async fn completion_marker_idempotent() {
        let (store, _dir) = temp_store().await;
        assert!(!store.session_completed("s1").await.unwrap());
        store.mark_session_completed("s1", Utc::now()).await.unwrap();
        // Second mark is a no-op, not an error
        store.mark_session_completed("s1", Utc::now()).await.unwrap();
        assert!(store.session_completed("s1").await.unwrap());
    }

    #[tokio::test]
    async fn user_setting_round_trip() {
        let (store, _dir) = temp_store().await;
        assert!(store.get_user_setting("p1", "u1").await.unwrap().is_none());

        let setting = UserSetting {
            meeting_time: Some("dusk".into()),
            venue: None,
            atmosphere: Some("rain".into()),
            updated_at: Some(Utc::now()),
            ..UserSetting::new("p1", "u1")
        };
        store.upsert_user_setting(&setting).await.unwrap();

        let loaded = store.get_user_setting("p1", "u1").await.unwrap().unwrap();
        assert_eq!(loaded.meeting_time.as_deref(), Some("dusk"));
        assert!(loaded.venue.is_none());
        assert_eq!(loaded.atmosphere.as_deref(), Some("rain"));
    }
}
