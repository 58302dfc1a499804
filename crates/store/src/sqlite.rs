#![forbid(unsafe_code)]

//! Local SQLite implementation of [`CanvasPersistence`].

use crate::backend::{CanvasPersistence, SimilarIdea, default_edge_types};
use crate::error::PersistError;
use async_trait::async_trait;
use bdc_core::geometry::Viewport;
use bdc_core::ids::{BrainDumpId, EdgeId, EdgeTypeId, IdeaId};
use bdc_core::model::{
    BrainDump, Edge, EdgeDraft, EdgePatch, EdgeType, Idea, IdeaDraft, IdeaPatch, IdeaState,
    Metadata, now_ms,
};
use bdc_core::similarity::rank_similar;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_VERSION: &str = "1";

const IDEA_COLUMNS: &str = "id, brain_dump_id, text, summary, position_x, position_y, width, height, \
     state, session_id, embedding_json, metadata_json, created_at_ms, updated_at_ms";

const EDGE_COLUMNS: &str =
    "id, brain_dump_id, parent_id, child_id, type, note, created_at_ms, updated_at_ms";

#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    storage_dir: Option<PathBuf>,
}

impl SqliteBackend {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join("canvas.db"))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn, Some(storage_dir))
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, storage_dir: Option<PathBuf>) -> Result<Self, PersistError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        install_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    pub fn create_brain_dump(&self, name: &str) -> Result<BrainDump, PersistError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PersistError::Rejected("brain dump name must not be empty".to_string()));
        }
        let id = new_id::<BrainDumpId>("bd")?;
        let viewport = Viewport::default();
        let now_ms = now_ms();
        self.conn.lock().execute(
            "INSERT INTO brain_dumps(id, name, viewport_x, viewport_y, viewport_zoom, archived_at_ms, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
            params![id.as_str(), name, viewport.x, viewport.y, viewport.zoom, now_ms],
        )?;
        Ok(BrainDump {
            id,
            name: name.to_string(),
            viewport,
            archived_at_ms: None,
            idea_count: 0,
            edge_count: 0,
        })
    }

    pub fn archive_brain_dump(&self, id: &BrainDumpId) -> Result<(), PersistError> {
        let changed = self.conn.lock().execute(
            "UPDATE brain_dumps SET archived_at_ms=?2, updated_at_ms=?2 WHERE id=?1 AND archived_at_ms IS NULL",
            params![id.as_str(), now_ms()],
        )?;
        if changed == 0 {
            return Err(PersistError::NotFound(format!("brain dump {id}")));
        }
        Ok(())
    }

    pub fn save_viewport(&self, id: &BrainDumpId, viewport: Viewport) -> Result<(), PersistError> {
        let changed = self.conn.lock().execute(
            "UPDATE brain_dumps SET viewport_x=?2, viewport_y=?3, viewport_zoom=?4, updated_at_ms=?5 WHERE id=?1",
            params![id.as_str(), viewport.x, viewport.y, viewport.zoom, now_ms()],
        )?;
        if changed == 0 {
            return Err(PersistError::NotFound(format!("brain dump {id}")));
        }
        Ok(())
    }
}

fn install_schema(conn: &Connection) -> Result<(), PersistError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS brain_dumps (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          viewport_x REAL NOT NULL DEFAULT 0,
          viewport_y REAL NOT NULL DEFAULT 0,
          viewport_zoom REAL NOT NULL DEFAULT 1,
          archived_at_ms INTEGER,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ideas (
          id TEXT PRIMARY KEY,
          brain_dump_id TEXT NOT NULL,
          text TEXT NOT NULL,
          summary TEXT,
          position_x REAL NOT NULL,
          position_y REAL NOT NULL,
          width REAL NOT NULL CHECK(width > 0),
          height REAL NOT NULL CHECK(height > 0),
          state TEXT NOT NULL,
          session_id TEXT,
          embedding_json TEXT,
          metadata_json TEXT NOT NULL DEFAULT '{}',
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(brain_dump_id) REFERENCES brain_dumps(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS edges (
          id TEXT PRIMARY KEY,
          brain_dump_id TEXT NOT NULL,
          parent_id TEXT NOT NULL,
          child_id TEXT NOT NULL,
          type TEXT NOT NULL,
          note TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          CHECK(parent_id <> child_id),
          UNIQUE(parent_id, child_id),
          FOREIGN KEY(brain_dump_id) REFERENCES brain_dumps(id) ON DELETE CASCADE,
          FOREIGN KEY(parent_id) REFERENCES ideas(id) ON DELETE CASCADE,
          FOREIGN KEY(child_id) REFERENCES ideas(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS edge_types (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          is_default INTEGER NOT NULL DEFAULT 0,
          prevents_cycles INTEGER,
          allows_bidirectional INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_ideas_brain_dump ON ideas(brain_dump_id);
        CREATE INDEX IF NOT EXISTS idx_edges_brain_dump ON edges(brain_dump_id);
        "#,
    )?;

    let seeded: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if seeded.is_none() {
        for edge_type in default_edge_types() {
            conn.execute(
                "INSERT OR IGNORE INTO edge_types(id, name, is_default, prevents_cycles, allows_bidirectional) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge_type.id.as_str(),
                    edge_type.name,
                    edge_type.is_default,
                    edge_type.prevents_cycles,
                    edge_type.allows_bidirectional,
                ],
            )?;
        }
        conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
            params!["schema_version", SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

fn new_id<T: TryFrom<String, Error = bdc_core::ids::IdError>>(prefix: &str) -> Result<T, PersistError> {
    T::try_from(format!("{prefix}-{}", uuid::Uuid::new_v4()))
        .map_err(|err| PersistError::Rejected(err.message().to_string()))
}

fn parse_id<T: TryFrom<String, Error = bdc_core::ids::IdError>>(raw: String) -> Result<T, PersistError> {
    T::try_from(raw).map_err(|err| PersistError::Corrupt(err.message().to_string()))
}

/// Raw column values; conversion happens outside the rusqlite row callback so corrupt data
/// surfaces as `PersistError::Corrupt` rather than a SQL error.
struct IdeaRow {
    id: String,
    brain_dump_id: String,
    text: String,
    summary: Option<String>,
    position_x: f64,
    position_y: f64,
    width: f64,
    height: f64,
    state: String,
    session_id: Option<String>,
    embedding_json: Option<String>,
    metadata_json: String,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl IdeaRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            brain_dump_id: row.get(1)?,
            text: row.get(2)?,
            summary: row.get(3)?,
            position_x: row.get(4)?,
            position_y: row.get(5)?,
            width: row.get(6)?,
            height: row.get(7)?,
            state: row.get(8)?,
            session_id: row.get(9)?,
            embedding_json: row.get(10)?,
            metadata_json: row.get(11)?,
            created_at_ms: row.get(12)?,
            updated_at_ms: row.get(13)?,
        })
    }

    fn into_idea(self) -> Result<Idea, PersistError> {
        let state = IdeaState::parse(&self.state)
            .ok_or_else(|| PersistError::Corrupt(format!("idea state {:?}", self.state)))?;
        let embedding = self
            .embedding_json
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()
            .map_err(|err| PersistError::Corrupt(format!("embedding: {err}")))?;
        let metadata = serde_json::from_str::<Metadata>(&self.metadata_json)
            .map_err(|err| PersistError::Corrupt(format!("metadata: {err}")))?;
        Ok(Idea {
            id: parse_id(self.id)?,
            brain_dump_id: parse_id(self.brain_dump_id)?,
            text: self.text,
            summary: self.summary,
            position_x: self.position_x,
            position_y: self.position_y,
            width: self.width,
            height: self.height,
            state,
            session_id: self.session_id,
            embedding,
            metadata,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

struct EdgeRow {
    id: String,
    brain_dump_id: String,
    parent_id: String,
    child_id: String,
    edge_type: String,
    note: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl EdgeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            brain_dump_id: row.get(1)?,
            parent_id: row.get(2)?,
            child_id: row.get(3)?,
            edge_type: row.get(4)?,
            note: row.get(5)?,
            created_at_ms: row.get(6)?,
            updated_at_ms: row.get(7)?,
        })
    }

    fn into_edge(self) -> Result<Edge, PersistError> {
        Ok(Edge {
            id: parse_id(self.id)?,
            brain_dump_id: parse_id(self.brain_dump_id)?,
            parent_id: parse_id(self.parent_id)?,
            child_id: parse_id(self.child_id)?,
            edge_type: self.edge_type,
            note: self.note,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, PersistError> {
    serde_json::to_string(value).map_err(|err| PersistError::Rejected(err.to_string()))
}

fn ensure_live_canvas_tx(tx: &Transaction<'_>, id: &BrainDumpId) -> Result<(), PersistError> {
    let live: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM brain_dumps WHERE id=?1 AND archived_at_ms IS NULL",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match live {
        Some(_) => Ok(()),
        None => Err(PersistError::NotFound(format!("brain dump {id}"))),
    }
}

fn idea_tx(tx: &Transaction<'_>, id: &IdeaId) -> Result<Option<Idea>, PersistError> {
    let row = tx
        .query_row(
            &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id=?1"),
            params![id.as_str()],
            IdeaRow::read,
        )
        .optional()?;
    row.map(IdeaRow::into_idea).transpose()
}

fn edge_tx(tx: &Transaction<'_>, id: &EdgeId) -> Result<Option<Edge>, PersistError> {
    let row = tx
        .query_row(
            &format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id=?1"),
            params![id.as_str()],
            EdgeRow::read,
        )
        .optional()?;
    row.map(EdgeRow::into_edge).transpose()
}

fn write_idea_tx(tx: &Transaction<'_>, idea: &Idea, insert: bool) -> Result<(), PersistError> {
    let embedding_json = idea.embedding.as_ref().map(to_json).transpose()?;
    let metadata_json = to_json(&idea.metadata)?;
    let sql = if insert {
        format!(
            "INSERT INTO ideas({IDEA_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        )
    } else {
        "UPDATE ideas SET brain_dump_id=?2, text=?3, summary=?4, position_x=?5, position_y=?6, width=?7, height=?8, \
         state=?9, session_id=?10, embedding_json=?11, metadata_json=?12, created_at_ms=?13, updated_at_ms=?14 WHERE id=?1"
            .to_string()
    };
    tx.execute(
        &sql,
        params![
            idea.id.as_str(),
            idea.brain_dump_id.as_str(),
            idea.text,
            idea.summary,
            idea.position_x,
            idea.position_y,
            idea.width,
            idea.height,
            idea.state.as_str(),
            idea.session_id,
            embedding_json,
            metadata_json,
            idea.created_at_ms,
            idea.updated_at_ms,
        ],
    )
    .map_err(map_constraint)?;
    Ok(())
}

fn map_constraint(err: rusqlite::Error) -> PersistError {
    match &err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            PersistError::Conflict(message.clone().unwrap_or_else(|| "constraint violation".to_string()))
        }
        _ => PersistError::Sql(err),
    }
}

#[async_trait]
impl CanvasPersistence for SqliteBackend {
    async fn create_idea(&self, draft: IdeaDraft) -> Result<Idea, PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_live_canvas_tx(&tx, &draft.brain_dump_id)?;
        let id = match draft.id.clone() {
            Some(id) => id,
            None => new_id::<IdeaId>("idea")?,
        };
        let idea = draft.into_idea(id, now_ms());
        write_idea_tx(&tx, &idea, true)?;
        tx.commit()?;
        Ok(idea)
    }

    async fn update_idea(&self, id: &IdeaId, patch: &IdeaPatch) -> Result<(), PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut idea =
            idea_tx(&tx, id)?.ok_or_else(|| PersistError::NotFound(format!("idea {id}")))?;
        patch.apply_to(&mut idea);
        idea.updated_at_ms = now_ms();
        write_idea_tx(&tx, &idea, false)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_idea(&self, id: &IdeaId) -> Result<(), PersistError> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM ideas WHERE id=?1", params![id.as_str()])?;
        if changed == 0 {
            return Err(PersistError::NotFound(format!("idea {id}")));
        }
        Ok(())
    }

    async fn create_edge(&self, draft: EdgeDraft) -> Result<Edge, PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_live_canvas_tx(&tx, &draft.brain_dump_id)?;
        for endpoint in [&draft.parent_id, &draft.child_id] {
            let idea = idea_tx(&tx, endpoint)?
                .ok_or_else(|| PersistError::NotFound(format!("idea {endpoint}")))?;
            if idea.brain_dump_id != draft.brain_dump_id {
                return Err(PersistError::Rejected(format!(
                    "idea {endpoint} belongs to another brain dump"
                )));
            }
        }
        let id = match draft.id.clone() {
            Some(id) => id,
            None => new_id::<EdgeId>("edge")?,
        };
        let edge = draft.into_edge(id, now_ms());
        tx.execute(
            &format!("INSERT INTO edges({EDGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                edge.id.as_str(),
                edge.brain_dump_id.as_str(),
                edge.parent_id.as_str(),
                edge.child_id.as_str(),
                edge.edge_type,
                edge.note,
                edge.created_at_ms,
                edge.updated_at_ms,
            ],
        )
        .map_err(map_constraint)?;
        tx.commit()?;
        Ok(edge)
    }

    async fn update_edge(&self, id: &EdgeId, patch: &EdgePatch) -> Result<(), PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut edge =
            edge_tx(&tx, id)?.ok_or_else(|| PersistError::NotFound(format!("edge {id}")))?;
        patch.apply_to(&mut edge);
        tx.execute(
            "UPDATE edges SET type=?2, note=?3, updated_at_ms=?4 WHERE id=?1",
            params![edge.id.as_str(), edge.edge_type, edge.note, now_ms()],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_edge(&self, id: &EdgeId) -> Result<(), PersistError> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM edges WHERE id=?1", params![id.as_str()])?;
        if changed == 0 {
            return Err(PersistError::NotFound(format!("edge {id}")));
        }
        Ok(())
    }

    async fn fetch_brain_dump(&self, id: &BrainDumpId) -> Result<BrainDump, PersistError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                r#"
                SELECT b.id, b.name, b.viewport_x, b.viewport_y, b.viewport_zoom, b.archived_at_ms,
                  (SELECT COUNT(*) FROM ideas i WHERE i.brain_dump_id = b.id),
                  (SELECT COUNT(*) FROM edges e WHERE e.brain_dump_id = b.id)
                FROM brain_dumps b
                WHERE b.id=?1 AND b.archived_at_ms IS NULL
                "#,
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| PersistError::NotFound(format!("brain dump {id}")))?;
        let (raw_id, name, x, y, zoom, archived_at_ms, ideas, edges) = row;
        Ok(BrainDump {
            id: parse_id(raw_id)?,
            name,
            viewport: Viewport {
                x,
                y,
                zoom,
                ..Viewport::default()
            },
            archived_at_ms,
            idea_count: usize::try_from(ideas).unwrap_or(0),
            edge_count: usize::try_from(edges).unwrap_or(0),
        })
    }

    async fn fetch_ideas(&self, canvas: &BrainDumpId) -> Result<Vec<Idea>, PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_live_canvas_tx(&tx, canvas)?;
        let rows = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {IDEA_COLUMNS} FROM ideas WHERE brain_dump_id=?1 ORDER BY created_at_ms, id"
            ))?;
            let rows = stmt.query_map(params![canvas.as_str()], IdeaRow::read)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        rows.into_iter().map(IdeaRow::into_idea).collect()
    }

    async fn fetch_edges(&self, canvas: &BrainDumpId) -> Result<Vec<Edge>, PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_live_canvas_tx(&tx, canvas)?;
        let rows = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {EDGE_COLUMNS} FROM edges WHERE brain_dump_id=?1 ORDER BY created_at_ms, id"
            ))?;
            let rows = stmt.query_map(params![canvas.as_str()], EdgeRow::read)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    async fn fetch_edge_types(&self) -> Result<Vec<EdgeType>, PersistError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, is_default, prevents_cycles, allows_bidirectional FROM edge_types ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<bool>>(3)?,
                row.get::<_, Option<bool>>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, name, is_default, prevents_cycles, allows_bidirectional) = row?;
            out.push(EdgeType {
                id: parse_id::<EdgeTypeId>(id)?,
                name,
                is_default,
                prevents_cycles,
                allows_bidirectional,
            });
        }
        Ok(out)
    }

    async fn find_similar(
        &self,
        canvas: &BrainDumpId,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarIdea>, PersistError> {
        let candidates = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, embedding_json FROM ideas WHERE brain_dump_id=?1 AND embedding_json IS NOT NULL ORDER BY id",
            )?;
            let rows = stmt.query_map(params![canvas.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (id, raw) = row?;
                let vector = serde_json::from_str::<Vec<f32>>(&raw)
                    .map_err(|err| PersistError::Corrupt(format!("embedding: {err}")))?;
                out.push((parse_id::<IdeaId>(id)?, vector));
            }
            out
        };
        Ok(rank_similar(
            embedding,
            candidates.iter().map(|(id, vector)| (id.clone(), vector.as_slice())),
            limit,
            threshold,
        )
        .into_iter()
        .map(|(idea_id, score)| SimilarIdea { idea_id, score })
        .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdc_core::model::Metadata;

    fn draft(canvas: &BrainDumpId, text: &str) -> IdeaDraft {
        IdeaDraft {
            id: None,
            brain_dump_id: canvas.clone(),
            text: text.to_string(),
            summary: None,
            position_x: 1.0,
            position_y: 2.0,
            width: 100.0,
            height: 50.0,
            state: IdeaState::Ready,
            session_id: None,
            embedding: Some(vec![1.0, 0.0]),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn ideas_round_trip_and_cascade() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let canvas = backend.create_brain_dump("Board").expect("brain dump");

        let a = backend.create_idea(draft(&canvas.id, "a")).await.expect("a");
        let b = backend.create_idea(draft(&canvas.id, "b")).await.expect("b");
        let edge = backend
            .create_edge(EdgeDraft {
                id: None,
                brain_dump_id: canvas.id.clone(),
                parent_id: a.id.clone(),
                child_id: b.id.clone(),
                edge_type: "related_to".to_string(),
                note: None,
            })
            .await
            .expect("edge");

        let fetched = backend.fetch_ideas(&canvas.id).await.expect("ideas");
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched.iter().find(|i| i.id == a.id), Some(&a));

        let counts = backend.fetch_brain_dump(&canvas.id).await.expect("canvas");
        assert_eq!((counts.idea_count, counts.edge_count), (2, 1));

        backend.delete_idea(&a.id).await.expect("delete");
        assert!(backend.fetch_edges(&canvas.id).await.expect("edges").is_empty());
        assert!(matches!(
            backend.delete_edge(&edge.id).await,
            Err(PersistError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_pairs_are_conflicts() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let canvas = backend.create_brain_dump("Board").expect("brain dump");
        let a = backend.create_idea(draft(&canvas.id, "a")).await.expect("a");
        let b = backend.create_idea(draft(&canvas.id, "b")).await.expect("b");
        let edge = EdgeDraft {
            id: None,
            brain_dump_id: canvas.id.clone(),
            parent_id: a.id.clone(),
            child_id: b.id.clone(),
            edge_type: "related_to".to_string(),
            note: None,
        };
        backend.create_edge(edge.clone()).await.expect("first");
        assert!(matches!(
            backend.create_edge(edge).await,
            Err(PersistError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn archived_canvases_are_hidden() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let canvas = backend.create_brain_dump("Old").expect("brain dump");
        backend.archive_brain_dump(&canvas.id).expect("archive");
        assert!(matches!(
            backend.fetch_brain_dump(&canvas.id).await,
            Err(PersistError::NotFound(_))
        ));
        assert!(backend.fetch_ideas(&canvas.id).await.is_err());
    }

    #[tokio::test]
    async fn default_edge_types_are_seeded_once() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let types = backend.fetch_edge_types().await.expect("types");
        let names = types.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["depends_on", "leads_to", "related_to", "similar_to"]);
        assert!(types.iter().any(|t| t.is_default && t.name == "related_to"));
    }

    #[tokio::test]
    async fn update_applies_patch_and_find_similar_ranks() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let canvas = backend.create_brain_dump("Board").expect("brain dump");
        let a = backend.create_idea(draft(&canvas.id, "a")).await.expect("a");
        let b = backend.create_idea(draft(&canvas.id, "b")).await.expect("b");
        backend
            .update_idea(
                &b.id,
                &IdeaPatch {
                    text: Some("b2".to_string()),
                    embedding: Some(Some(vec![0.0, 1.0])),
                    ..IdeaPatch::default()
                },
            )
            .await
            .expect("update");

        let similar = backend
            .find_similar(&canvas.id, &[1.0, 0.1], 5, 0.5)
            .await
            .expect("similar");
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].idea_id, a.id);

        let ideas = backend.fetch_ideas(&canvas.id).await.expect("ideas");
        let updated = ideas.iter().find(|i| i.id == b.id).expect("b");
        assert_eq!(updated.text, "b2");
    }
}
