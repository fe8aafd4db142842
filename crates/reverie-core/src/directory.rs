//! Persona directory - the registry read contract
//!
//! Personas and relationships live in a small relational store outside the
//! memory engine. The engine only needs the read contract captured by
//! [`PersonaDirectory`]; the orchestrator additionally writes through the
//! upsert methods after exchanges. Two implementations:
//!
//! - [`SqlitePersonaDirectory`]: one SQLite database, WAL mode, two tables.
//! - [`MemoryDirectory`]: in-process maps for tests and fixtures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use rusqlite::{params, Connection, OptionalExtension};

use crate::persona::{Persona, Relationship};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Directory error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization of a preference map failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Initialization error
    #[error("initialization error: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

// ============================================================================
// TRAIT
// ============================================================================

/// Read (and orchestrator-write) contract for the persona registry.
///
/// The memory engine itself only calls the read half; it never creates or
/// mutates personas.
pub trait PersonaDirectory: Send + Sync {
    fn persona(&self, id: &str) -> Result<Option<Persona>>;
    fn list_personas(&self) -> Result<Vec<Persona>>;
    /// Relationship for an unordered pair; (a, b) and (b, a) are the same row.
    fn relationship(&self, a: &str, b: &str) -> Result<Option<Relationship>>;
    fn upsert_persona(&self, persona: &Persona) -> Result<()>;
    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()>;

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.persona(id)?.is_some())
    }
}

fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

// ============================================================================
// SQLITE DIRECTORY
// ============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS personas (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    personality_traits  TEXT NOT NULL DEFAULT '{}',
    topic_preferences   TEXT NOT NULL DEFAULT '{}',
    social_rank         TEXT NOT NULL DEFAULT 'commoner'
);

CREATE TABLE IF NOT EXISTS relationships (
    persona_a           TEXT NOT NULL,
    persona_b           TEXT NOT NULL,
    affinity            REAL NOT NULL DEFAULT 0.0,
    trust               REAL NOT NULL DEFAULT 0.0,
    respect             REAL NOT NULL DEFAULT 0.0,
    interaction_count   INTEGER NOT NULL DEFAULT 0,
    last_interaction    TEXT,
    PRIMARY KEY (persona_a, persona_b)
);
";

/// SQLite-backed registry. One connection behind a mutex; all queries are
/// point lookups on primary keys, so contention is not a concern.
pub struct SqlitePersonaDirectory {
    conn: Mutex<Connection>,
}

impl SqlitePersonaDirectory {
    /// Open (or create) the registry at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory registry (tests, throwaway runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Platform default path: `<data dir>/reverie/personas.db`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("rs", "reverie", "reverie")
            .ok_or_else(|| DirectoryError::Init("could not determine project directories".to_string()))?;
        Ok(dirs.data_dir().join("personas.db"))
    }

    fn configure(conn: &Connection) -> Result<()> {
        // journal_mode returns a row; the remaining pragmas do not.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_to_persona(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Persona, String, String)> {
        Ok((
            Persona {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                personality_traits: HashMap::new(),
                topic_preferences: HashMap::new(),
                social_rank: row.get(5)?,
            },
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    }

    fn hydrate(parts: (Persona, String, String)) -> Result<Persona> {
        let (mut persona, traits_json, prefs_json) = parts;
        persona.personality_traits = serde_json::from_str(&traits_json)?;
        persona.topic_preferences = serde_json::from_str(&prefs_json)?;
        Ok(persona)
    }
}

impl PersonaDirectory for SqlitePersonaDirectory {
    fn persona(&self, id: &str) -> Result<Option<Persona>> {
        let conn = self.lock();
        let parts = conn
            .query_row(
                "SELECT id, name, description, personality_traits, topic_preferences, social_rank
                 FROM personas WHERE id = ?1",
                params![id],
                Self::row_to_persona,
            )
            .optional()?;
        parts.map(Self::hydrate).transpose()
    }

    fn list_personas(&self) -> Result<Vec<Persona>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, personality_traits, topic_preferences, social_rank
             FROM personas ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_persona)?;
        let mut personas = Vec::new();
        for row in rows {
            personas.push(Self::hydrate(row?)?);
        }
        Ok(personas)
    }

    fn relationship(&self, a: &str, b: &str) -> Result<Option<Relationship>> {
        let (a, b) = pair_key(a, b);
        let conn = self.lock();
        let rel = conn
            .query_row(
                "SELECT persona_a, persona_b, affinity, trust, respect, interaction_count, last_interaction
                 FROM relationships WHERE persona_a = ?1 AND persona_b = ?2",
                params![a, b],
                |row| {
                    Ok(Relationship {
                        persona_a: row.get(0)?,
                        persona_b: row.get(1)?,
                        affinity: row.get(2)?,
                        trust: row.get(3)?,
                        respect: row.get(4)?,
                        interaction_count: row.get::<_, i64>(5)? as u64,
                        last_interaction: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(rel)
    }

    fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        let traits = serde_json::to_string(&persona.personality_traits)?;
        let prefs = serde_json::to_string(&persona.topic_preferences)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO personas (id, name, description, personality_traits, topic_preferences, social_rank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 personality_traits = excluded.personality_traits,
                 topic_preferences = excluded.topic_preferences,
                 social_rank = excluded.social_rank",
            params![
                persona.id,
                persona.name,
                persona.description,
                traits,
                prefs,
                persona.social_rank
            ],
        )?;
        Ok(())
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO relationships
                 (persona_a, persona_b, affinity, trust, respect, interaction_count, last_interaction)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(persona_a, persona_b) DO UPDATE SET
                 affinity = excluded.affinity,
                 trust = excluded.trust,
                 respect = excluded.respect,
                 interaction_count = excluded.interaction_count,
                 last_interaction = excluded.last_interaction",
            params![
                relationship.persona_a,
                relationship.persona_b,
                relationship.affinity,
                relationship.trust,
                relationship.respect,
                relationship.interaction_count as i64,
                relationship.last_interaction,
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY DIRECTORY
// ============================================================================

/// Map-backed directory for tests and fixtures.
#[derive(Default)]
pub struct MemoryDirectory {
    personas: RwLock<HashMap<String, Persona>>,
    relationships: RwLock<HashMap<(String, String), Relationship>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_personas(personas: impl IntoIterator<Item = Persona>) -> Self {
        let dir = Self::new();
        {
            let mut map = dir.personas.write().unwrap_or_else(|e| e.into_inner());
            for persona in personas {
                map.insert(persona.id.clone(), persona);
            }
        }
        dir
    }
}

impl PersonaDirectory for MemoryDirectory {
    fn persona(&self, id: &str) -> Result<Option<Persona>> {
        Ok(self
            .personas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }

    fn list_personas(&self) -> Result<Vec<Persona>> {
        let map = self.personas.read().unwrap_or_else(|e| e.into_inner());
        let mut personas: Vec<Persona> = map.values().cloned().collect();
        personas.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(personas)
    }

    fn relationship(&self, a: &str, b: &str) -> Result<Option<Relationship>> {
        let (a, b) = pair_key(a, b);
        Ok(self
            .relationships
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(a.to_string(), b.to_string()))
            .cloned())
    }

    fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        self.personas
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(persona.id.clone(), persona.clone());
        Ok(())
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.relationships
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                (relationship.persona_a.clone(), relationship.persona_b.clone()),
                relationship.clone(),
            );
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
