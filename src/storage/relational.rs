//! SQLite storage engine.
//!
//! Tags are stored as triples in `link_meta` pointing at pooled strings in
//! `meta`, so a string used as a key in one tag and a value in another
//! shares a row. Uniqueness constraints back every get-or-create step and
//! the connection is behind a mutex, so concurrent `add` calls for the
//! same `(url, content_id)` resolve to a single entity.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::debug;

use super::pattern::{is_wildcard, to_sql_glob};
use super::{schema, MetaFilter, Query, Selection, StorageEngine, StorageError};
use crate::core::{channels, EventBus, Identifier, ItemEvent};
use crate::domain::{ContentId, Item, Metadata};

/// Where a relational store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parse a connection string.
    ///
    /// Accepts `sqlite://` and `sqlite://:memory:` for an in-memory
    /// database, `sqlite:///relative.db` and `sqlite:////abs/path.db`
    /// for files, or a bare filesystem path.
    pub fn parse(url: &str) -> Result<Self, StorageError> {
        let rest = match url.split_once("://") {
            Some(("sqlite", rest)) => rest,
            Some((scheme, _)) => {
                return Err(StorageError::UnsupportedDatabase(format!(
                    "{} (scheme '{}')",
                    url, scheme
                )))
            }
            None if url.is_empty() || url == ":memory:" => return Ok(Self::Memory),
            None => return Ok(Self::File(PathBuf::from(url))),
        };

        if rest.is_empty() || rest == ":memory:" || rest == "/:memory:" {
            return Ok(Self::Memory);
        }

        match rest.strip_prefix('/') {
            Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
            _ => Err(StorageError::UnsupportedDatabase(url.to_string())),
        }
    }
}

/// Relational backing store over SQLite
pub struct RelationalStorage {
    conn: Mutex<Connection>,
    bus: Arc<EventBus>,
    identifier: Arc<Identifier>,
    channel: String,
}

impl std::fmt::Debug for RelationalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStorage")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl RelationalStorage {
    /// Open the database named by a connection string
    pub fn connect(url: &str, bus: Arc<EventBus>) -> Result<Self, StorageError> {
        match DatabaseLocation::parse(url)? {
            DatabaseLocation::Memory => Self::open_in_memory(bus),
            DatabaseLocation::File(path) => Self::open(&path, bus),
        }
    }

    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path, bus: Arc<EventBus>) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening database");
        Self::with_connection(Connection::open(path)?, bus)
    }

    /// Open an in-memory database
    pub fn open_in_memory(bus: Arc<EventBus>) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, bus)
    }

    fn with_connection(conn: Connection, bus: Arc<EventBus>) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            bus,
            identifier: Arc::new(Identifier::new()),
            channel: channels::ITEM_ADDED.to_string(),
        })
    }

    /// Share an identifier engine (and its cache) with other components
    pub fn with_identifier(mut self, identifier: Arc<Identifier>) -> Self {
        self.identifier = identifier;
        self
    }

    /// Emit add events on `channel` instead of `ITEM_ADDED`
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Row counts of `(entity, meta, link_meta)`
    pub fn table_counts(&self) -> Result<(usize, usize, usize), StorageError> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<usize, StorageError> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok((count("entity")?, count("meta")?, count("link_meta")?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn content_id(&self, item: &Item) -> Result<ContentId, StorageError> {
        match &item.content_id {
            Some(id) => Ok(id.clone()),
            None => Ok(self.identifier.identify_path(Path::new(&item.url))?),
        }
    }

    /// Insert the entity if absent and return its id
    fn upsert_entity(tx: &Transaction<'_>, url: &str, content_id: &str) -> Result<i64, StorageError> {
        tx.prepare_cached("INSERT OR IGNORE INTO entity (url, content_id) VALUES (?1, ?2)")?
            .execute(params![url, content_id])?;
        let id = tx
            .prepare_cached("SELECT id FROM entity WHERE url = ?1 AND content_id = ?2")?
            .query_row(params![url, content_id], |row| row.get(0))?;
        Ok(id)
    }

    fn find_entity(tx: &Transaction<'_>, url: &str, content_id: &str) -> Result<Option<i64>, StorageError> {
        let id = tx
            .prepare_cached("SELECT id FROM entity WHERE url = ?1 AND content_id = ?2")?
            .query_row(params![url, content_id], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Get or create the pooled row for `content`
    fn meta_id(tx: &Transaction<'_>, content: &str) -> Result<i64, StorageError> {
        tx.prepare_cached("INSERT OR IGNORE INTO meta (content) VALUES (?1)")?
            .execute([content])?;
        let id = tx
            .prepare_cached("SELECT id FROM meta WHERE content = ?1")?
            .query_row([content], |row| row.get(0))?;
        Ok(id)
    }

    /// Link every `(key, value)` pair to the entity, skipping existing triples
    fn link_metadata(tx: &Transaction<'_>, entity_id: i64, metadata: &Metadata) -> Result<usize, StorageError> {
        let mut linked = 0;
        for (key, values) in metadata {
            if values.is_empty() {
                continue;
            }
            let key_id = Self::meta_id(tx, key)?;
            for value in values {
                let value_id = Self::meta_id(tx, value)?;
                linked += tx
                    .prepare_cached(
                        "INSERT OR IGNORE INTO link_meta (entity_id, key_id, value_id) VALUES (?1, ?2, ?3)",
                    )?
                    .execute(params![entity_id, key_id, value_id])?;
            }
        }
        Ok(linked)
    }

    /// Load the items for entities selected by `sql`, which must select
    /// `e.id, e.url, e.content_id`
    fn load(conn: &Connection, sql: &str, args: &[String]) -> Result<Vec<Item>, StorageError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tags = conn.prepare_cached(
            r#"
            SELECT k.content, v.content
            FROM link_meta lm
            JOIN meta k ON k.id = lm.key_id
            JOIN meta v ON v.id = lm.value_id
            WHERE lm.entity_id = ?1
            ORDER BY lm.id
            "#,
        )?;

        let mut items = Vec::with_capacity(rows.len());
        for (entity_id, url, content_id) in rows {
            let mut item = Item::new(url).with_content_id(ContentId::from_stored(content_id));
            let pairs = tags
                .query_map([entity_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            for (key, value) in pairs {
                item.tag_one(key, value);
            }
            items.push(item);
        }
        Ok(items)
    }
}

/// Push an equality or `GLOB` predicate on `column`, binding `selector`
fn predicate(column: &str, selector: &str, args: &mut Vec<String>) -> String {
    if is_wildcard(selector) {
        args.push(to_sql_glob(selector));
        format!("{} GLOB ?", column)
    } else {
        args.push(selector.to_string());
        format!("{} = ?", column)
    }
}

/// Build the entity query for a selection. Each metadata `(key, value)`
/// pattern pair gets its own `link_meta` join with separate key and value
/// aliases of `meta`, and all pairs are ANDed.
fn select_sql(selection: Selection<'_>) -> (String, Vec<String>) {
    let mut args = Vec::new();
    let sql = match selection {
        Selection::ContentId(p) => format!(
            "SELECT e.id, e.url, e.content_id FROM entity e WHERE {} ORDER BY e.id",
            predicate("e.content_id", p, &mut args)
        ),
        Selection::Url(p) => format!(
            "SELECT e.id, e.url, e.content_id FROM entity e WHERE {} ORDER BY e.id",
            predicate("e.url", p, &mut args)
        ),
        Selection::Metadata(filters) => {
            let mut joins = String::new();
            let mut conditions = Vec::new();
            let mut n = 0;

            for MetaFilter { key, values } in filters {
                let values: Vec<Option<&str>> = if values.is_empty() {
                    vec![None]
                } else {
                    values.iter().map(|v| Some(v.as_str())).collect()
                };

                for value in values {
                    joins.push_str(&format!(
                        " JOIN link_meta l{n} ON l{n}.entity_id = e.id JOIN meta k{n} ON k{n}.id = l{n}.key_id"
                    ));
                    conditions.push(predicate(&format!("k{n}.content"), key, &mut args));
                    if let Some(value) = value {
                        joins.push_str(&format!(" JOIN meta v{n} ON v{n}.id = l{n}.value_id"));
                        conditions.push(predicate(&format!("v{n}.content"), value, &mut args));
                    }
                    n += 1;
                }
            }

            format!(
                "SELECT DISTINCT e.id, e.url, e.content_id FROM entity e{} WHERE {} ORDER BY e.id",
                joins,
                conditions.join(" AND ")
            )
        }
        Selection::All => "SELECT e.id, e.url, e.content_id FROM entity e ORDER BY e.id".to_string(),
    };
    (sql, args)
}

impl StorageEngine for RelationalStorage {
    fn add(&self, mut item: Item) -> Result<Item, StorageError> {
        let content_id = self.content_id(&item)?;

        {
            let mut conn = self.conn()?;
            // Dropping an uncommitted transaction rolls it back
            let tx = conn.transaction()?;
            let entity_id = Self::upsert_entity(&tx, &item.url, content_id.as_str())?;
            let linked = Self::link_metadata(&tx, entity_id, &item.metadata)?;
            tx.commit()?;
            debug!(url = %item.url, entity_id, linked, "stored item");
        }

        item.content_id = Some(content_id);
        self.bus.emit(
            &self.channel,
            &ItemEvent {
                storage: self,
                item: &item,
            },
        )?;

        Ok(item)
    }

    fn get(&self, query: &Query) -> Result<Vec<Item>, StorageError> {
        let (sql, args) = select_sql(query.selection());
        let conn = self.conn()?;
        Self::load(&conn, &sql, &args)
    }

    fn all(&self) -> Result<Vec<Item>, StorageError> {
        self.get(&Query::new())
    }

    fn update(&self, item: &Item) -> Result<(), StorageError> {
        let content_id = self.content_id(item)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let entity_id = Self::find_entity(&tx, &item.url, content_id.as_str())?.ok_or_else(|| {
            StorageError::NotFound {
                url: item.url.clone(),
                content_id: content_id.to_string(),
            }
        })?;
        let linked = Self::link_metadata(&tx, entity_id, &item.metadata)?;
        tx.commit()?;

        debug!(url = %item.url, entity_id, linked, "updated item metadata");
        Ok(())
    }
}
