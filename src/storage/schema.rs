//! Relational schema: entities, a pooled string table, and tag triples

/// One row per distinct `(url, content_id)` resource
pub const CREATE_ENTITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    content_id TEXT NOT NULL,
    UNIQUE(url, content_id)
)
"#;

/// Deduplicated strings used as tag keys or tag values
pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL UNIQUE
)
"#;

/// `(entity, key, value)` asserts the entity is tagged key=value
pub const CREATE_LINK_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS link_meta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entity(id),
    key_id INTEGER NOT NULL REFERENCES meta(id),
    value_id INTEGER NOT NULL REFERENCES meta(id),
    UNIQUE(entity_id, key_id, value_id)
)
"#;

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_entity_content_id ON entity(content_id)",
    "CREATE INDEX IF NOT EXISTS idx_link_meta_key ON link_meta(key_id)",
    "CREATE INDEX IF NOT EXISTS idx_link_meta_value ON link_meta(value_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_ENTITY_TABLE,
        CREATE_META_TABLE,
        CREATE_LINK_META_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
