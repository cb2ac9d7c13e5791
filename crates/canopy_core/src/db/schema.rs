use rusqlite::Connection;

/// SQL schema for the page/block store
const SCHEMA: &str = r#"
-- Pages (self-referential hierarchy, soft-deleted via deleted_at)
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    parent_page_id TEXT REFERENCES pages(id),
    title TEXT NOT NULL,
    icon TEXT,
    cover_image TEXT,
    is_database INTEGER NOT NULL DEFAULT 0,
    sort_index REAL NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    created_by_id TEXT NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_page_id);
CREATE INDEX IF NOT EXISTS idx_pages_live ON pages(deleted_at);

-- Blocks (belong to exactly one page, self-referential within it)
CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    page_id TEXT NOT NULL REFERENCES pages(id),
    parent_block_id TEXT REFERENCES blocks(id),
    type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    sort_index REAL NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    created_by_id TEXT NOT NULL,
    last_edited_by_id TEXT NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_blocks_page ON blocks(page_id);
CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(parent_block_id);
CREATE INDEX IF NOT EXISTS idx_blocks_page_order ON blocks(page_id, parent_block_id, sort_index);
"#;

/// Initialize the database with the store schema
pub fn init_database(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_database() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"pages".to_string()));
        assert!(tables.contains(&"blocks".to_string()));
    }

    #[test]
    fn test_init_database_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        init_database(&conn).unwrap();
    }
}
