//! Block repository: the block half of the ordered hierarchical store.
//!
//! Blocks belong to exactly one page for their whole life; nesting and
//! ordering only ever happen inside that page. A block scope is the pair
//! `(page_id, parent_block_id)`, so sibling shifts in one page can never
//! leak into another.

use std::collections::HashMap;

use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::db::{Db, now_timestamp, timestamp_to_datetime};
use crate::error::{CanopyError, Result};
use crate::model::{Block, BlockProperties, BlockTree, BlockType, BlockWithChildren};
use crate::store::{self, BLOCKS, Scope};

pub(crate) const BLOCK_COLS: &str = "id, page_id, parent_block_id, type, properties, sort_index, \
     created_at, updated_at, created_by_id, last_edited_by_id, deleted_at";

pub(crate) fn row_to_block(row: &Row<'_>) -> rusqlite::Result<Block> {
    let properties: String = row.get(4)?;
    let properties: BlockProperties = serde_json::from_str(&properties).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let block_type: String = row.get(3)?;

    Ok(Block {
        id: row.get(0)?,
        page_id: row.get(1)?,
        parent_block_id: row.get(2)?,
        block_type: BlockType::parse(&block_type),
        properties,
        sort_index: row.get(5)?,
        created_at: timestamp_to_datetime(row.get(6)?),
        updated_at: timestamp_to_datetime(row.get(7)?),
        created_by_id: row.get(8)?,
        last_edited_by_id: row.get(9)?,
        deleted_at: row.get::<_, Option<i64>>(10)?.map(timestamp_to_datetime),
    })
}

/// Input for [`BlockRepo::create`].
#[derive(Debug, Clone)]
pub struct CreateBlock {
    /// Owning page
    pub page_id: String,
    /// Block kind
    pub block_type: BlockType,
    /// Initial property document
    pub properties: BlockProperties,
    /// Parent block within the same page; `None` for a top-level block
    pub parent_block_id: Option<String>,
    /// Sibling to insert after; appends when `None`
    pub after_block_id: Option<String>,
    /// Creating user id
    pub created_by_id: String,
}

/// Patch for [`BlockRepo::update`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateBlock {
    /// Replacement property document
    pub properties: Option<BlockProperties>,
    /// Explicit new sibling position
    pub sort_index: Option<f64>,
}

/// Block repository over the shared store handle.
#[derive(Clone)]
pub struct BlockRepo {
    db: Db,
}

impl BlockRepo {
    /// Create a new repository over `db`.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // ===== Read operations =====

    /// Fetch a live block with its ordered live direct children.
    pub fn get(&self, id: &str) -> Result<BlockWithChildren> {
        let conn = self.db.lock();
        let block = fetch_live_block(&conn, id)?;
        let child_blocks = live_children(&conn, id)?;
        Ok(BlockWithChildren {
            block,
            child_blocks,
        })
    }

    /// Assemble the full live block tree of a page from a single ordered
    /// query.
    ///
    /// Pass one groups every row under its parent id (the lookup table);
    /// pass two attaches each group to its parent node or the root list.
    /// Rows keep their fetch order, i.e. ascending `sort_index`.
    pub fn tree(&self, page_id: &str) -> Result<Vec<BlockTree>> {
        let conn = self.db.lock();
        ensure_live_page(&conn, page_id)?;

        let sql = format!(
            "SELECT {BLOCK_COLS} FROM blocks
              WHERE page_id = ? AND deleted_at IS NULL
              ORDER BY sort_index ASC"
        );
        let blocks = conn
            .prepare(&sql)?
            .query_map([page_id], row_to_block)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut by_parent: HashMap<Option<String>, Vec<Block>> = HashMap::new();
        for block in blocks {
            by_parent
                .entry(block.parent_block_id.clone())
                .or_default()
                .push(block);
        }

        fn attach(by_parent: &mut HashMap<Option<String>, Vec<Block>>, parent: Option<String>) -> Vec<BlockTree> {
            by_parent
                .remove(&parent)
                .unwrap_or_default()
                .into_iter()
                .map(|block| {
                    let id = block.id.clone();
                    BlockTree {
                        block,
                        child_blocks: attach(by_parent, Some(id)),
                    }
                })
                .collect()
        }

        Ok(attach(&mut by_parent, None))
    }

    // ===== Write operations =====

    /// Create a block, appended to its scope or inserted right after
    /// `after_block_id` with an integer shift of the following siblings.
    pub fn create(&self, input: CreateBlock) -> Result<Block> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        ensure_live_page(&tx, &input.page_id)?;

        if let Some(parent_id) = &input.parent_block_id {
            ensure_same_page_block(&tx, parent_id, &input.page_id)?;
        }

        let scope = Scope {
            parent_id: input.parent_block_id.as_deref(),
            page_id: Some(&input.page_id),
        };
        let sort_index = match &input.after_block_id {
            Some(reference) => store::insert_after_index(&tx, &BLOCKS, scope, reference)?,
            None => store::append_index(&tx, &BLOCKS, scope)?,
        };

        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let properties = serde_json::to_string(&input.properties)?;
        tx.execute(
            "INSERT INTO blocks (id, page_id, parent_block_id, type, properties, sort_index,
                                 created_at, updated_at, created_by_id, last_edited_by_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                input.page_id,
                input.parent_block_id,
                input.block_type.as_str(),
                properties,
                sort_index,
                now,
                now,
                input.created_by_id,
                input.created_by_id,
            ],
        )?;
        tx.commit()?;

        debug!("created block {id} in page {} at index {sort_index}", input.page_id);
        Ok(Block {
            id,
            page_id: input.page_id,
            parent_block_id: input.parent_block_id,
            block_type: input.block_type,
            properties: input.properties,
            sort_index,
            created_at: timestamp_to_datetime(now),
            updated_at: timestamp_to_datetime(now),
            created_by_id: input.created_by_id.clone(),
            last_edited_by_id: input.created_by_id,
            deleted_at: None,
        })
    }

    /// Replace properties and/or position, stamping the editing user and
    /// `updated_at`.
    pub fn update(&self, id: &str, patch: UpdateBlock, user_id: &str) -> Result<Block> {
        let conn = self.db.lock();
        let mut block = fetch_live_block(&conn, id)?;

        if let Some(properties) = patch.properties {
            block.properties = properties;
        }
        if let Some(sort_index) = patch.sort_index {
            block.sort_index = sort_index;
        }
        let now = now_timestamp();
        let properties = serde_json::to_string(&block.properties)?;
        conn.execute(
            "UPDATE blocks SET properties = ?, sort_index = ?, last_edited_by_id = ?, updated_at = ?
              WHERE id = ?",
            params![properties, block.sort_index, user_id, now, id],
        )?;

        block.last_edited_by_id = user_id.to_string();
        block.updated_at = timestamp_to_datetime(now);
        Ok(block)
    }

    /// Soft-delete a block and its whole descendant subtree, then close the
    /// ordering gap among its siblings. One transaction: all or nothing.
    ///
    /// Returns the tombstoned root block.
    pub fn delete(&self, id: &str) -> Result<Block> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let mut block = fetch_live_block(&tx, id)?;
        let now = now_timestamp();

        store::mark_subtree_deleted(&tx, &BLOCKS, id, now)?;
        store::close_gap(
            &tx,
            &BLOCKS,
            Scope {
                parent_id: block.parent_block_id.as_deref(),
                page_id: Some(&block.page_id),
            },
            block.sort_index,
        )?;
        tx.commit()?;

        debug!("soft-deleted block {id}");
        block.deleted_at = Some(timestamp_to_datetime(now));
        Ok(block)
    }

    /// Reposition a block inside its page using fractional indexing.
    ///
    /// The target parent is resolved within the block's own page, so a
    /// parent belonging to another page fails with `ReferenceNotFound`;
    /// cross-page moves are not supported.
    pub fn move_block(
        &self,
        id: &str,
        new_parent_block_id: Option<&str>,
        after_block_id: Option<&str>,
    ) -> Result<Block> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let mut block = fetch_live_block(&tx, id)?;

        if let Some(parent_id) = new_parent_block_id {
            ensure_same_page_block(&tx, parent_id, &block.page_id)?;
        }
        store::ensure_not_descendant(&tx, &BLOCKS, id, new_parent_block_id)?;

        let scope = Scope {
            parent_id: new_parent_block_id,
            page_id: Some(&block.page_id),
        };
        let sort_index = store::reposition_index(&tx, &BLOCKS, scope, id, after_block_id)?;
        let now = now_timestamp();
        tx.execute(
            "UPDATE blocks SET parent_block_id = ?, sort_index = ?, updated_at = ? WHERE id = ?",
            params![new_parent_block_id, sort_index, now, id],
        )?;
        tx.commit()?;

        block.parent_block_id = new_parent_block_id.map(str::to_string);
        block.sort_index = sort_index;
        block.updated_at = timestamp_to_datetime(now);
        Ok(block)
    }

    /// Deep-copy a block right after itself, optionally with its whole live
    /// child subtree. One transaction; returns the new copy.
    pub fn duplicate(&self, id: &str, include_children: bool) -> Result<Block> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let block = fetch_live_block(&tx, id)?;

        let scope = Scope {
            parent_id: block.parent_block_id.as_deref(),
            page_id: Some(&block.page_id),
        };
        let new_id = store::duplicate_subtree(
            &tx,
            &BLOCKS,
            scope,
            id,
            block.sort_index,
            include_children,
            now_timestamp(),
        )?;
        let copy = fetch_live_block(&tx, &new_id)?;
        tx.commit()?;
        Ok(copy)
    }
}

// ===== Helper functions =====

fn fetch_live_block(conn: &Connection, id: &str) -> Result<Block> {
    let sql = format!("SELECT {BLOCK_COLS} FROM blocks WHERE id = ? AND deleted_at IS NULL");
    conn.query_row(&sql, [id], row_to_block)
        .optional()?
        .ok_or(CanopyError::BlockNotFound)
}

fn live_children(conn: &Connection, parent_id: &str) -> Result<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLS} FROM blocks
          WHERE parent_block_id = ? AND deleted_at IS NULL
          ORDER BY sort_index ASC"
    );
    let children = conn
        .prepare(&sql)?
        .query_map([parent_id], row_to_block)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(children)
}

/// Ordered live top-level blocks of a page, each with one level of live
/// children. Shared with the page repository's block listing.
pub(crate) fn top_level_with_children(
    conn: &Connection,
    page_id: &str,
) -> Result<Vec<BlockWithChildren>> {
    let sql = format!(
        "SELECT {BLOCK_COLS} FROM blocks
          WHERE page_id = ? AND parent_block_id IS NULL AND deleted_at IS NULL
          ORDER BY sort_index ASC"
    );
    let top_level = conn
        .prepare(&sql)?
        .query_map([page_id], row_to_block)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    top_level
        .into_iter()
        .map(|block| {
            let child_blocks = live_children(conn, &block.id)?;
            Ok(BlockWithChildren {
                block,
                child_blocks,
            })
        })
        .collect()
}

fn ensure_live_page(conn: &Connection, page_id: &str) -> Result<()> {
    let live: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pages WHERE id = ? AND deleted_at IS NULL",
            [page_id],
            |row| row.get(0),
        )
        .optional()?;
    match live {
        Some(_) => Ok(()),
        None => Err(CanopyError::PageNotFound),
    }
}

/// Resolve a parent-block reference: it must be live and belong to the same
/// page, otherwise blocks could end up parented across pages.
fn ensure_same_page_block(conn: &Connection, block_id: &str, page_id: &str) -> Result<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT page_id FROM blocks WHERE id = ? AND deleted_at IS NULL",
            [block_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        Some(owner) if owner == page_id => Ok(()),
        _ => Err(CanopyError::ReferenceNotFound(block_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::{CreatePage, PageRepo};
    use crate::store::MIN_GAP;

    fn setup() -> (Db, PageRepo, BlockRepo, String) {
        let db = Db::open_in_memory().unwrap();
        let pages = PageRepo::new(db.clone());
        let blocks = BlockRepo::new(db.clone());
        let page = pages
            .create(CreatePage {
                title: "test page".to_string(),
                parent_page_id: None,
                icon: None,
                cover_image: None,
                after_page_id: None,
                created_by_id: "user-1".to_string(),
            })
            .unwrap();
        (db, pages, blocks, page.page.id)
    }

    fn paragraph(page_id: &str, text: &str) -> CreateBlock {
        CreateBlock {
            page_id: page_id.to_string(),
            block_type: BlockType::Paragraph,
            properties: BlockProperties {
                text: Some(text.to_string()),
                ..Default::default()
            },
            parent_block_id: None,
            after_block_id: None,
            created_by_id: "user-1".to_string(),
        }
    }

    fn top_level_order(blocks: &BlockRepo, page_id: &str) -> Vec<(String, f64)> {
        blocks
            .tree(page_id)
            .unwrap()
            .into_iter()
            .map(|node| (node.block.id, node.block.sort_index))
            .collect()
    }

    #[test]
    fn test_append_insert_delete_scenario() {
        let (_db, _pages, blocks, page_id) = setup();

        let x = blocks.create(paragraph(&page_id, "x")).unwrap();
        let y = blocks.create(paragraph(&page_id, "y")).unwrap();
        let z = blocks.create(paragraph(&page_id, "z")).unwrap();
        assert_eq!((x.sort_index, y.sort_index, z.sort_index), (0.0, 1.0, 2.0));

        let mut input = paragraph(&page_id, "w");
        input.after_block_id = Some(x.id.clone());
        let w = blocks.create(input).unwrap();
        assert_eq!(w.sort_index, 1.0);
        assert_eq!(
            top_level_order(&blocks, &page_id),
            [
                (x.id.clone(), 0.0),
                (w.id.clone(), 1.0),
                (y.id.clone(), 2.0),
                (z.id.clone(), 3.0),
            ]
        );

        blocks.delete(&y.id).unwrap();
        assert_eq!(
            top_level_order(&blocks, &page_id),
            [(x.id, 0.0), (w.id, 1.0), (z.id, 2.0)]
        );
    }

    #[test]
    fn test_create_preconditions() {
        let (_db, pages, blocks, page_id) = setup();

        assert!(matches!(
            blocks.create(paragraph("missing-page", "a")),
            Err(CanopyError::PageNotFound)
        ));

        let mut input = paragraph(&page_id, "a");
        input.after_block_id = Some("missing-block".to_string());
        assert!(matches!(
            blocks.create(input),
            Err(CanopyError::ReferenceNotFound(_))
        ));

        // A reference block in a different scope is not a valid anchor.
        let parent = blocks.create(paragraph(&page_id, "parent")).unwrap();
        let mut nested = paragraph(&page_id, "nested");
        nested.parent_block_id = Some(parent.id.clone());
        let nested = blocks.create(nested).unwrap();
        let mut input = paragraph(&page_id, "a");
        input.after_block_id = Some(nested.id.clone());
        assert!(matches!(
            blocks.create(input),
            Err(CanopyError::ReferenceNotFound(_))
        ));

        // A parent block from another page is rejected.
        let other = pages
            .create(CreatePage {
                title: "other".to_string(),
                parent_page_id: None,
                icon: None,
                cover_image: None,
                after_page_id: None,
                created_by_id: "user-1".to_string(),
            })
            .unwrap();
        let foreign = blocks.create(paragraph(&other.page.id, "foreign")).unwrap();
        let mut input = paragraph(&page_id, "a");
        input.parent_block_id = Some(foreign.id);
        assert!(matches!(
            blocks.create(input),
            Err(CanopyError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_get_includes_ordered_children() {
        let (_db, _pages, blocks, page_id) = setup();

        let parent = blocks.create(paragraph(&page_id, "parent")).unwrap();
        let mut first = paragraph(&page_id, "first");
        first.parent_block_id = Some(parent.id.clone());
        let first = blocks.create(first).unwrap();
        let mut second = paragraph(&page_id, "second");
        second.parent_block_id = Some(parent.id.clone());
        let second = blocks.create(second).unwrap();

        let fetched = blocks.get(&parent.id).unwrap();
        let child_ids: Vec<&str> = fetched
            .child_blocks
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(child_ids, [first.id.as_str(), second.id.as_str()]);

        assert!(matches!(blocks.get("nope"), Err(CanopyError::BlockNotFound)));
    }

    #[test]
    fn test_update_replaces_properties_and_stamps_editor() {
        let (_db, _pages, blocks, page_id) = setup();
        let block = blocks.create(paragraph(&page_id, "before")).unwrap();

        let updated = blocks
            .update(
                &block.id,
                UpdateBlock {
                    properties: Some(BlockProperties {
                        text: Some("after".to_string()),
                        checked: Some(true),
                        ..Default::default()
                    }),
                    sort_index: None,
                },
                "user-2",
            )
            .unwrap();
        assert_eq!(updated.properties.text.as_deref(), Some("after"));
        assert_eq!(updated.properties.checked, Some(true));
        assert_eq!(updated.last_edited_by_id, "user-2");
        assert_eq!(updated.created_by_id, "user-1");

        let fetched = blocks.get(&block.id).unwrap();
        assert_eq!(fetched.block.properties, updated.properties);

        assert!(matches!(
            blocks.update("nope", UpdateBlock::default(), "user-2"),
            Err(CanopyError::BlockNotFound)
        ));
    }

    #[test]
    fn test_delete_cascades_and_stays_within_page() {
        let (db, pages, blocks, page_id) = setup();

        let root = blocks.create(paragraph(&page_id, "root")).unwrap();
        let mut child = paragraph(&page_id, "child");
        child.parent_block_id = Some(root.id.clone());
        let child = blocks.create(child).unwrap();
        let mut grandchild = paragraph(&page_id, "grandchild");
        grandchild.parent_block_id = Some(child.id.clone());
        let grandchild = blocks.create(grandchild).unwrap();

        let other = pages
            .create(CreatePage {
                title: "other".to_string(),
                parent_page_id: None,
                icon: None,
                cover_image: None,
                after_page_id: None,
                created_by_id: "user-1".to_string(),
            })
            .unwrap();
        let untouched = blocks.create(paragraph(&other.page.id, "safe")).unwrap();

        blocks.delete(&root.id).unwrap();

        for id in [&root.id, &child.id, &grandchild.id] {
            assert!(matches!(blocks.get(id), Err(CanopyError::BlockNotFound)));
        }
        assert!(blocks.get(&untouched.id).is_ok());

        // Rows are tombstoned, never erased.
        let conn = db.lock();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 4);
    }

    #[test]
    fn test_move_fractional_placements() {
        let (_db, _pages, blocks, page_id) = setup();

        let r = blocks.create(paragraph(&page_id, "r")).unwrap();
        let a = blocks.create(paragraph(&page_id, "a")).unwrap();
        let b = blocks.create(paragraph(&page_id, "b")).unwrap();
        assert_eq!((a.sort_index, b.sort_index), (1.0, 2.0));

        // Between a (1) and b (2).
        let moved = blocks.move_block(&r.id, None, Some(&a.id)).unwrap();
        assert_eq!(moved.sort_index, 1.5);

        // Before the first sibling a (1).
        let moved = blocks.move_block(&r.id, None, None).unwrap();
        assert_eq!(moved.sort_index, 0.5);

        // After b, which is last at 2.
        let moved = blocks.move_block(&r.id, None, Some(&b.id)).unwrap();
        assert_eq!(moved.sort_index, 1002.0);
    }

    #[test]
    fn test_move_into_empty_parent_scope() {
        let (_db, _pages, blocks, page_id) = setup();

        let parent = blocks.create(paragraph(&page_id, "parent")).unwrap();
        let loose = blocks.create(paragraph(&page_id, "loose")).unwrap();

        let moved = blocks.move_block(&loose.id, Some(&parent.id), None).unwrap();
        assert_eq!(moved.parent_block_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(moved.sort_index, 0.0);
    }

    #[test]
    fn test_move_rejects_cycles_and_cross_page_parents() {
        let (_db, pages, blocks, page_id) = setup();

        let root = blocks.create(paragraph(&page_id, "root")).unwrap();
        let mut child = paragraph(&page_id, "child");
        child.parent_block_id = Some(root.id.clone());
        let child = blocks.create(child).unwrap();

        assert!(matches!(
            blocks.move_block(&root.id, Some(&child.id), None),
            Err(CanopyError::CyclicMove)
        ));

        let other = pages
            .create(CreatePage {
                title: "other".to_string(),
                parent_page_id: None,
                icon: None,
                cover_image: None,
                after_page_id: None,
                created_by_id: "user-1".to_string(),
            })
            .unwrap();
        let foreign = blocks.create(paragraph(&other.page.id, "foreign")).unwrap();
        assert!(matches!(
            blocks.move_block(&root.id, Some(&foreign.id), None),
            Err(CanopyError::ReferenceNotFound(_))
        ));

        assert!(matches!(
            blocks.move_block(&root.id, None, Some("missing")),
            Err(CanopyError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_shifts_following_siblings() {
        let (_db, _pages, blocks, page_id) = setup();

        let a = blocks.create(paragraph(&page_id, "a")).unwrap();
        let x = blocks.create(paragraph(&page_id, "x")).unwrap();
        let z = blocks.create(paragraph(&page_id, "z")).unwrap();
        assert_eq!((a.sort_index, x.sort_index, z.sort_index), (0.0, 1.0, 2.0));

        let copy = blocks.duplicate(&x.id, false).unwrap();
        assert_eq!(copy.sort_index, 2.0);
        assert_ne!(copy.id, x.id);
        assert_eq!(copy.properties, x.properties);
        assert_eq!(copy.created_by_id, x.created_by_id);

        assert_eq!(
            top_level_order(&blocks, &page_id),
            [
                (a.id, 0.0),
                (x.id, 1.0),
                (copy.id, 2.0),
                (z.id, 3.0),
            ]
        );
    }

    #[test]
    fn test_duplicate_with_children_preserves_shape() {
        let (_db, _pages, blocks, page_id) = setup();

        let root = blocks.create(paragraph(&page_id, "root")).unwrap();
        let mut first = paragraph(&page_id, "first");
        first.parent_block_id = Some(root.id.clone());
        let first = blocks.create(first).unwrap();
        let mut second = paragraph(&page_id, "second");
        second.parent_block_id = Some(root.id.clone());
        let second = blocks.create(second).unwrap();
        let mut nested = paragraph(&page_id, "nested");
        nested.parent_block_id = Some(first.id.clone());
        let nested = blocks.create(nested).unwrap();

        let copy = blocks.duplicate(&root.id, true).unwrap();
        let fetched = blocks.get(&copy.id).unwrap();
        assert_eq!(fetched.child_blocks.len(), 2);

        // Children keep their relative order and indices under fresh ids.
        let copied_first = &fetched.child_blocks[0];
        let copied_second = &fetched.child_blocks[1];
        assert_eq!(copied_first.sort_index, first.sort_index);
        assert_eq!(copied_second.sort_index, second.sort_index);
        assert_eq!(copied_first.properties.text.as_deref(), Some("first"));
        assert_eq!(copied_second.properties.text.as_deref(), Some("second"));
        assert!(copied_first.id != first.id && copied_second.id != second.id);

        let copied_nested = blocks.get(&copied_first.id).unwrap().child_blocks;
        assert_eq!(copied_nested.len(), 1);
        assert_eq!(copied_nested[0].properties.text.as_deref(), Some("nested"));
        assert_ne!(copied_nested[0].id, nested.id);
    }

    #[test]
    fn test_duplicate_without_children_copies_only_root() {
        let (_db, _pages, blocks, page_id) = setup();

        let root = blocks.create(paragraph(&page_id, "root")).unwrap();
        let mut child = paragraph(&page_id, "child");
        child.parent_block_id = Some(root.id.clone());
        blocks.create(child).unwrap();

        let copy = blocks.duplicate(&root.id, false).unwrap();
        assert!(blocks.get(&copy.id).unwrap().child_blocks.is_empty());
    }

    #[test]
    fn test_tree_assembles_nested_order() {
        let (_db, _pages, blocks, page_id) = setup();

        let a = blocks.create(paragraph(&page_id, "a")).unwrap();
        let b = blocks.create(paragraph(&page_id, "b")).unwrap();
        let mut a1 = paragraph(&page_id, "a1");
        a1.parent_block_id = Some(a.id.clone());
        let a1 = blocks.create(a1).unwrap();
        let mut a2 = paragraph(&page_id, "a2");
        a2.parent_block_id = Some(a.id.clone());
        let a2 = blocks.create(a2).unwrap();

        let tree = blocks.tree(&page_id).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].block.id, a.id);
        assert_eq!(tree[1].block.id, b.id);
        let child_ids: Vec<&str> = tree[0]
            .child_blocks
            .iter()
            .map(|c| c.block.id.as_str())
            .collect();
        assert_eq!(child_ids, [a1.id.as_str(), a2.id.as_str()]);

        assert!(matches!(blocks.tree("nope"), Err(CanopyError::PageNotFound)));
    }

    #[test]
    fn test_repeated_midpoint_moves_renormalize() {
        let (_db, _pages, blocks, page_id) = setup();

        let a = blocks.create(paragraph(&page_id, "a")).unwrap();
        blocks.create(paragraph(&page_id, "b")).unwrap();
        let x = blocks.create(paragraph(&page_id, "x")).unwrap();
        let y = blocks.create(paragraph(&page_id, "y")).unwrap();

        // Alternately squeezing x and y right after a halves the leading
        // gap every move; without renormalization this would underflow.
        for _ in 0..30 {
            blocks.move_block(&x.id, None, Some(&a.id)).unwrap();
            blocks.move_block(&y.id, None, Some(&a.id)).unwrap();
        }

        let order = top_level_order(&blocks, &page_id);
        assert_eq!(order.len(), 4);
        for pair in order.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(
                gap >= MIN_GAP,
                "sibling gap {gap} collapsed below {MIN_GAP}"
            );
        }
    }
}
