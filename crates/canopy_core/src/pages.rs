//! Page repository: the page half of the ordered hierarchical store.
//!
//! Pages form a single tree (scope = sibling set under one parent, or the
//! top level when the parent is `NULL`). Deleting a page tombstones the
//! entire descendant page subtree *and* every block belonging to any page
//! in it, in one transaction.

use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::blocks;
use crate::db::{Db, now_timestamp, timestamp_to_datetime};
use crate::error::{CanopyError, Result};
use crate::model::{BlockWithChildren, Page, PageCounts, PageDetail, PageWithCounts};
use crate::store::{self, PAGES, Scope};

pub(crate) const PAGE_COLS: &str = "id, parent_page_id, title, icon, cover_image, is_database, \
     sort_index, created_at, updated_at, created_by_id, deleted_at";

pub(crate) fn row_to_page(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        parent_page_id: row.get(1)?,
        title: row.get(2)?,
        icon: row.get(3)?,
        cover_image: row.get(4)?,
        is_database: row.get::<_, i64>(5)? != 0,
        sort_index: row.get(6)?,
        created_at: timestamp_to_datetime(row.get(7)?),
        updated_at: timestamp_to_datetime(row.get(8)?),
        created_by_id: row.get(9)?,
        deleted_at: row.get::<_, Option<i64>>(10)?.map(timestamp_to_datetime),
    })
}

/// Input for [`PageRepo::create`].
#[derive(Debug, Clone)]
pub struct CreatePage {
    /// Page title
    pub title: String,
    /// Parent page; `None` creates a top-level page
    pub parent_page_id: Option<String>,
    /// Optional icon
    pub icon: Option<String>,
    /// Optional cover image URL
    pub cover_image: Option<String>,
    /// Sibling to insert after; appends when `None`
    pub after_page_id: Option<String>,
    /// Creating user id
    pub created_by_id: String,
}

/// Patch for [`PageRepo::update`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdatePage {
    /// New title
    pub title: Option<String>,
    /// New icon
    pub icon: Option<String>,
    /// New cover image URL
    pub cover_image: Option<String>,
}

/// Page repository over the shared store handle.
#[derive(Clone)]
pub struct PageRepo {
    db: Db,
}

impl PageRepo {
    /// Create a new repository over `db`.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // ===== Read operations =====

    /// Live top-level pages in sibling order, with live child-page and
    /// block counts.
    pub fn list_top_level(&self) -> Result<Vec<PageWithCounts>> {
        let conn = self.db.lock();
        let sql = format!(
            "SELECT {PAGE_COLS},
                    (SELECT COUNT(*) FROM pages c
                      WHERE c.parent_page_id = pages.id AND c.deleted_at IS NULL),
                    (SELECT COUNT(*) FROM blocks b
                      WHERE b.page_id = pages.id AND b.deleted_at IS NULL)
               FROM pages
              WHERE parent_page_id IS NULL AND deleted_at IS NULL
              ORDER BY sort_index ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let pages = stmt
            .query_map([], |row| {
                Ok(PageWithCounts {
                    page: row_to_page(row)?,
                    count: PageCounts {
                        child_pages: Some(row.get(11)?),
                        blocks: row.get(12)?,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    /// Fetch a live page with its ordered live child pages and block count.
    pub fn get(&self, id: &str) -> Result<PageDetail> {
        let conn = self.db.lock();
        let page = fetch_live_page(&conn, id)?;

        let sql = format!(
            "SELECT {PAGE_COLS} FROM pages
              WHERE parent_page_id = ? AND deleted_at IS NULL
              ORDER BY sort_index ASC"
        );
        let child_pages = conn
            .prepare(&sql)?
            .query_map([id], row_to_page)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let blocks: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE page_id = ? AND deleted_at IS NULL",
            [id],
            |row| row.get(0),
        )?;

        Ok(PageDetail {
            page,
            child_pages,
            count: PageCounts {
                child_pages: None,
                blocks,
            },
        })
    }

    /// Ordered live top-level blocks of a page, each with one level of
    /// ordered live children.
    pub fn page_blocks(&self, page_id: &str) -> Result<Vec<BlockWithChildren>> {
        let conn = self.db.lock();
        fetch_live_page(&conn, page_id)?;
        blocks::top_level_with_children(&conn, page_id)
    }

    // ===== Write operations =====

    /// Create a page at the end of its sibling scope, or right after
    /// `after_page_id` when given.
    pub fn create(&self, input: CreatePage) -> Result<PageWithCounts> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        if let Some(parent_id) = &input.parent_page_id {
            ensure_live_parent(&tx, parent_id)?;
        }

        let scope = Scope {
            parent_id: input.parent_page_id.as_deref(),
            page_id: None,
        };
        let sort_index = match &input.after_page_id {
            Some(reference) => store::insert_after_index(&tx, &PAGES, scope, reference)?,
            None => store::append_index(&tx, &PAGES, scope)?,
        };

        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        tx.execute(
            "INSERT INTO pages (id, parent_page_id, title, icon, cover_image, is_database,
                                sort_index, created_at, updated_at, created_by_id)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
            params![
                id,
                input.parent_page_id,
                input.title,
                input.icon,
                input.cover_image,
                sort_index,
                now,
                now,
                input.created_by_id,
            ],
        )?;
        tx.commit()?;

        debug!("created page {id} at index {sort_index}");
        Ok(PageWithCounts {
            page: Page {
                id,
                parent_page_id: input.parent_page_id,
                title: input.title,
                icon: input.icon,
                cover_image: input.cover_image,
                is_database: false,
                sort_index,
                created_at: timestamp_to_datetime(now),
                updated_at: timestamp_to_datetime(now),
                created_by_id: input.created_by_id,
                deleted_at: None,
            },
            count: PageCounts {
                child_pages: Some(0),
                blocks: 0,
            },
        })
    }

    /// Patch title/icon/cover and stamp `updated_at`.
    pub fn update(&self, id: &str, patch: UpdatePage) -> Result<PageWithCounts> {
        let conn = self.db.lock();
        let mut page = fetch_live_page(&conn, id)?;

        if let Some(title) = patch.title {
            page.title = title;
        }
        if let Some(icon) = patch.icon {
            page.icon = Some(icon);
        }
        if let Some(cover_image) = patch.cover_image {
            page.cover_image = Some(cover_image);
        }
        let now = now_timestamp();
        conn.execute(
            "UPDATE pages SET title = ?, icon = ?, cover_image = ?, updated_at = ? WHERE id = ?",
            params![page.title, page.icon, page.cover_image, now, id],
        )?;
        page.updated_at = timestamp_to_datetime(now);

        let (child_pages, blocks) = live_counts(&conn, id)?;
        Ok(PageWithCounts {
            page,
            count: PageCounts {
                child_pages: Some(child_pages),
                blocks,
            },
        })
    }

    /// Soft-delete a page, every descendant page, and every block belonging
    /// to any page in the subtree, then close the ordering gap among the
    /// page's own siblings. One transaction: all or nothing.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let page = fetch_live_page(&tx, id)?;
        let now = now_timestamp();

        // Blocks first: the page subtree is still fully visible here.
        let page_ids = collect_live_subtree_ids(&tx, id)?;
        for page_id in &page_ids {
            tx.execute(
                "UPDATE blocks SET deleted_at = ? WHERE page_id = ? AND deleted_at IS NULL",
                params![now, page_id],
            )?;
        }

        store::mark_subtree_deleted(&tx, &PAGES, id, now)?;
        store::close_gap(
            &tx,
            &PAGES,
            Scope {
                parent_id: page.parent_page_id.as_deref(),
                page_id: None,
            },
            page.sort_index,
        )?;
        tx.commit()?;

        debug!("soft-deleted page {id} and {} descendant page(s)", page_ids.len() - 1);
        Ok(())
    }

    /// Reposition a page under a (possibly new) parent using fractional
    /// indexing. Rejects moves under the page's own subtree.
    pub fn move_page(
        &self,
        id: &str,
        new_parent_page_id: Option<&str>,
        after_page_id: Option<&str>,
    ) -> Result<Page> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let mut page = fetch_live_page(&tx, id)?;

        if let Some(parent_id) = new_parent_page_id {
            ensure_live_parent(&tx, parent_id)?;
        }
        store::ensure_not_descendant(&tx, &PAGES, id, new_parent_page_id)?;

        let scope = Scope {
            parent_id: new_parent_page_id,
            page_id: None,
        };
        let sort_index = store::reposition_index(&tx, &PAGES, scope, id, after_page_id)?;
        let now = now_timestamp();
        tx.execute(
            "UPDATE pages SET parent_page_id = ?, sort_index = ?, updated_at = ? WHERE id = ?",
            params![new_parent_page_id, sort_index, now, id],
        )?;
        tx.commit()?;

        page.parent_page_id = new_parent_page_id.map(str::to_string);
        page.sort_index = sort_index;
        page.updated_at = timestamp_to_datetime(now);
        Ok(page)
    }
}

// ===== Helper functions =====

fn fetch_live_page(conn: &Connection, id: &str) -> Result<Page> {
    let sql = format!("SELECT {PAGE_COLS} FROM pages WHERE id = ? AND deleted_at IS NULL");
    conn.query_row(&sql, [id], row_to_page)
        .optional()?
        .ok_or(CanopyError::PageNotFound)
}

/// Resolve a parent reference; distinct from `PageNotFound` because the
/// missing id was an input, not the operation target.
fn ensure_live_parent(conn: &Connection, parent_id: &str) -> Result<()> {
    let live: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pages WHERE id = ? AND deleted_at IS NULL",
            [parent_id],
            |row| row.get(0),
        )
        .optional()?;
    match live {
        Some(_) => Ok(()),
        None => Err(CanopyError::ReferenceNotFound(parent_id.to_string())),
    }
}

/// The page and all its live descendant pages, breadth-first.
fn collect_live_subtree_ids(conn: &Connection, root: &str) -> Result<Vec<String>> {
    let mut ids = vec![root.to_string()];
    let mut next = 0;
    while next < ids.len() {
        let children: Vec<String> = conn
            .prepare("SELECT id FROM pages WHERE parent_page_id = ? AND deleted_at IS NULL")?
            .query_map([&ids[next]], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.extend(children);
        next += 1;
    }
    Ok(ids)
}

fn live_counts(conn: &Connection, page_id: &str) -> Result<(i64, i64)> {
    let child_pages: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pages WHERE parent_page_id = ? AND deleted_at IS NULL",
        [page_id],
        |row| row.get(0),
    )?;
    let blocks: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blocks WHERE page_id = ? AND deleted_at IS NULL",
        [page_id],
        |row| row.get(0),
    )?;
    Ok((child_pages, blocks))
}
