//! Ordered-tree primitives shared by the page and block repositories.
//!
//! Both `pages` and `blocks` are self-referential tables whose live rows
//! keep a total sibling order through `sort_index`. The rules are the same
//! for both, so they are implemented once, generically over a [`TreeTable`]
//! descriptor and a sibling [`Scope`]:
//!
//! - "insert after" shifts every following sibling by a whole `+1`, which
//!   preserves index uniqueness exactly;
//! - "move" places fractionally (midpoint, `first/2`, `last + 1000`) so no
//!   other row is touched, and renormalizes the scope once gaps become too
//!   small to keep splitting;
//! - deleting closes the gap at the deleted node's own level only;
//!   tombstoned descendants keep their indices since they are no longer
//!   visible to any read.
//!
//! Every function takes a plain `&Connection` so cascades compose inside a
//! single caller-owned transaction.

use log::debug;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use crate::error::{CanopyError, Result};

/// Once a fractional placement would land closer than this to a neighbor,
/// the whole scope is rewritten to evenly spaced integer indices.
pub(crate) const MIN_GAP: f64 = 1e-6;

/// Index distance used when placing a node after the current last sibling.
pub(crate) const TAIL_GAP: f64 = 1000.0;

/// Static description of one self-referential ordered table.
pub(crate) struct TreeTable {
    /// Table name
    pub table: &'static str,
    /// Column naming the parent row within the same table
    pub parent_col: &'static str,
    /// Column partitioning scopes by page, if the table has one
    pub page_col: Option<&'static str>,
    /// Payload columns copied verbatim when duplicating a row
    pub copy_cols: &'static [&'static str],
}

/// The `pages` table.
pub(crate) const PAGES: TreeTable = TreeTable {
    table: "pages",
    parent_col: "parent_page_id",
    page_col: None,
    copy_cols: &["title", "icon", "cover_image", "is_database", "created_by_id"],
};

/// The `blocks` table.
pub(crate) const BLOCKS: TreeTable = TreeTable {
    table: "blocks",
    parent_col: "parent_block_id",
    page_col: Some("page_id"),
    copy_cols: &["page_id", "type", "properties", "created_by_id", "last_edited_by_id"],
};

/// A sibling scope: the set of live rows sharing a parent (and, for blocks,
/// a page).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub parent_id: Option<&'a str>,
    pub page_id: Option<&'a str>,
}

impl TreeTable {
    /// WHERE fragment selecting live rows of `scope`, plus its bind values.
    fn scope_where(&self, scope: Scope<'_>) -> (String, Vec<Value>) {
        let mut clauses = vec!["deleted_at IS NULL".to_string()];
        let mut binds = Vec::new();

        if let Some(col) = self.page_col {
            if let Some(page_id) = scope.page_id {
                clauses.push(format!("{col} = ?"));
                binds.push(Value::Text(page_id.to_string()));
            }
        }
        match scope.parent_id {
            Some(parent) => {
                clauses.push(format!("{} = ?", self.parent_col));
                binds.push(Value::Text(parent.to_string()));
            }
            None => clauses.push(format!("{} IS NULL", self.parent_col)),
        }

        (clauses.join(" AND "), binds)
    }
}

/// Index for appending at the end of `scope`: `max + 1`, or `0` when empty.
pub(crate) fn append_index(conn: &Connection, t: &TreeTable, scope: Scope<'_>) -> Result<f64> {
    let (where_sql, binds) = t.scope_where(scope);
    let sql = format!("SELECT MAX(sort_index) FROM {} WHERE {}", t.table, where_sql);
    let max: Option<f64> = conn.query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
    Ok(max.map_or(0.0, |m| m + 1.0))
}

/// Index for inserting right after `reference_id` in `scope`.
///
/// Shifts every live sibling at or past the slot by `+1` and returns the
/// freed index. Fails with `ReferenceNotFound` unless the reference is a
/// live member of the scope.
pub(crate) fn insert_after_index(
    conn: &Connection,
    t: &TreeTable,
    scope: Scope<'_>,
    reference_id: &str,
) -> Result<f64> {
    let (where_sql, scope_binds) = t.scope_where(scope);

    let sql = format!(
        "SELECT sort_index FROM {} WHERE id = ? AND {}",
        t.table, where_sql
    );
    let mut binds = vec![Value::Text(reference_id.to_string())];
    binds.extend(scope_binds.iter().cloned());
    let reference_index: Option<f64> = conn
        .query_row(&sql, params_from_iter(binds), |row| row.get(0))
        .optional()?;
    let reference_index = reference_index
        .ok_or_else(|| CanopyError::ReferenceNotFound(reference_id.to_string()))?;

    let new_index = reference_index + 1.0;
    let shift = format!(
        "UPDATE {} SET sort_index = sort_index + 1 WHERE {} AND sort_index >= ?",
        t.table, where_sql
    );
    let mut binds = scope_binds;
    binds.push(Value::Real(new_index));
    conn.execute(&shift, params_from_iter(binds))?;

    Ok(new_index)
}

/// Live siblings of `scope` in traversal order, excluding `excluded_id`.
fn ordered_siblings(
    conn: &Connection,
    t: &TreeTable,
    scope: Scope<'_>,
    excluded_id: &str,
) -> Result<Vec<(String, f64)>> {
    let (where_sql, scope_binds) = t.scope_where(scope);
    let sql = format!(
        "SELECT id, sort_index FROM {} WHERE {} AND id != ? ORDER BY sort_index ASC",
        t.table, where_sql
    );
    let mut binds = scope_binds;
    binds.push(Value::Text(excluded_id.to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fractional index for placing `moving_id` into `scope`, after `after_id`
/// when given, first otherwise.
///
/// Falls back to rewriting the whole scope to `0..n` integer indices when
/// the placement would land within [`MIN_GAP`] of a neighbor.
pub(crate) fn reposition_index(
    conn: &Connection,
    t: &TreeTable,
    scope: Scope<'_>,
    moving_id: &str,
    after_id: Option<&str>,
) -> Result<f64> {
    let siblings = ordered_siblings(conn, t, scope, moving_id)?;

    let (index, insert_pos) = match after_id {
        Some(after_id) => {
            let pos = siblings
                .iter()
                .position(|(id, _)| id == after_id)
                .ok_or_else(|| CanopyError::ReferenceNotFound(after_id.to_string()))?;
            let prev = siblings[pos].1;
            match siblings.get(pos + 1) {
                Some((_, next)) => ((prev + next) / 2.0, pos + 1),
                None => (prev + TAIL_GAP, pos + 1),
            }
        }
        None => match siblings.first() {
            Some((_, first)) => (first / 2.0, 0),
            None => (0.0, 0),
        },
    };

    let too_tight = |candidate: f64, pos: usize| {
        let prev_ok = pos == 0 || candidate - siblings[pos - 1].1 >= MIN_GAP;
        let next_ok = pos >= siblings.len() || siblings[pos].1 - candidate >= MIN_GAP;
        !(prev_ok && next_ok)
    };

    if !siblings.is_empty() && too_tight(index, insert_pos) {
        debug!(
            "renormalizing {} scope ({} siblings), gap below {}",
            t.table,
            siblings.len(),
            MIN_GAP
        );
        let update = format!("UPDATE {} SET sort_index = ? WHERE id = ?", t.table);
        for (i, (sibling_id, _)) in siblings.iter().enumerate() {
            let slot = if i < insert_pos { i } else { i + 1 };
            conn.execute(&update, params![slot as f64, sibling_id])?;
        }
        return Ok(insert_pos as f64);
    }

    Ok(index)
}

/// Reject reparenting `node_id` under itself or any of its descendants.
///
/// Walks the parent chain upward from the proposed parent; the chain is
/// acyclic by construction, so the walk terminates.
pub(crate) fn ensure_not_descendant(
    conn: &Connection,
    t: &TreeTable,
    node_id: &str,
    new_parent_id: Option<&str>,
) -> Result<()> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", t.parent_col, t.table);
    let mut current = new_parent_id.map(str::to_string);
    while let Some(ancestor) = current {
        if ancestor == node_id {
            return Err(CanopyError::CyclicMove);
        }
        current = conn
            .query_row(&sql, [&ancestor], |row| row.get::<_, Option<String>>(0))
            .optional()?
            .flatten();
    }
    Ok(())
}

/// Recursively soft-delete `node_id` and every live descendant.
///
/// Depth-first: children are tombstoned before their parent. Gap closure at
/// the node's own sibling level is a separate step ([`close_gap`]).
pub(crate) fn mark_subtree_deleted(
    conn: &Connection,
    t: &TreeTable,
    node_id: &str,
    now: i64,
) -> Result<()> {
    let select = format!(
        "SELECT id FROM {} WHERE {} = ? AND deleted_at IS NULL",
        t.table, t.parent_col
    );
    let children: Vec<String> = conn
        .prepare(&select)?
        .query_map([node_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for child in &children {
        mark_subtree_deleted(conn, t, child, now)?;
    }

    let update = format!(
        "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        t.table
    );
    conn.execute(&update, params![now, node_id])?;
    Ok(())
}

/// Close the ordering gap left at `deleted_index` in `scope` by shifting
/// every following live sibling down by one.
pub(crate) fn close_gap(
    conn: &Connection,
    t: &TreeTable,
    scope: Scope<'_>,
    deleted_index: f64,
) -> Result<()> {
    let (where_sql, scope_binds) = t.scope_where(scope);
    let sql = format!(
        "UPDATE {} SET sort_index = sort_index - 1 WHERE {} AND sort_index > ?",
        t.table, where_sql
    );
    let mut binds = scope_binds;
    binds.push(Value::Real(deleted_index));
    conn.execute(&sql, params_from_iter(binds))?;
    Ok(())
}

/// Deep-copy `source_id` right after itself in `scope`.
///
/// Opens a `+1` gap past the source, copies the row under a fresh id with
/// the same payload and owner stamps, and (optionally) recursively copies
/// the live child subtree, preserving every child's relative `sort_index`.
/// Returns the new root id.
pub(crate) fn duplicate_subtree(
    conn: &Connection,
    t: &TreeTable,
    scope: Scope<'_>,
    source_id: &str,
    source_index: f64,
    include_children: bool,
    now: i64,
) -> Result<String> {
    let (where_sql, scope_binds) = t.scope_where(scope);
    let shift = format!(
        "UPDATE {} SET sort_index = sort_index + 1 WHERE {} AND sort_index > ?",
        t.table, where_sql
    );
    let mut binds = scope_binds;
    binds.push(Value::Real(source_index));
    conn.execute(&shift, params_from_iter(binds))?;

    let new_id = Uuid::new_v4().to_string();
    copy_row(conn, t, source_id, &new_id, scope.parent_id, source_index + 1.0, now)?;
    if include_children {
        copy_children(conn, t, source_id, &new_id, now)?;
    }

    debug!("duplicated {} {} -> {}", t.table, source_id, new_id);
    Ok(new_id)
}

fn copy_children(
    conn: &Connection,
    t: &TreeTable,
    source_parent: &str,
    new_parent: &str,
    now: i64,
) -> Result<()> {
    let select = format!(
        "SELECT id, sort_index FROM {} WHERE {} = ? AND deleted_at IS NULL ORDER BY sort_index ASC",
        t.table, t.parent_col
    );
    let children: Vec<(String, f64)> = conn
        .prepare(&select)?
        .query_map([source_parent], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (child_id, child_index) in children {
        let new_child_id = Uuid::new_v4().to_string();
        copy_row(conn, t, &child_id, &new_child_id, Some(new_parent), child_index, now)?;
        copy_children(conn, t, &child_id, &new_child_id, now)?;
    }
    Ok(())
}

fn copy_row(
    conn: &Connection,
    t: &TreeTable,
    source_id: &str,
    new_id: &str,
    parent_id: Option<&str>,
    sort_index: f64,
    now: i64,
) -> Result<()> {
    let cols = t.copy_cols.join(", ");
    let sql = format!(
        "INSERT INTO {table} (id, {parent}, {cols}, sort_index, created_at, updated_at)
         SELECT ?1, ?2, {cols}, ?3, ?4, ?4 FROM {table} WHERE id = ?5",
        table = t.table,
        parent = t.parent_col,
        cols = cols,
    );
    conn.execute(&sql, params![new_id, parent_id, sort_index, now, source_id])?;
    Ok(())
}
