use std::collections::HashSet;

use crate::Database;
use crate::models::{NodeRow, SubtreeWrite};
use anyhow::Result;
use rusqlite::{Connection, Transaction};

impl Database {
    // -- Reads --

    /// All leaves at or below `path`, in first-insertion order, with paths
    /// made relative to `path`. The empty path reads the whole tree.
    pub fn read_subtree(&self, path: &str) -> Result<Vec<NodeRow>> {
        self.with_conn(|conn| query_subtree(conn, path))
    }

    // -- Writes --

    /// Replace every subtree in `writes` inside one transaction.
    /// Leaves that are rewritten keep their original sequence number, so an
    /// edited child never moves among its siblings.
    pub fn apply_writes(&self, writes: &[SubtreeWrite]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for write in writes {
                replace_subtree(&tx, write)?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

fn replace_subtree(tx: &Transaction<'_>, write: &SubtreeWrite) -> Result<()> {
    // A scalar stored at an ancestor would shadow the new subtree
    for (idx, _) in write.path.match_indices('/') {
        tx.execute("DELETE FROM nodes WHERE path = ?1", [&write.path[..idx]])?;
    }

    let keep: HashSet<&str> = write.leaves.iter().map(|(path, _)| path.as_str()).collect();
    let existing: Vec<String> = query_subtree_paths(tx, &write.path)?;
    for stale in existing.iter().filter(|p| !keep.contains(p.as_str())) {
        tx.execute("DELETE FROM nodes WHERE path = ?1", [stale])?;
    }

    let mut upsert = tx.prepare_cached(
        "INSERT INTO nodes (path, value) VALUES (?1, ?2)
         ON CONFLICT(path) DO UPDATE SET value = excluded.value",
    )?;
    for (path, value) in &write.leaves {
        upsert.execute((path, value))?;
    }

    Ok(())
}

/// Bounds selecting `path` and everything strictly below it.
/// `'0'` is the character right after `'/'`.
fn subtree_bounds(path: &str) -> (String, String) {
    (format!("{}/", path), format!("{}0", path))
}

fn query_subtree(conn: &Connection, path: &str) -> Result<Vec<NodeRow>> {
    if path.is_empty() {
        let mut stmt = conn.prepare("SELECT path, value FROM nodes ORDER BY seq")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NodeRow {
                    path: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        return Ok(rows);
    }

    let (lower, upper) = subtree_bounds(path);
    let mut stmt = conn.prepare(
        "SELECT path, value FROM nodes
         WHERE path = ?1 OR (path >= ?2 AND path < ?3)
         ORDER BY seq",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![path, lower, upper], |row| {
            let full: String = row.get(0)?;
            let relative = full
                .strip_prefix(path)
                .map(|rest| rest.trim_start_matches('/').to_string())
                .unwrap_or_default();
            Ok(NodeRow {
                path: relative,
                value: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_subtree_paths(conn: &Connection, path: &str) -> Result<Vec<String>> {
    let (lower, upper) = subtree_bounds(path);
    let mut stmt =
        conn.prepare("SELECT path FROM nodes WHERE path = ?1 OR (path >= ?2 AND path < ?3)")?;
    let paths = stmt
        .query_map(rusqlite::params![path, lower, upper], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(paths)
}
