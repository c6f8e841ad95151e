use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per scalar leaf of the tree. Objects exist only through
        -- their leaves; seq is the first-insertion order of a leaf.
        CREATE TABLE IF NOT EXISTS nodes (
            seq     INTEGER PRIMARY KEY AUTOINCREMENT,
            path    TEXT NOT NULL UNIQUE,
            value   TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
