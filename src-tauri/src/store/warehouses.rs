use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::LedgerResult;
use crate::models::Warehouse;

pub fn insert(conn: &Connection, name: &str) -> LedgerResult<Warehouse> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO warehouses (name, created_at) VALUES (?1, ?2)",
        params![name, created_at],
    )?;

    Ok(Warehouse {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        created_at,
    })
}

pub fn get(conn: &Connection, id: i64) -> LedgerResult<Option<Warehouse>> {
    let warehouse = conn
        .query_row(
            "SELECT id, name, created_at FROM warehouses WHERE id = ?1",
            [id],
            |row| {
                Ok(Warehouse {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(warehouse)
}

pub fn name_exists(conn: &Connection, name: &str) -> LedgerResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM warehouses WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}
