use rusqlite::{params, Connection, OptionalExtension, Row};

use super::like_pattern;
use super::models::User;

const COLUMNS: &str =
    "id, username, hashed_password, is_admin, is_active, custom_bg, hidden_groups";

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        hashed_password: row.get(2)?,
        is_admin: row.get(3)?,
        is_active: row.get(4)?,
        custom_bg: row.get(5)?,
        hidden_groups: row.get(6)?,
    })
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM users WHERE username = ?1"),
        params![username],
        from_row,
    )
    .optional()
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
}

pub fn admin_exists(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE is_admin = 1",
        [],
        |row| row.get(0),
    )
}

pub fn insert(
    conn: &Connection,
    username: &str,
    hashed_password: &str,
    is_admin: bool,
    custom_bg: Option<&str>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (username, hashed_password, is_admin, custom_bg) VALUES (?1, ?2, ?3, ?4)",
        params![username, hashed_password, is_admin, custom_bg],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_custom_bg(conn: &Connection, id: i64, custom_bg: Option<&str>) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET custom_bg = ?1 WHERE id = ?2",
        params![custom_bg, id],
    )?;
    Ok(())
}

pub fn set_hidden_groups(conn: &Connection, id: i64, hidden: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET hidden_groups = ?1 WHERE id = ?2",
        params![hidden, id],
    )?;
    Ok(())
}

pub fn set_active(conn: &Connection, id: i64, active: bool) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET is_active = ?1 WHERE id = ?2",
        params![active, id],
    )?;
    Ok(())
}

pub fn set_admin(conn: &Connection, id: i64, admin: bool) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET is_admin = ?1 WHERE id = ?2",
        params![admin, id],
    )?;
    Ok(())
}

pub fn set_password(conn: &Connection, id: i64, hashed_password: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET hashed_password = ?1 WHERE id = ?2",
        params![hashed_password, id],
    )?;
    Ok(())
}

/// Whether any user still has `path` as their background.
pub fn background_in_use(conn: &Connection, path: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE custom_bg = ?1)",
        params![path],
        |row| row.get(0),
    )
}

/// Deletes the user. Groups and links go with it through `ON DELETE CASCADE`.
pub fn delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Case-insensitive username search. Returns one page plus the total match count.
pub fn search(
    conn: &Connection,
    q: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<(Vec<User>, i64)> {
    let pattern = like_pattern(q);

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE username LIKE ?1 ESCAPE '\\'",
        params![pattern],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM users WHERE username LIKE ?1 ESCAPE '\\'
         ORDER BY id LIMIT ?2 OFFSET ?3"
    ))?;
    let users = stmt
        .query_map(params![pattern, limit, offset], from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((users, total))
}
