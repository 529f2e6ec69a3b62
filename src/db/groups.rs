use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::Group;
use crate::ordering;

const COLUMNS: &str = "id, name, position, user_id";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
        user_id: row.get(3)?,
    })
}

pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM groups WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

/// Looks up a group only if `user_id` owns it.
pub fn find_owned(conn: &Connection, id: i64, user_id: i64) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM groups WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        from_row,
    )
    .optional()
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<Group>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM groups WHERE user_id = ?1 ORDER BY position, id"
    ))?;
    let groups = stmt
        .query_map(params![user_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

pub fn count_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM groups WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
}

/// Appends a new group at the end of the user's list.
pub fn create(conn: &Connection, user_id: i64, name: &str) -> rusqlite::Result<Group> {
    let position = count_for_user(conn, user_id)?;
    conn.execute(
        "INSERT INTO groups (name, position, user_id) VALUES (?1, ?2, ?3)",
        params![name, position, user_id],
    )?;
    Ok(Group {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        position,
        user_id,
    })
}

pub fn rename(conn: &Connection, id: i64, name: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE groups SET name = ?1 WHERE id = ?2",
        params![name, id],
    )?;
    Ok(())
}

/// Deletes a group (links cascade) and closes the gap it leaves.
pub fn delete(conn: &mut Connection, group: &Group) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM groups WHERE id = ?1", params![group.id])?;
    renumber_for_user(&tx, group.user_id)?;
    tx.commit()
}

/// Rewrites `position` for the user's groups following `requested`.
/// Ids the user does not own are skipped.
pub fn reorder(conn: &mut Connection, user_id: i64, requested: &[i64]) -> rusqlite::Result<Vec<i64>> {
    let tx = conn.transaction()?;
    let current: Vec<i64> = list_for_user(&tx, user_id)?
        .into_iter()
        .map(|g| g.id)
        .collect();
    let sequence = ordering::reorder(&current, requested);
    write_positions(&tx, &sequence)?;
    tx.commit()?;
    Ok(sequence)
}

fn renumber_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<()> {
    let ids: Vec<i64> = list_for_user(conn, user_id)?
        .into_iter()
        .map(|g| g.id)
        .collect();
    write_positions(conn, &ids)
}

fn write_positions(conn: &Connection, sequence: &[i64]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("UPDATE groups SET position = ?1 WHERE id = ?2")?;
    for (index, id) in sequence.iter().enumerate() {
        stmt.execute(params![index as i64, id])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, users};

    fn positions(conn: &Connection, user_id: i64) -> Vec<(i64, i64)> {
        list_for_user(conn, user_id)
            .unwrap()
            .into_iter()
            .map(|g| (g.id, g.position))
            .collect()
    }

    #[test]
    fn create_appends_in_order() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let uid = users::insert(&conn, "u", "h", false, None).unwrap();
        let a = create(&conn, uid, "A").unwrap();
        let b = create(&conn, uid, "B").unwrap();
        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
        assert!(find_owned(&conn, a.id, uid).unwrap().is_some());
        assert!(find_owned(&conn, a.id, uid + 1).unwrap().is_none());
    }

    #[test]
    fn reorder_ignores_foreign_groups() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let alice = users::insert(&conn, "alice", "h", false, None).unwrap();
        let bob = users::insert(&conn, "bob", "h", false, None).unwrap();
        let a1 = create(&conn, alice, "a1").unwrap().id;
        let a2 = create(&conn, alice, "a2").unwrap().id;
        let b1 = create(&conn, bob, "b1").unwrap().id;

        reorder(&mut conn, alice, &[b1, a2, a1]).unwrap();

        assert_eq!(positions(&conn, alice), vec![(a2, 0), (a1, 1)]);
        assert_eq!(positions(&conn, bob), vec![(b1, 0)]);
    }

    #[test]
    fn delete_cascades_links_and_closes_gap() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let uid = users::insert(&conn, "u", "h", false, None).unwrap();
        let a = create(&conn, uid, "A").unwrap();
        let b = create(&conn, uid, "B").unwrap();
        conn.execute(
            "INSERT INTO links (title, url, group_id) VALUES ('t', 'https://t.test', ?1)",
            params![a.id],
        )
        .unwrap();

        delete(&mut conn, &a).unwrap();

        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 0);
        assert_eq!(positions(&conn, uid), vec![(b.id, 0)]);
    }
}
