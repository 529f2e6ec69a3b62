use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashSet};

use super::like_pattern;
use super::models::{Link, OwnedLink, PUBLIC_GROUP_ID};
use crate::ordering;

const COLUMNS: &str = "l.id, l.title, l.url, l.icon, l.http_title, l.position, l.group_id";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        icon: row.get(3)?,
        http_title: row.get(4)?,
        position: row.get(5)?,
        group_id: row.get(6)?,
    })
}

pub struct NewLink<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub icon: Option<&'a str>,
    pub http_title: Option<&'a str>,
    pub group_id: i64,
}

/// Returns the link together with the id of the user owning its group.
pub fn find_with_owner(conn: &Connection, id: i64) -> rusqlite::Result<Option<(Link, i64)>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS}, g.user_id FROM links l
             JOIN groups g ON g.id = l.group_id
             WHERE l.id = ?1"
        ),
        params![id],
        |row| Ok((from_row(row)?, row.get(7)?)),
    )
    .optional()
}

pub fn list_in_group(conn: &Connection, group_id: i64) -> rusqlite::Result<Vec<Link>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM links l WHERE l.group_id = ?1 ORDER BY l.position, l.id"
    ))?;
    let links = stmt
        .query_map(params![group_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

/// Links the user can see: their own plus the public group's.
pub fn list_visible(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<Link>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM links l
         JOIN groups g ON g.id = l.group_id
         WHERE g.user_id = ?1 OR g.id = ?2
         ORDER BY l.position, l.id"
    ))?;
    let links = stmt
        .query_map(params![user_id, PUBLIC_GROUP_ID], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

pub fn count_in_group(conn: &Connection, group_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM links WHERE group_id = ?1",
        params![group_id],
        |row| row.get(0),
    )
}

/// Appends a link at the end of its group.
pub fn create(conn: &Connection, new: &NewLink<'_>) -> rusqlite::Result<Link> {
    let position = count_in_group(conn, new.group_id)?;
    conn.execute(
        "INSERT INTO links (title, url, icon, http_title, position, group_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.title,
            new.url,
            new.icon,
            new.http_title,
            position,
            new.group_id
        ],
    )?;
    Ok(Link {
        id: conn.last_insert_rowid(),
        title: new.title.to_string(),
        url: new.url.to_string(),
        icon: new.icon.map(str::to_string),
        http_title: new.http_title.map(str::to_string),
        position,
        group_id: new.group_id,
    })
}

pub fn set_icon(conn: &Connection, id: i64, icon: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE links SET icon = ?1 WHERE id = ?2",
        params![icon, id],
    )?;
    Ok(())
}

/// Deletes a link and closes the gap in its group.
pub fn delete(conn: &mut Connection, link: &Link) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM links WHERE id = ?1", params![link.id])?;
    renumber_group(&tx, link.group_id)?;
    tx.commit()
}

/// Icon paths stored on the links of one group.
pub fn icons_in_group(conn: &Connection, group_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT icon FROM links WHERE group_id = ?1 AND icon IS NOT NULL")?;
    let icons = stmt
        .query_map(params![group_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(icons)
}

pub fn icon_in_use(conn: &Connection, icon: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM links WHERE icon = ?1)",
        params![icon],
        |row| row.get(0),
    )
}

/// File names (last path segment) of every icon still referenced by a link.
pub fn referenced_icon_names(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT icon FROM links WHERE icon IS NOT NULL")?;
    let icons = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(icons
        .into_iter()
        .filter_map(|icon| icon.rsplit('/').next().map(str::to_string))
        .filter(|name| !name.is_empty())
        .collect())
}

/// Puts the requested links into `group_id`, in the requested order.
///
/// Only links whose group belongs to `user_id` are touched. Links pulled in
/// from other groups leave those groups densely renumbered, and links of the
/// target group that the request does not mention follow the requested ones.
pub fn reorder_into_group(
    conn: &mut Connection,
    user_id: i64,
    group_id: i64,
    requested: &[i64],
) -> rusqlite::Result<Vec<i64>> {
    let tx = conn.transaction()?;

    let mut editable = Vec::with_capacity(requested.len());
    let mut source_groups = BTreeSet::new();
    for id in requested {
        if let Some((link, owner)) = find_with_owner(&tx, *id)? {
            if owner == user_id {
                if link.group_id != group_id {
                    source_groups.insert(link.group_id);
                }
                editable.push(link.id);
            }
        }
    }

    let current: Vec<i64> = list_in_group(&tx, group_id)?
        .into_iter()
        .map(|l| l.id)
        .collect();
    // Treat incoming links as members so the reorder keeps them.
    let mut members = editable.clone();
    members.extend(current.iter().copied().filter(|id| !editable.contains(id)));
    let sequence = ordering::reorder(&members, &editable);

    {
        let mut stmt =
            tx.prepare("UPDATE links SET position = ?1, group_id = ?2 WHERE id = ?3")?;
        for (index, id) in sequence.iter().enumerate() {
            stmt.execute(params![index as i64, group_id, id])?;
        }
    }
    for source in source_groups {
        renumber_group(&tx, source)?;
    }

    tx.commit()?;
    Ok(sequence)
}

/// Moves a link to `index` inside `target_group`, keeping both groups dense.
pub fn move_to(
    conn: &mut Connection,
    link: &Link,
    target_group: i64,
    index: i64,
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;

    let source: Vec<i64> = list_in_group(&tx, link.group_id)?
        .into_iter()
        .map(|l| l.id)
        .collect();
    let same_scope = link.group_id == target_group;
    let target: Vec<i64> = if same_scope {
        Vec::new()
    } else {
        list_in_group(&tx, target_group)?
            .into_iter()
            .map(|l| l.id)
            .collect()
    };

    let plan = ordering::plan_move(&source, &target, link.id, index, same_scope);

    {
        let mut stmt =
            tx.prepare("UPDATE links SET position = ?1, group_id = ?2 WHERE id = ?3")?;
        if let Some(source) = &plan.source {
            for (i, id) in source.iter().enumerate() {
                stmt.execute(params![i as i64, link.group_id, id])?;
            }
        }
        for (i, id) in plan.target.iter().enumerate() {
            stmt.execute(params![i as i64, target_group, id])?;
        }
    }

    tx.commit()
}

/// Link search for moderation. Matches title or url, case-insensitively.
pub fn search_with_owner(
    conn: &Connection,
    q: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<(Vec<OwnedLink>, i64)> {
    let pattern = like_pattern(q);
    let filter = "FROM links l
         JOIN groups g ON g.id = l.group_id
         JOIN users u ON u.id = g.user_id
         WHERE l.title LIKE ?1 ESCAPE '\\' OR l.url LIKE ?1 ESCAPE '\\'";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {filter}"),
        params![pattern],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT l.id, l.title, l.url, l.http_title, u.username {filter}
         ORDER BY l.id LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt
        .query_map(params![pattern, limit, offset], |row| {
            Ok(OwnedLink {
                id: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
                http_title: row.get(3)?,
                owner: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

fn renumber_group(conn: &Connection, group_id: i64) -> rusqlite::Result<()> {
    let ids: Vec<i64> = list_in_group(conn, group_id)?
        .into_iter()
        .map(|l| l.id)
        .collect();
    let mut stmt = conn.prepare("UPDATE links SET position = ?1 WHERE id = ?2")?;
    for (index, id) in ids.iter().enumerate() {
        stmt.execute(params![index as i64, id])?;
    }
    Ok(())
}
