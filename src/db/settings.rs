use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

pub const SITE_TITLE: &str = "site_title";
pub const FAVICON_API: &str = "favicon_api";
pub const REGISTRATION_OPEN: &str = "registration_open";
pub const RISK_KEYWORDS: &str = "risk_keywords";
pub const CUSTOM_STYLES: &str = "custom_styles";
pub const CUSTOM_SCRIPTS: &str = "custom_scripts";

/// Keys that hold administrator-injected page code.
pub const CUSTOM_CODE_KEYS: [&str; 2] = [CUSTOM_STYLES, CUSTOM_SCRIPTS];

const DEFAULTS: &[(&str, &str)] = &[
    (SITE_TITLE, "OnePanel"),
    (FAVICON_API, "https://favicon.cccyun.cc/${hostname}"),
    (
        RISK_KEYWORDS,
        "赌博,博彩,赌场,下注,色情,成人,翻墙,梯子,vpn,加速器,镜像站,代充,破解",
    ),
    (CUSTOM_STYLES, ""),
    (CUSTOM_SCRIPTS, ""),
];

/// Inserts any missing default keys. Returns how many were added.
pub fn seed_defaults(conn: &Connection) -> rusqlite::Result<usize> {
    let mut added = 0;
    for (key, value) in DEFAULTS {
        added += conn.execute(
            "INSERT OR IGNORE INTO system_config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }
    Ok(added)
}

pub fn get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let value: Option<Option<String>> = conn
        .query_row(
            "SELECT value FROM system_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.flatten())
}

pub fn set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO system_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn all(conn: &Connection) -> rusqlite::Result<BTreeMap<String, Option<String>>> {
    let mut stmt = conn.prepare("SELECT key, value FROM system_config ORDER BY key")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

/// Registration stays open unless an administrator explicitly closed it.
pub fn registration_open(conn: &Connection) -> rusqlite::Result<bool> {
    Ok(get(conn, REGISTRATION_OPEN)?.as_deref() != Some("false"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn seed_never_overwrites() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        set(&conn, SITE_TITLE, "My Links").unwrap();
        assert_eq!(seed_defaults(&conn).unwrap(), 0);
        assert_eq!(get(&conn, SITE_TITLE).unwrap().as_deref(), Some("My Links"));
    }

    #[test]
    fn set_upserts() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        set(&conn, "brand_new", "1").unwrap();
        set(&conn, "brand_new", "2").unwrap();
        assert_eq!(get(&conn, "brand_new").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn registration_only_closed_by_explicit_false() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(registration_open(&conn).unwrap());
        set(&conn, REGISTRATION_OPEN, "false").unwrap();
        assert!(!registration_open(&conn).unwrap());
        set(&conn, REGISTRATION_OPEN, "true").unwrap();
        assert!(registration_open(&conn).unwrap());
    }

    #[test]
    fn all_lists_every_seeded_key() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let map = all(&conn).unwrap();
        for (key, _) in DEFAULTS {
            assert!(map.contains_key(*key), "missing {key}");
        }
    }
}
