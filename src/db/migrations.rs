use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `i` upgrades `user_version` `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("attendance_records", include_str!("schemas/schema_v1.sql")),
    ("absence_reports", include_str!("schemas/schema_v2.sql")),
];

fn schema_version() -> i32 {
    MIGRATIONS.len() as i32
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;
    let target = schema_version();

    if version < 0 {
        bail!("database has an invalid user_version ({version})");
    }
    if version > target {
        bail!("database version ({version}) is newer than supported schema ({target})");
    }
    if version == target {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (name, script) in &MIGRATIONS[version as usize..] {
        tx.execute_batch(script)
            .with_context(|| format!("migration {name} failed"))?;
    }
    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> i32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn upgrades_a_v1_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        run_migrations(&mut conn).unwrap();
        assert_eq!(user_version(&conn), 2);

        let reports: i64 = conn
            .query_row("SELECT COUNT(*) FROM absence_reports", [], |row| row.get(0))
            .unwrap();
        assert_eq!(reports, 0);

        run_migrations(&mut conn).unwrap();
        assert_eq!(user_version(&conn), 2);
    }

    #[test]
    fn refuses_a_newer_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 9).unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
        assert_eq!(user_version(&conn), 9);
    }
}
