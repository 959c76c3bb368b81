use rusqlite::Connection;

use crate::error::{Error, Result};

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "initial",
        sql: include_str!("migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "file_changes",
        sql: include_str!("migrations/002_file_changes.sql"),
    },
];

/// Apply pending migrations under one write lock, so processes opening the
/// same fresh store concurrently apply each migration exactly once.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    apply_all(conn, MIGRATIONS)
}

fn apply_all(conn: &Connection, migrations: &[Migration]) -> Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    if let Err(e) = apply_pending(conn, migrations) {
        // Leave the connection usable; the failed migration is retried next open.
        if let Err(rollback) = conn.execute_batch("ROLLBACK") {
            tracing::warn!("Rollback after failed migration also failed: {}", rollback);
        }
        return Err(e);
    }
    conn.execute_batch("COMMIT")?;
    Ok(())
}

fn apply_pending(conn: &Connection, migrations: &[Migration]) -> Result<()> {
    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )?;

    let applied = get_applied_migrations(conn)?;

    for migration in migrations {
        if !applied.iter().any(|v| v == migration.version) {
            apply_migration(conn, migration)?;
        }
    }

    Ok(())
}

fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(versions)
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    tracing::debug!(
        "Applying migration {}: {}",
        migration.version,
        migration.name
    );

    conn.execute_batch(migration.sql).map_err(|e| {
        Error::StorageUnavailable(format!(
            "failed to apply migration {} ({}): {}",
            migration.version, migration.name, e
        ))
    })?;
    conn.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (
            migration.version,
            migration.name,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;

    tracing::debug!("Migration {} applied", migration.version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["features", "ledger_entries", "file_records", "meta"] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }

        let versions = get_applied_migrations(&conn).unwrap();
        assert_eq!(versions, vec!["001", "002"]);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions = get_applied_migrations(&conn).unwrap();
        assert_eq!(versions, vec!["001", "002"]);
    }

    #[test]
    fn test_ledger_entries_reject_updates_and_deletes() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO features (id, description, status, status_seq, created_at, updated_at)
             VALUES ('login', 'user auth', 'proposed', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO ledger_entries (id, feature_id, sequence, author_kind, author, note, created_at)
             VALUES ('e1', 'login', 1, 'human', 'dana', 'first', '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE ledger_entries SET note = 'edited'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM ledger_entries", []).is_err());
        assert!(conn.execute("DELETE FROM features", []).is_err());
    }

    #[test]
    fn test_file_records_reject_unknown_zone() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO file_records (path, zone, pinned, last_modified)
             VALUES ('a.rs', 'pending', 0, '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_migration_rolls_back_and_leaves_connection_usable() {
        let conn = Connection::open_in_memory().unwrap();
        let broken = [Migration {
            version: "001",
            name: "broken",
            sql: "CREATE TABLE half_done (x TEXT); INSERT INTO missing_table VALUES (1);",
        }];

        let result = apply_all(&conn, &broken);
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
        assert!(!table_exists(&conn, "half_done"));
        assert!(conn.is_autocommit());

        run_migrations(&conn).unwrap();
        assert!(table_exists(&conn, "features"));
    }

    #[test]
    fn test_ledger_entries_accept_file_changes() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO features (id, description, status, status_seq, created_at, updated_at)
             VALUES ('login', 'user auth', 'proposed', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        let insert = |action: &str, zone: &str| {
            conn.execute(
                "INSERT INTO ledger_entries (id, feature_id, sequence, author_kind, author, note,
                     file_path, file_action, file_to_zone, created_at)
                 VALUES (?1, 'login', (SELECT COUNT(*) + 1 FROM ledger_entries), 'human', 'dana', 'n',
                     'src/a.rs', ?2, ?3, '2024-01-01T00:00:00Z')",
                (format!("{}-{}", action, zone), action, zone),
            )
        };

        assert!(insert("associated", "active").is_ok());
        assert!(insert("renamed", "active").is_err());
        assert!(insert("moved", "attic").is_err());
    }
}
