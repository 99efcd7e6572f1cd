use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use crate::error::{Result, RagstudioError};

/// Migration metadata
pub struct Migration {
    pub version: u32,
    pub name: String,
    pub sql: String,
}

/// Migrations compiled into the binary, so the store works from any directory.
pub fn embedded_migrations() -> Vec<Migration> {
    [
        ("001_pipelines", include_str!("../../migrations/001_pipelines.sql")),
        ("002_benchmark_runs", include_str!("../../migrations/002_benchmark_runs.sql")),
    ]
    .iter()
    .enumerate()
    .map(|(i, (name, sql))| Migration {
        version: i as u32 + 1,
        name: name.to_string(),
        sql: sql.to_string(),
    })
    .collect()
}

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of applied migrations, in version order
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Load `NNN_name.sql` files from a directory
pub fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut files: Vec<_> = fs::read_dir(migrations_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    files.sort_by_key(|e| e.file_name());

    let mut migrations = Vec::with_capacity(files.len());
    for entry in files {
        let path = entry.path();
        let filename = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RagstudioError::Config("Invalid migration filename".to_string()))?;

        // "001_pipelines.sql" -> 1
        let version_str = filename.split('_').next().unwrap_or_default();
        let version: u32 = version_str.parse()
            .map_err(|_| RagstudioError::Config(format!("Invalid migration version: {}", filename)))?;

        migrations.push(Migration {
            version,
            name: filename.trim_end_matches(".sql").to_string(),
            sql: fs::read_to_string(&path)?,
        });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Apply every migration not yet recorded in schema_migrations
pub fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_migrations(conn)?;
    let mut count = 0;

    for migration in migrations {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            RagstudioError::Config(format!("Failed to execute migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_embedded_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        assert_eq!(run_migrations(&mut conn, &embedded_migrations()).unwrap(), 2);

        let tables = tables(&conn);
        assert!(tables.contains(&"pipelines".to_string()));
        assert!(tables.contains(&"benchmark_runs".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        // Second run is a no-op
        assert_eq!(run_migrations(&mut conn, &embedded_migrations()).unwrap(), 0);
        assert_eq!(get_applied_migrations(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_load_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("002_another.sql"), "CREATE TABLE another (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("001_test.sql"), "CREATE TABLE test (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("notes.txt"), "ignored").unwrap();

        let migrations = load_migrations(&migrations_dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].name, "001_test");
        assert_eq!(migrations[1].version, 2);
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let broken = vec![Migration {
            version: 1,
            name: "001_broken".to_string(),
            sql: "CREATE TABLE ok (id INTEGER); CREATE TABLE (".to_string(),
        }];

        assert!(run_migrations(&mut conn, &broken).is_err());
        assert!(!tables(&conn).contains(&"ok".to_string()));
        assert!(get_applied_migrations(&conn).unwrap().is_empty());
    }
}
