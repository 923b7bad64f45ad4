use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::info;

// A versioned schema change, embedded in the binary.
struct Migration {
    // Applied in ascending order, recorded in `schema_migrations`.
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_messages",
        sql: include_str!("../migrations/001_create_messages.sql"),
    },
    Migration {
        version: 2,
        name: "add_message_likes",
        sql: include_str!("../migrations/002_add_message_likes.sql"),
    },
    Migration {
        version: 3,
        name: "add_users_and_comments",
        sql: include_str!("../migrations/003_add_users_and_comments.sql"),
    },
];

pub async fn init_database(db_file: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = db_file == ":memory:";

    let base = if in_memory {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        // Read-write, create the file if it does not exist yet.
        SqliteConnectOptions::new()
            .filename(db_file)
            .create_if_missing(true)
            // WAL lets readers proceed while a write is in flight.
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
    };

    let options = base
        // Cascades on messages/comments and SET NULL on users rely on this.
        .foreign_keys(true)
        // Wait up to 5s on a locked database before failing.
        .busy_timeout(Duration::from_secs(5));

    // An in-memory database lives and dies with its connection, so keep exactly one around.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    let pool = pool_options.connect_with(options).await?;

    // 32MB page cache, temp tables in RAM.
    sqlx::query("PRAGMA cache_size = -32000").execute(&pool).await?;
    sqlx::query("PRAGMA temp_store = MEMORY").execute(&pool).await?;

    run_migrations(&pool).await?;

    // Refresh planner statistics once the schema is in place.
    sqlx::query("ANALYZE").execute(&pool).await?;

    info!("Database initialization complete");
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let applied =
            sqlx::query_as::<_, (i32,)>("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(pool)
                .await?
                .is_some();

        if applied {
            info!("Migration {} already applied, skipping", migration.version);
            continue;
        }

        info!("Running migration {}: {}", migration.version, migration.name);

        // Schema change and bookkeeping row commit together or not at all.
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;

        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().naive_utc())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Migration {} applied successfully", migration.version);
    }

    Ok(())
}
