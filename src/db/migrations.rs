//! Ordered, additive schema migrations for the readings store.
//!
//! Older databases may already carry some of these columns (they were added
//! by hand or by earlier releases), so every step checks the live schema
//! first and is safe to run any number of times.

use crate::db::DbConnection;
use diesel::sql_types::Text;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use log::{info, warn};
use thiserror::Error;

pub const READINGS_TABLE: &str = "readings";

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("required migration '{name}' failed: {source}")]
    Required {
        name: &'static str,
        #[source]
        source: diesel::result::Error,
    },
}

pub enum Step {
    /// Plain SQL, expected to be idempotent by itself.
    Sql(&'static str),
    /// `ALTER TABLE .. ADD COLUMN`, skipped when the column already exists.
    AddColumn {
        column: &'static str,
        definition: &'static str,
    },
}

pub struct Migration {
    pub name: &'static str,
    /// A failed required migration aborts startup; others are logged and skipped.
    pub required: bool,
    pub step: Step,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "create_readings",
        required: true,
        step: Step::Sql(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id VARCHAR(64) NOT NULL,
                timestamp BIGINT NOT NULL,
                temperature DOUBLE NOT NULL,
                smoke_value INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        ),
    },
    Migration {
        name: "add_fire_value",
        required: false,
        step: Step::AddColumn {
            column: "fire_value",
            definition: "INTEGER NOT NULL DEFAULT 0",
        },
    },
    Migration {
        name: "add_temp_alert",
        required: false,
        step: Step::AddColumn {
            column: "temp_alert",
            definition: "BOOLEAN NOT NULL DEFAULT 0",
        },
    },
    Migration {
        name: "add_smoke_alert",
        required: false,
        step: Step::AddColumn {
            column: "smoke_alert",
            definition: "BOOLEAN NOT NULL DEFAULT 0",
        },
    },
    Migration {
        name: "add_fire_alert",
        required: false,
        step: Step::AddColumn {
            column: "fire_alert",
            definition: "BOOLEAN NOT NULL DEFAULT 0",
        },
    },
    Migration {
        name: "add_smoke_connected",
        required: false,
        step: Step::AddColumn {
            column: "smoke_connected",
            definition: "BOOLEAN",
        },
    },
    Migration {
        name: "add_mq2_preheated",
        required: false,
        step: Step::AddColumn {
            column: "mq2_preheated",
            definition: "BOOLEAN",
        },
    },
    Migration {
        name: "add_fire_detected",
        required: false,
        step: Step::AddColumn {
            column: "fire_detected",
            definition: "BOOLEAN",
        },
    },
    Migration {
        name: "add_alert_active",
        required: false,
        step: Step::AddColumn {
            column: "alert_active",
            definition: "BOOLEAN",
        },
    },
    // Columns added by hand on old installs were nullable.
    Migration {
        name: "backfill_canonical_defaults",
        required: false,
        step: Step::Sql(
            r#"
            UPDATE readings SET fire_value = 0 WHERE fire_value IS NULL;
            UPDATE readings SET temp_alert = 0 WHERE temp_alert IS NULL;
            UPDATE readings SET smoke_alert = 0 WHERE smoke_alert IS NULL;
            UPDATE readings SET fire_alert = 0 WHERE fire_alert IS NULL;
            "#,
        ),
    },
    Migration {
        name: "index_device_id",
        required: false,
        step: Step::Sql("CREATE INDEX IF NOT EXISTS ix_readings_device_id ON readings (device_id)"),
    },
    Migration {
        name: "index_timestamp",
        required: false,
        step: Step::Sql("CREATE INDEX IF NOT EXISTS ix_readings_timestamp ON readings (timestamp)"),
    },
];

#[derive(diesel::QueryableByName)]
struct ColumnName {
    #[diesel(sql_type = Text)]
    name: String,
}

async fn existing_columns(
    conn: &mut DbConnection,
    table: &str,
) -> Result<Vec<String>, diesel::result::Error> {
    let rows: Vec<ColumnName> = diesel::sql_query("SELECT name FROM pragma_table_info(?)")
        .bind::<Text, _>(table.to_string())
        .load(conn)
        .await?;
    Ok(rows.into_iter().map(|c| c.name).collect())
}

/// Outcome of one migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    AlreadyApplied,
    Failed,
}

async fn apply(conn: &mut DbConnection, step: &Step) -> Result<StepOutcome, diesel::result::Error> {
    match step {
        Step::Sql(sql) => {
            conn.batch_execute(sql).await?;
            Ok(StepOutcome::Applied)
        }
        Step::AddColumn { column, definition } => {
            let columns = existing_columns(conn, READINGS_TABLE).await?;
            if columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return Ok(StepOutcome::AlreadyApplied);
            }
            conn.batch_execute(&format!(
                "ALTER TABLE {READINGS_TABLE} ADD COLUMN {column} {definition}"
            ))
            .await?;
            info!("Added column {column} to {READINGS_TABLE}");
            Ok(StepOutcome::Applied)
        }
    }
}

/// Runs [`MIGRATIONS`] in order and reports the outcome of every step.
pub async fn run_migrations(
    conn: &mut DbConnection,
) -> Result<Vec<(&'static str, StepOutcome)>, MigrationError> {
    let mut report = Vec::with_capacity(MIGRATIONS.len());
    for migration in MIGRATIONS {
        let outcome = match apply(conn, &migration.step).await {
            Ok(outcome) => outcome,
            Err(source) if migration.required => {
                return Err(MigrationError::Required {
                    name: migration.name,
                    source,
                });
            }
            Err(e) => {
                warn!("Migration {} failed: {e}", migration.name);
                StepOutcome::Failed
            }
        };
        report.push((migration.name, outcome));
    }
    Ok(report)
}
