//! Embedded schema migrations.
//!
//! Versions are recorded in `__diesel_schema_migrations`, so a database
//! migrated here and one migrated with the diesel CLI look the same.

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::Varchar;

/// Migrations in the order they must run, keyed by diesel version.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20260301000000",
        include_str!("../../../../migrations/2026-03-01-000000_create_sync_tables/up.sql"),
    ),
    (
        "20260301000001",
        include_str!("../../../../migrations/2026-03-01-000001_create_execution_leases/up.sql"),
    ),
];

const CREATE_VERSION_TABLE_SQL: &str = concat!(
    "CREATE TABLE IF NOT EXISTS __diesel_schema_migrations (",
    "version VARCHAR(50) PRIMARY KEY NOT NULL, ",
    "run_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
);

#[derive(Debug, QueryableByName)]
struct AppliedVersion {
    #[diesel(sql_type = Varchar)]
    version: String,
}

/// Applies every pending migration in one transaction and returns the
/// versions that ran.
///
/// # Errors
///
/// Returns the database error of the first statement that fails; nothing is
/// applied in that case.
pub fn apply_migrations(connection: &mut PgConnection) -> QueryResult<Vec<&'static str>> {
    connection.transaction(|conn| {
        conn.batch_execute(CREATE_VERSION_TABLE_SQL)?;
        let applied: Vec<String> =
            diesel::sql_query("SELECT version FROM __diesel_schema_migrations")
                .load::<AppliedVersion>(conn)?
                .into_iter()
                .map(|row| row.version)
                .collect();

        let mut ran = Vec::new();
        for (version, sql) in pending(&applied) {
            conn.batch_execute(sql)?;
            diesel::sql_query("INSERT INTO __diesel_schema_migrations (version) VALUES ($1)")
                .bind::<Varchar, _>(version)
                .execute(conn)?;
            ran.push(version);
        }
        Ok(ran)
    })
}

fn pending(applied: &[String]) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
    MIGRATIONS
        .iter()
        .copied()
        .filter(|(version, _)| !applied.iter().any(|done| done == version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn versions_are_strictly_increasing() {
        let versions: Vec<&str> = MIGRATIONS.iter().map(|(version, _)| *version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[rstest]
    #[case(&[], 2)]
    #[case(&["20260301000000"], 1)]
    #[case(&["20260301000000", "20260301000001"], 0)]
    fn only_unrecorded_versions_are_pending(#[case] applied: &[&str], #[case] expected: usize) {
        let recorded: Vec<String> = applied.iter().map(|version| (*version).to_owned()).collect();
        assert_eq!(pending(&recorded).count(), expected);
    }

    #[rstest]
    fn every_table_the_adapters_use_is_created() {
        let schema: String = MIGRATIONS.iter().map(|(_, sql)| *sql).collect();
        for table in [
            "sync_repositories",
            "sync_tasks",
            "sync_runs",
            "execution_leases",
            "idx_sync_tasks_webhook_token_unique",
        ] {
            assert!(schema.contains(table), "missing {table}");
        }
    }
}
