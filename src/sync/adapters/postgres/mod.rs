//! `PostgreSQL` adapters for the sync catalog and the run ledger.

mod catalog;
mod migrations;
mod models;
mod runs;
mod schema;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub use catalog::PostgresSyncCatalog;
pub use migrations::{MIGRATIONS, apply_migrations};
pub use runs::PostgresSyncRunRepository;

/// `PostgreSQL` connection pool type used by sync adapters.
pub type SyncPgPool = Pool<ConnectionManager<PgConnection>>;
