use diesel::{
    r2d2::{ConnectionManager, Pool, PoolError},
    PgConnection,
};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the connection pool from an explicit URL. The pool's lifecycle is
/// owned by the caller (created at startup, dropped at shutdown); nothing
/// in this crate holds a global handle.
pub fn create_conn(database_url: &str) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}
