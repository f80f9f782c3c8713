use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::error::Result;

pub type Db = Pool<Postgres>;

// crate-relative path for sqlx migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(url: &str) -> Result<Db> {
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    Ok(pool)
}

pub async fn migrate(db: &Db) -> Result<()> {
    MIGRATOR.run(db).await?;
    Ok(())
}
