use snafu::prelude::*;
use sqlx::{Pool, Sqlite, SqlitePool, sqlite::SqliteConnectOptions};
use std::path::PathBuf;
use tracing::debug;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Unable to find a location for the database"))]
    DatabaseLocation,
    #[snafu(display("{message}"))]
    Database { message: String },
    #[snafu(display("{message}"))]
    Migration { message: String },
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Self::Database {
            message: value.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Migration {
            message: value.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Default, Clone, PartialEq, sqlx::FromRow)]
pub struct DatabaseCredentials {
    pub email: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, sqlx::FromRow)]
pub struct DatabaseConfiguration {
    pub server_url: Option<String>,
    pub context: Option<String>,
}

/// Settings remembered between runs. Passwords are never written here.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new() -> Result<Self> {
        let database_url = if let Ok(url) = std::env::var("DATABASE_URL") {
            PathBuf::from(url.replace("sqlite://", ""))
        } else {
            let Some(mut url) = dirs::data_local_dir() else {
                return Err(Error::DatabaseLocation);
            };
            url.push("cratedrop");

            if !url.exists() {
                let Ok(_) = std::fs::create_dir_all(&url) else {
                    return Err(Error::DatabaseLocation);
                };
            }

            url.push("data.db");

            url
        };

        debug!("DATABASE_URL: {}", database_url.to_string_lossy());

        let options = SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .filename(database_url)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        Database::init(pool).await
    }

    async fn init(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        create_credentials_row(&pool).await?;
        create_configuration(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn set_email(&self, email: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE credentials
            SET email=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_server_url(&self, server_url: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET server_url=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(server_url.trim_end_matches('/'))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_context(&self, context: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET context=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(context)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_credentials(&self) -> Result<DatabaseCredentials> {
        let credentials = sqlx::query_as::<_, DatabaseCredentials>(
            r#"
            SELECT email FROM credentials
            WHERE ROWID = 1;
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(credentials)
    }

    pub async fn get_configuration(&self) -> Result<DatabaseConfiguration> {
        let configuration = sqlx::query_as::<_, DatabaseConfiguration>(
            r#"
            SELECT server_url, context FROM configuration
            WHERE ROWID = 1;
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(configuration)
    }
}

async fn create_credentials_row(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO credentials (ROWID) VALUES (1);")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_configuration(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO configuration (ROWID) VALUES (1);")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_database() -> Database {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Database::init(pool).await.unwrap()
    }

    #[tokio::test]
    async fn fresh_database_is_empty() {
        let db = memory_database().await;

        assert_eq!(db.get_credentials().await.unwrap(), Default::default());
        assert_eq!(db.get_configuration().await.unwrap(), Default::default());
    }

    #[tokio::test]
    async fn settings_are_stored_in_a_single_row() {
        let db = memory_database().await;

        db.set_email("dj@example.com").await.unwrap();
        db.set_email("selector@example.com").await.unwrap();
        db.set_server_url("https://crates.example.com/").await.unwrap();
        db.set_context("unsorted").await.unwrap();

        assert_eq!(
            db.get_credentials().await.unwrap().email.as_deref(),
            Some("selector@example.com")
        );

        let configuration = db.get_configuration().await.unwrap();
        assert_eq!(
            configuration.server_url.as_deref(),
            Some("https://crates.example.com")
        );
        assert_eq!(configuration.context.as_deref(), Some("unsorted"));

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM configuration")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn init_can_run_twice() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let db = Database::init(pool.clone()).await.unwrap();
        db.set_email("dj@example.com").await.unwrap();
        let db = Database::init(pool).await.unwrap();

        assert_eq!(
            db.get_credentials().await.unwrap().email.as_deref(),
            Some("dj@example.com")
        );
    }
}
