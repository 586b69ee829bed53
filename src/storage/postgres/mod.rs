mod schema;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::models::errors::StoreError;
use crate::models::transactions::TransactionRecord;
use crate::models::users::User;
use crate::storage::CacheStore;
use schema::{SCHEMA, TRANSACTION_COLUMNS};

/// [`CacheStore`] backed by PostgreSQL.
///
/// Batch writes run inside one database transaction, so a failing row leaves
/// nothing of its batch behind.
pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Database connection error: {}", e);
            }
        });

        info!("Connected to database");
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    /// Creates the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        self.client.lock().await.batch_execute(SCHEMA).await?;
        Ok(())
    }
}

fn to_bigint(field: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

fn from_bigint(field: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

fn record_from_row(row: &Row) -> Result<TransactionRecord, StoreError> {
    let logs_count: i32 = row.try_get("logs_count")?;

    Ok(TransactionRecord {
        hash: row.try_get("transaction_hash")?,
        status: from_bigint("status", row.try_get("status")?)?,
        block_hash: row.try_get("block_hash")?,
        block_number: from_bigint("block_number", row.try_get("block_number")?)?,
        from: row.try_get("from_address")?,
        to: row.try_get("to_address")?,
        contract_address: row.try_get("contract_address")?,
        logs_count: u32::try_from(logs_count).map_err(|_| StoreError::OutOfRange {
            field: "logs_count",
            value: logs_count.to_string(),
        })?,
        input: row.try_get("input")?,
        value: row.try_get("value")?,
    })
}

#[async_trait]
impl CacheStore for PostgresStore {
    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<TransactionRecord>, StoreError> {
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_hash = ANY($1)"
        );
        let rows = self
            .client
            .lock()
            .await
            .query(query.as_str(), &[&hashes])
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn insert_many(&self, records: &[TransactionRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;
        let statement = transaction
            .prepare(&format!(
                "INSERT INTO transactions ({TRANSACTION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (transaction_hash) DO NOTHING"
            ))
            .await?;

        for record in records {
            let status = to_bigint("status", record.status)?;
            let block_number = to_bigint("block_number", record.block_number)?;
            let logs_count = i32::try_from(record.logs_count).map_err(|_| {
                StoreError::OutOfRange {
                    field: "logs_count",
                    value: record.logs_count.to_string(),
                }
            })?;

            transaction
                .execute(
                    &statement,
                    &[
                        &record.hash,
                        &status,
                        &record.block_hash,
                        &block_number,
                        &record.from,
                        &record.to,
                        &record.contract_address,
                        &logs_count,
                        &record.input,
                        &record.value,
                    ],
                )
                .await?;
        }

        // Dropping the transaction on an early return rolls it back
        transaction.commit().await?;
        debug!("Committed {} transaction rows", records.len());
        Ok(())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY block_number");
        let rows = self.client.lock().await.query(query.as_str(), &[]).await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn find_user_history(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = self
            .client
            .lock()
            .await
            .query(
                "SELECT transaction_hash FROM user_transactions WHERE user_id = $1",
                &[&user_id],
            )
            .await?;

        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(StoreError::from))
            .collect()
    }

    async fn append_user_history(&self, user_id: &str, hashes: &[String]) -> Result<(), StoreError> {
        if hashes.is_empty() {
            return Ok(());
        }

        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;
        let statement = transaction
            .prepare(
                "INSERT INTO user_transactions (user_id, transaction_hash) VALUES ($1, $2) \
                 ON CONFLICT (user_id, transaction_hash) DO NOTHING",
            )
            .await?;

        for hash in hashes {
            transaction.execute(&statement, &[&user_id, hash]).await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(
                "SELECT id, username, password_hash FROM users WHERE username = $1",
                &[&username],
            )
            .await?;

        row.map(|row| -> Result<User, StoreError> {
            Ok(User {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        let inserted = self
            .client
            .lock()
            .await
            .execute(
                "INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3) \
                 ON CONFLICT (username) DO NOTHING",
                &[&user.id, &user.username, &user.password_hash],
            )
            .await?;

        Ok(inserted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bigint_conversion_rejects_values_past_i64() {
        assert_eq!(to_bigint("block_number", 21_000_000).unwrap(), 21_000_000);
        assert_matches!(
            to_bigint("block_number", u64::MAX),
            Err(StoreError::OutOfRange { field: "block_number", .. })
        );
        assert_matches!(
            from_bigint("status", -1),
            Err(StoreError::OutOfRange { field: "status", value }) if value == "-1"
        );
    }
}
