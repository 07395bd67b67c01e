//! `users` – API usernames and salted key hashes.

use daqgate_types::StoreError;
use daqgate_types::repository::CredentialSource;
use rusqlite::{OptionalExtension, params};

use crate::DaqStore;

const COLLECTION: &str = "users";

impl DaqStore {
    /// Register `api_user`, or replace its key hash if it already exists.
    pub fn upsert_user(&self, api_user: &str, api_key_hash: &str) -> Result<(), StoreError> {
        self.with_conn(COLLECTION, |conn| {
            conn.execute(
                "INSERT INTO users (api_username, api_key) VALUES (?1, ?2)
                 ON CONFLICT (api_username) DO UPDATE SET api_key = excluded.api_key",
                params![api_user, api_key_hash],
            )
        })?;
        Ok(())
    }
}

impl CredentialSource for DaqStore {
    fn api_key_hash(&self, api_user: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(COLLECTION, |conn| {
            conn.query_row(
                "SELECT api_key FROM users WHERE api_username = ?1",
                params![api_user],
                |row| row.get(0),
            )
            .optional()
        })
    }
}
