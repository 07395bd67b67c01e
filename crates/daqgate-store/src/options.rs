//! `options` – operating-mode catalog.

use daqgate_types::StoreError;
use daqgate_types::repository::OptionsCatalog;
use rusqlite::{OptionalExtension, params};

use crate::DaqStore;

const COLLECTION: &str = "options";

impl DaqStore {
    /// Register a mode by name.  Re-adding an existing name is a no-op.
    pub fn add_option(&self, name: &str) -> Result<(), StoreError> {
        self.with_conn(COLLECTION, |conn| {
            conn.execute(
                "INSERT INTO options (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
                params![name],
            )
        })?;
        Ok(())
    }
}

impl OptionsCatalog for DaqStore {
    fn option_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.with_conn(COLLECTION, |conn| {
            conn.query_row(
                "SELECT 1 FROM options WHERE name = ?1 LIMIT 1",
                params![name],
                |_| Ok(()),
            )
            .optional()
        })
        .map(|found| found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_option_exists() {
        let store = DaqStore::open_in_memory().unwrap();
        store.add_option("background_linked").unwrap();
        store.add_option("background_linked").unwrap();
        assert!(store.option_exists("background_linked").unwrap());
        assert!(!store.option_exists("background").unwrap());
    }

    #[test]
    fn lookup_is_exact() {
        let store = DaqStore::open_in_memory().unwrap();
        store.add_option("Background").unwrap();
        assert!(!store.option_exists("background").unwrap());
        assert!(!store.option_exists("Back%").unwrap());
    }
}
