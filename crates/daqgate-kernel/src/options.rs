//! [`OptionsValidator`] – mode-name lookup against the options catalog.

use std::sync::Arc;

use daqgate_types::StoreError;
use daqgate_types::repository::OptionsCatalog;

/// Confirms a requested operating mode exists in the catalog.  One matching
/// entry is enough; catalog entries carry nothing else the kernel reads.
#[derive(Clone)]
pub struct OptionsValidator {
    catalog: Arc<dyn OptionsCatalog>,
}

impl OptionsValidator {
    pub fn new(catalog: Arc<dyn OptionsCatalog>) -> Self {
        Self { catalog }
    }

    pub fn exists(&self, mode: &str) -> Result<bool, StoreError> {
        if mode.is_empty() {
            return Ok(false);
        }
        self.catalog.option_exists(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    #[test]
    fn known_mode_exists() {
        let store = Arc::new(MemoryStore::default());
        store.add_option("background_linked");
        let validator = OptionsValidator::new(store);
        assert!(validator.exists("background_linked").unwrap());
        assert!(!validator.exists("background").unwrap());
    }

    #[test]
    fn empty_mode_never_exists() {
        let store = Arc::new(MemoryStore::default());
        store.add_option("");
        assert!(!OptionsValidator::new(store).exists("").unwrap());
    }

    #[test]
    fn catalog_failure_propagates() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads();
        assert!(OptionsValidator::new(store).exists("any").is_err());
    }
}
