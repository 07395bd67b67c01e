//! [`Authenticator`] – API credential verification.
//!
//! Every request carries an `api_user` / `api_key` pair.  The key is checked
//! against the bcrypt hash registered for the user.  An unknown user and a
//! wrong key produce the same [`DaqError::AuthDenied`] so a caller cannot
//! probe for valid usernames.

use std::sync::Arc;

use daqgate_types::DaqError;
use daqgate_types::repository::CredentialSource;
use tracing::debug;

pub use bcrypt::BcryptError;

/// Work factor used for newly registered keys.
pub const DEFAULT_KEY_COST: u32 = bcrypt::DEFAULT_COST;

/// Range of work factors bcrypt accepts.
pub const KEY_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Hash `api_key` with bcrypt work factor `cost`, ready for storage.
///
/// Fails when `cost` lies outside [`KEY_COST_RANGE`].
pub fn hash_api_key(api_key: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(api_key, cost)
}

/// Return `true` when `api_key` matches the `stored` bcrypt hash.
///
/// Malformed stored values never match.
pub fn verify_api_key(api_key: &str, stored: &str) -> bool {
    bcrypt::verify(api_key, stored).unwrap_or(false)
}

/// Verifies API credentials against a [`CredentialSource`].
#[derive(Clone)]
pub struct Authenticator {
    source: Arc<dyn CredentialSource>,
}

impl Authenticator {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self { source }
    }

    /// Return `Ok(())` when `api_key` is the registered key for `api_user`.
    ///
    /// # Errors
    ///
    /// - [`DaqError::AuthDenied`] – missing fields, unknown user or bad key.
    /// - [`DaqError::Store`] – the credential lookup itself failed.
    pub fn authenticate(&self, api_user: &str, api_key: &str) -> Result<(), DaqError> {
        if api_user.is_empty() || api_key.is_empty() {
            return Err(DaqError::AuthDenied);
        }
        let stored = self.source.api_key_hash(api_user)?;
        match stored {
            Some(hash) if verify_api_key(api_key, &hash) => Ok(()),
            _ => {
                debug!(api_user, "credential check failed");
                Err(DaqError::AuthDenied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    const TEST_COST: u32 = 4;

    fn hash(key: &str) -> String {
        hash_api_key(key, TEST_COST).unwrap()
    }

    fn authenticator_with(user: &str, key: &str) -> Authenticator {
        let store = Arc::new(MemoryStore::default());
        store.add_user(user, &hash(key));
        Authenticator::new(store)
    }

    #[test]
    fn hash_round_trips_through_verify() {
        let stored = hash("s3cret");
        assert!(stored.starts_with("$2"));
        assert!(!stored.contains("s3cret"));
        assert!(verify_api_key("s3cret", &stored));
        assert!(!verify_api_key("s3cret ", &stored));
    }

    #[test]
    fn identical_keys_get_distinct_salts() {
        assert_ne!(hash("same"), hash("same"));
    }

    #[test]
    fn hashes_from_other_bcrypt_implementations_verify() {
        // "$2a$" prefix, as written by Go's x/crypto/bcrypt.
        let stored = bcrypt::hash_with_result("hunter2", TEST_COST)
            .unwrap()
            .format_for_version(bcrypt::Version::TwoA);
        assert!(stored.starts_with("$2a$04$"));
        assert!(verify_api_key("hunter2", &stored));
    }

    #[test]
    fn malformed_stored_hash_never_matches() {
        assert!(!verify_api_key("key", ""));
        assert!(!verify_api_key("key", "key"));
        assert!(!verify_api_key("key", "sha256$00$00"));
        assert!(!verify_api_key("key", "$2b$04$tooshort"));
    }

    #[test]
    fn cost_outside_bcrypt_range_is_an_error() {
        assert!(hash_api_key("key", 3).is_err());
        assert!(!KEY_COST_RANGE.contains(&3));
        assert!(KEY_COST_RANGE.contains(&DEFAULT_KEY_COST));
    }

    #[test]
    fn valid_credentials_pass() {
        let auth = authenticator_with("shifter", "hunter2");
        assert!(auth.authenticate("shifter", "hunter2").is_ok());
    }

    #[test]
    fn unknown_user_and_bad_key_are_indistinguishable() {
        let auth = authenticator_with("shifter", "hunter2");
        let unknown = auth.authenticate("ghost", "hunter2").unwrap_err();
        let bad_key = auth.authenticate("shifter", "wrong").unwrap_err();
        assert!(matches!(unknown, DaqError::AuthDenied));
        assert!(matches!(bad_key, DaqError::AuthDenied));
        assert_eq!(unknown.to_string(), bad_key.to_string());
    }

    #[test]
    fn empty_fields_are_denied() {
        let auth = authenticator_with("shifter", "hunter2");
        assert!(matches!(
            auth.authenticate("", "hunter2"),
            Err(DaqError::AuthDenied)
        ));
        assert!(matches!(
            auth.authenticate("shifter", ""),
            Err(DaqError::AuthDenied)
        ));
    }

    #[test]
    fn lookup_failure_is_a_store_error() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads();
        let auth = Authenticator::new(store);
        assert!(matches!(
            auth.authenticate("shifter", "hunter2"),
            Err(DaqError::Store(_))
        ));
    }
}
