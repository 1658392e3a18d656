//! The emulator's fixed account registry. Real S3 has IAM; this has exactly
//! one account, matching the well-known `S3RVER`/`S3RVER` credential pair
//! so existing SDK fixtures and test suites need no changes to run here.

/// A single signing identity: access key, secret, and display name (used as
/// both `Owner/ID` and `Owner/DisplayName` in bucket/object listings).
#[derive(Debug, Clone)]
pub struct Account {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub display_name: String,
}

/// Holds the (currently singular) set of accounts the SigV4 verifier will
/// accept a `Credential=` access key against.
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

impl AccountRegistry {
    /// The registry's only member: `S3RVER`/`S3RVER`.
    pub fn fixed() -> Self {
        Self {
            accounts: vec![Account {
                access_key_id: "S3RVER".to_string(),
                secret_access_key: "S3RVER".to_string(),
                display_name: "S3RVER".to_string(),
            }],
        }
    }

    pub fn find(&self, access_key_id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.access_key_id == access_key_id)
    }

    /// The account used when `allow_mismatched_signatures` accepts a
    /// well-formed but incorrect signature.
    pub fn default_account(&self) -> &Account {
        &self.accounts[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_registry_resolves_s3rver() {
        let registry = AccountRegistry::fixed();
        let account = registry.find("S3RVER").unwrap();
        assert_eq!(account.secret_access_key, "S3RVER");
        assert_eq!(account.display_name, "S3RVER");
    }

    #[test]
    fn unknown_access_key_is_absent() {
        let registry = AccountRegistry::fixed();
        assert!(registry.find("AKIDOESNOTEXIST").is_none());
    }
}
