//! Capability grants: which principals may decrypt which ciphertext
//! identity. A pure permission overlay — holding a grant is not ownership of
//! the value, and a grant goes stale the moment its ciphertext is replaced.

use cipher64::Handle;
use near_sdk::{env, near_bindgen, AccountId};

use crate::{Tipjar, TipjarExt, ERR_NOT_AUTHORIZED};

#[near_bindgen]
impl Tipjar {
    /// Re-issue grants on `target`'s current credited ciphertext to `target`
    /// and the contract, without touching the value. Manual recovery path
    /// beside the automatic re-grant inside credit/debit; idempotent.
    pub fn reinit(&mut self, target: AccountId) {
        let account = self.account_of(&target);

        let caller = env::predecessor_account_id();
        assert!(
            caller == target || caller == self.owner,
            "{}",
            ERR_NOT_AUTHORIZED
        );

        self.grant_balance(account.credited.handle(), &target);
    }

    /// Whether `account` holds a decrypt grant on the ciphertext identified
    /// by the hex `handle`.
    pub fn has_decrypt_access(&self, handle: String, account: AccountId) -> bool {
        let Ok(raw) = hex::decode(&handle) else {
            return false;
        };
        let Ok(handle) = <Handle>::try_from(raw.as_slice()) else {
            return false;
        };
        self.acl
            .get(&handle)
            .map(|principals| principals.contains(&account))
            .unwrap_or(false)
    }
}

impl Tipjar {
    pub(crate) fn grant(&mut self, handle: Handle, account: &AccountId) {
        let mut principals = self.acl.get(&handle).unwrap_or_default();
        if !principals.contains(account) {
            principals.push(account.clone());
            self.acl.insert(&handle, &principals);
        }
    }

    /// Balance ciphertexts are always readable by their creator and by the
    /// contract itself.
    pub(crate) fn grant_balance(&mut self, handle: Handle, creator: &AccountId) {
        self.grant(handle, creator);
        self.grant(handle, &env::current_account_id());
    }
}
