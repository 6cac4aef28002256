//! # Confidential Fungible Token
//!
//! Token collaborator for the tipjar settlement contract. Balances are
//! sealed `Cipher64` values; transfers clamp to an encrypted zero when the
//! sender's balance is insufficient instead of failing, so a transfer's
//! success or failure never reveals anything about a balance.
//!
//! The only hard failures are public preconditions: a non-owner mint and a
//! `confidential_transfer_from` without a live operator delegation.

use cipher64::{select, Cipher64, Handle};
use near_sdk::borsh::{BorshDeserialize, BorshSerialize};
use near_sdk::collections::LookupMap;
use near_sdk::json_types::U64;
use near_sdk::serde::Serialize;
use near_sdk::{env, log, near_bindgen, AccountId, IntoStorageKey, PanicOnDefault};

pub const ERR_NOT_OWNER: &str = "ConfidentialToken: owner only";
pub const ERR_NO_OPERATOR: &str = "ConfidentialToken: no operator delegation";

/// Storage prefixes are namespaced per contract so the workspace's contracts
/// can share one mocked storage in tests.
pub enum StorageKey {
    Balances,
    Operators,
    Acl,
}

impl IntoStorageKey for StorageKey {
    fn into_storage_key(self) -> Vec<u8> {
        match self {
            StorageKey::Balances => b"token:balances".to_vec(),
            StorageKey::Operators => b"token:operators".to_vec(),
            StorageKey::Acl => b"token:acl".to_vec(),
        }
    }
}

/// Emitted on every transfer; carries the handle of the moved ciphertext,
/// never an amount.
#[derive(Serialize)]
#[serde(crate = "near_sdk::serde")]
pub struct ConfidentialTransferEvent<'a> {
    pub from: &'a AccountId,
    pub to: &'a AccountId,
    pub amount_handle: String,
}

#[near_bindgen]
#[derive(BorshDeserialize, BorshSerialize, PanicOnDefault)]
#[borsh(crate = "near_sdk::borsh")]
pub struct ConfidentialToken {
    /// Mint authority
    owner: AccountId,
    name: String,
    symbol: String,
    /// Sealed balance per holder
    balances: LookupMap<AccountId, Cipher64>,
    /// (holder, spender) -> delegation expiry, nanoseconds
    operators: LookupMap<(AccountId, AccountId), u64>,
    /// Ciphertext handle -> principals permitted to decrypt it
    acl: LookupMap<Handle, Vec<AccountId>>,
    /// Minted amounts are public (mint arguments are public anyway)
    total_minted: u64,
}

#[near_bindgen]
impl ConfidentialToken {
    #[init]
    pub fn new(owner: AccountId, name: String, symbol: String) -> Self {
        Self {
            owner,
            name,
            symbol,
            balances: LookupMap::new(StorageKey::Balances),
            operators: LookupMap::new(StorageKey::Operators),
            acl: LookupMap::new(StorageKey::Acl),
            total_minted: 0,
        }
    }

    // ==================== MINT ====================

    /// Mint plaintext `amount` into `receiver`'s sealed balance. Owner only.
    pub fn mint(&mut self, receiver: AccountId, amount: U64) {
        assert_eq!(env::predecessor_account_id(), self.owner, "{}", ERR_NOT_OWNER);

        let seed = format!(
            "{}:mint:{}:{}",
            env::current_account_id(),
            receiver,
            self.total_minted
        );
        let minted = Cipher64::seal(amount.0, seed.as_bytes());
        let balance = self.balance_or_zero(&receiver).add(&minted);

        self.allow(balance.handle(), &receiver);
        self.allow(balance.handle(), &env::current_account_id());
        self.balances.insert(&receiver, &balance);
        self.total_minted += amount.0;

        log!("Minted {} to {}", amount.0, receiver);
    }

    // ==================== OPERATOR DELEGATION ====================

    /// Authorize `spender` to pull from the caller's balance until
    /// `expires_at` (nanoseconds). The delegation itself is public.
    pub fn set_operator(&mut self, spender: AccountId, expires_at: U64) {
        let holder = env::predecessor_account_id();
        self.operators.insert(&(holder.clone(), spender.clone()), &expires_at.0);
        log!("Operator {} set for {} until {}", spender, holder, expires_at.0);
    }

    pub fn is_operator(&self, holder: AccountId, spender: AccountId) -> bool {
        self.operators
            .get(&(holder, spender))
            .map(|expires_at| expires_at > env::block_timestamp())
            .unwrap_or(false)
    }

    // ==================== TRANSFERS ====================

    /// Pull `amount` from `from` to `to`. The caller must hold a live
    /// operator delegation from `from`; that check is the one hard failure.
    /// Insufficiency clamps the moved amount to an encrypted zero.
    pub fn confidential_transfer_from(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Cipher64,
    ) -> Cipher64 {
        let caller = env::predecessor_account_id();
        assert!(self.is_operator(from.clone(), caller), "{}", ERR_NO_OPERATOR);
        self.internal_transfer(&from, &to, &amount)
    }

    /// Push `amount` from the caller's own balance to `to`.
    pub fn confidential_transfer(&mut self, to: AccountId, amount: Cipher64) -> Cipher64 {
        let from = env::predecessor_account_id();
        self.internal_transfer(&from, &to, &amount)
    }

    // ==================== VIEWS ====================

    /// Sealed balance; an encrypted zero for unknown accounts. Decrypt
    /// rights are a matter of the ACL, not of this call.
    pub fn confidential_balance_of(&self, account: AccountId) -> Cipher64 {
        self.balance_or_zero(&account)
    }

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

    pub fn get_owner(&self) -> AccountId {
        self.owner.clone()
    }

    pub fn token_name(&self) -> String {
        self.name.clone()
    }

    pub fn token_symbol(&self) -> String {
        self.symbol.clone()
    }

    pub fn total_minted(&self) -> U64 {
        U64(self.total_minted)
    }

    // ==================== INTERNAL ====================

    /// Clamp-to-zero transfer: moves all of `amount` or none of it, decided
    /// obliviously over ciphertexts.
    fn internal_transfer(&mut self, from: &AccountId, to: &AccountId, amount: &Cipher64) -> Cipher64 {
        let from_balance = self.balance_or_zero(from);
        let to_balance = self.balance_or_zero(to);

        let zero = Cipher64::zero(&amount.handle());
        let transferred = select(&amount.le(&from_balance), amount, &zero);

        let new_from = from_balance.sub(&transferred);
        let new_to = to_balance.add(&transferred);
        self.balances.insert(from, &new_from);
        self.balances.insert(to, &new_to);

        let token = env::current_account_id();
        self.allow(new_from.handle(), from);
        self.allow(new_from.handle(), &token);
        self.allow(new_to.handle(), to);
        self.allow(new_to.handle(), &token);
        self.allow(transferred.handle(), from);
        self.allow(transferred.handle(), to);
        self.allow(transferred.handle(), &env::predecessor_account_id());

        let event = ConfidentialTransferEvent {
            from,
            to,
            amount_handle: transferred.handle_hex(),
        };
        env::log_str(&format!(
            "EVENT_JSON:{{\"standard\":\"confidential-token\",\"version\":\"1.0.0\",\"event\":\"confidential_transfer\",\"data\":[{}]}}",
            serde_json::to_string(&event).unwrap_or_default()
        ));

        transferred
    }

    fn balance_or_zero(&self, account: &AccountId) -> Cipher64 {
        self.balances.get(account).unwrap_or_else(|| {
            let seed = format!("{}:balance:{}", env::current_account_id(), account);
            Cipher64::zero(seed.as_bytes())
        })
    }

    fn allow(&mut self, handle: Handle, account: &AccountId) {
        let mut principals = self.acl.get(&handle).unwrap_or_default();
        if !principals.contains(account) {
            principals.push(account.clone());
            self.acl.insert(&handle, &principals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::VMContextBuilder;
    use near_sdk::testing_env;

    fn token_account() -> AccountId {
        "token.near".parse().unwrap()
    }

    fn context(predecessor: AccountId) -> VMContextBuilder {
        let mut builder = VMContextBuilder::new();
        builder
            .current_account_id(token_account())
            .predecessor_account_id(predecessor)
            .block_timestamp(1_000_000_000);
        builder
    }

    fn new_token(owner: &AccountId) -> ConfidentialToken {
        ConfidentialToken::new(owner.clone(), "Confidential Token".into(), "CTKN".into())
    }

    #[test]
    fn mint_credits_sealed_balance() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        testing_env!(context(owner.clone()).build());

        let mut token = new_token(&owner);
        token.mint(bob.clone(), U64(1_000_000));

        let balance = token.confidential_balance_of(bob.clone());
        assert_eq!(balance.decrypt(), 1_000_000);
        assert!(token.has_decrypt_access(balance.handle_hex(), bob));
        assert_eq!(token.total_minted(), U64(1_000_000));
    }

    #[test]
    #[should_panic(expected = "ConfidentialToken: owner only")]
    fn mint_is_owner_only() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        testing_env!(context(bob.clone()).build());

        let mut token = new_token(&owner);
        token.mint(bob, U64(1));
    }

    #[test]
    fn operator_delegation_expires() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        let spender: AccountId = "tipjar.near".parse().unwrap();
        testing_env!(context(bob.clone()).build());

        let mut token = new_token(&owner);
        assert!(!token.is_operator(bob.clone(), spender.clone()));

        token.set_operator(spender.clone(), U64(2_000_000_000));
        assert!(token.is_operator(bob.clone(), spender.clone()));

        // past the expiry the delegation is dead
        testing_env!(context(bob.clone()).block_timestamp(3_000_000_000).build());
        assert!(!token.is_operator(bob, spender));
    }

    #[test]
    fn transfer_from_moves_the_amount_when_covered() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        let tipjar: AccountId = "tipjar.near".parse().unwrap();
        testing_env!(context(owner.clone()).build());

        let mut token = new_token(&owner);
        token.mint(bob.clone(), U64(1_000_000));

        testing_env!(context(bob.clone()).build());
        token.set_operator(tipjar.clone(), U64(u64::MAX));

        testing_env!(context(tipjar.clone()).build());
        let amount = Cipher64::seal(123_456, b"tip");
        let actual = token.confidential_transfer_from(bob.clone(), tipjar.clone(), amount);

        assert_eq!(actual.decrypt(), 123_456);
        assert_eq!(token.confidential_balance_of(bob).decrypt(), 1_000_000 - 123_456);
        assert_eq!(token.confidential_balance_of(tipjar).decrypt(), 123_456);
    }

    #[test]
    fn transfer_from_clamps_to_zero_when_uncovered() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        let tipjar: AccountId = "tipjar.near".parse().unwrap();
        testing_env!(context(owner.clone()).build());

        let mut token = new_token(&owner);
        token.mint(bob.clone(), U64(1));

        testing_env!(context(bob.clone()).build());
        token.set_operator(tipjar.clone(), U64(u64::MAX));

        // requesting 2 against a balance of 1 moves nothing, successfully
        testing_env!(context(tipjar.clone()).build());
        let amount = Cipher64::seal(2, b"tip");
        let actual = token.confidential_transfer_from(bob.clone(), tipjar.clone(), amount);

        assert_eq!(actual.decrypt(), 0);
        assert_eq!(token.confidential_balance_of(bob).decrypt(), 1);
        assert_eq!(token.confidential_balance_of(tipjar).decrypt(), 0);
    }

    #[test]
    #[should_panic(expected = "ConfidentialToken: no operator delegation")]
    fn transfer_from_requires_delegation() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        let tipjar: AccountId = "tipjar.near".parse().unwrap();
        testing_env!(context(owner.clone()).build());

        let mut token = new_token(&owner);
        token.mint(bob.clone(), U64(1_000_000));

        testing_env!(context(tipjar.clone()).build());
        let amount = Cipher64::seal(100, b"tip");
        token.confidential_transfer_from(bob, tipjar, amount);
    }

    #[test]
    fn transfer_refreshes_grants_on_new_handles() {
        let owner: AccountId = "issuer.near".parse().unwrap();
        let bob: AccountId = "bob.near".parse().unwrap();
        let alice: AccountId = "alice.near".parse().unwrap();
        testing_env!(context(owner.clone()).build());

        let mut token = new_token(&owner);
        token.mint(bob.clone(), U64(500));

        testing_env!(context(bob.clone()).build());
        let amount = Cipher64::seal(200, b"pay");
        let actual = token.confidential_transfer(alice.clone(), amount);

        assert!(token.has_decrypt_access(actual.handle_hex(), bob.clone()));
        assert!(token.has_decrypt_access(actual.handle_hex(), alice.clone()));
        let alice_balance = token.confidential_balance_of(alice.clone());
        assert!(token.has_decrypt_access(alice_balance.handle_hex(), alice));
        let bob_balance = token.confidential_balance_of(bob.clone());
        assert!(token.has_decrypt_access(bob_balance.handle_hex(), bob));
    }
}
