//! # Tipjar — confidential creator-tipping settlement contract
//!
//! Supporters tip creators in sealed amounts; creators accumulate a sealed
//! credited balance and withdraw against it. Every insufficiency check is an
//! oblivious `select` over ciphertexts, so success or failure of a call never
//! reveals anything about a balance — a tip of zero because the supporter was
//! broke is indistinguishable from a tip of zero on purpose.
//!
//! ## Flows
//! - Tip: registration gate → pull from the token collaborator (which clamps
//!   to zero on insufficiency) → credit the ledger with whatever actually
//!   moved → event.
//! - Withdraw: registration gate → clamped ledger debit → push the actual
//!   amount from custody to the creator → event. A failed token leg restores
//!   the debited amount in the callback.
//!
//! Hard failures are public preconditions only: registration, input-proof
//! binding, operator delegation on the token.

use cipher64::{Cipher64, Handle, SealedInput};
use near_sdk::borsh::{BorshDeserialize, BorshSerialize};
use near_sdk::collections::LookupMap;
use near_sdk::{
    env, ext_contract, near_bindgen, AccountId, Gas, IntoStorageKey, PanicOnDefault, Promise,
    PromiseError,
};

mod acl;
mod events;
mod ledger;

pub use ledger::CreatorAccount;

/// Gas for cross-contract calls to the token collaborator
const GAS_FOR_TOKEN_TRANSFER: Gas = Gas::from_tgas(30);
const GAS_FOR_CALLBACK: Gas = Gas::from_tgas(20);

pub const ERR_ALREADY_REGISTERED: &str = "Tipjar: already registered";
pub const ERR_NOT_REGISTERED: &str = "Tipjar: creator not registered";
pub const ERR_NOT_AUTHORIZED: &str = "Tipjar: not authorized";
pub const ERR_INVALID_PROOF: &str = "Tipjar: invalid ciphertext proof";
pub const ERR_TOKEN_TRANSFER_FAILED: &str = "Tipjar: token transfer failed";

/// External interface for the confidential token collaborator
#[ext_contract(ext_token)]
pub trait ConfidentialTokenSource {
    fn confidential_transfer_from(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Cipher64,
    ) -> Cipher64;

    fn confidential_transfer(&mut self, to: AccountId, amount: Cipher64) -> Cipher64;
}

/// Storage prefixes are namespaced per contract so the workspace's contracts
/// can share one mocked storage in tests.
pub enum StorageKey {
    Creators,
    Acl,
}

impl IntoStorageKey for StorageKey {
    fn into_storage_key(self) -> Vec<u8> {
        match self {
            StorageKey::Creators => b"tipjar:creators".to_vec(),
            StorageKey::Acl => b"tipjar:acl".to_vec(),
        }
    }
}

#[near_bindgen]
#[derive(BorshDeserialize, BorshSerialize, PanicOnDefault)]
#[borsh(crate = "near_sdk::borsh")]
pub struct Tipjar {
    /// Explicit authorizer for the recovery path; no ambient singleton
    owner: AccountId,
    /// Confidential token collaborator
    token: AccountId,
    /// One account per creator, created on registration, never destroyed
    creators: LookupMap<AccountId, CreatorAccount>,
    /// Ciphertext handle -> principals permitted to decrypt it
    acl: LookupMap<Handle, Vec<AccountId>>,
    /// Registration and call counts are public activity stats
    total_creators: u32,
    total_tips: u64,
    total_withdrawals: u64,
}

#[near_bindgen]
impl Tipjar {
    #[init]
    pub fn new(owner: AccountId, token: AccountId) -> Self {
        Self {
            owner,
            token,
            creators: LookupMap::new(StorageKey::Creators),
            acl: LookupMap::new(StorageKey::Acl),
            total_creators: 0,
            total_tips: 0,
            total_withdrawals: 0,
        }
    }

    // ==================== CREATOR REGISTRY ====================

    /// Register the caller as a creator with a sealed credited balance of
    /// zero. Registration is public and monotonic; it is the sole admission
    /// gate for all ledger mutations.
    pub fn register_creator(&mut self) {
        let caller = env::predecessor_account_id();
        assert!(
            self.creators.get(&caller).is_none(),
            "{}",
            ERR_ALREADY_REGISTERED
        );

        let seed = format!("{}:credited:{}", env::current_account_id(), caller);
        let zero = Cipher64::zero(seed.as_bytes());
        self.grant_balance(zero.handle(), &caller);

        self.creators.insert(
            &caller,
            &CreatorAccount {
                registered: true,
                credited: zero,
            },
        );
        self.total_creators += 1;

        events::emit_creator_registered(&caller);
    }

    pub fn is_registered(&self, creator: AccountId) -> bool {
        self.creators
            .get(&creator)
            .map(|account| account.registered)
            .unwrap_or(false)
    }

    // ==================== TIP FLOW ====================

    /// Tip `creator` with a sealed amount. The token collaborator clamps the
    /// transferred amount to zero when the supporter's balance or delegation
    /// does not cover it, and only hard-fails when no delegation exists at
    /// all; the creator is credited with whatever truly moved.
    pub fn tip_creator(&mut self, creator: AccountId, amount: SealedInput) -> Promise {
        let supporter = env::predecessor_account_id();
        assert!(self.is_registered(creator.clone()), "{}", ERR_NOT_REGISTERED);

        let requested = self.open_input(&amount, &supporter);

        ext_token::ext(self.token.clone())
            .with_static_gas(GAS_FOR_TOKEN_TRANSFER)
            .confidential_transfer_from(supporter.clone(), env::current_account_id(), requested)
            .then(
                Self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_CALLBACK)
                    .on_tip_transfer(supporter, creator),
            )
    }

    /// Credits the ledger with the actual-transferred ciphertext. A failed
    /// token call aborts here: no credit, no event.
    #[private]
    pub fn on_tip_transfer(
        &mut self,
        supporter: AccountId,
        creator: AccountId,
        #[callback_result] transferred: Result<Cipher64, PromiseError>,
    ) {
        let actual =
            transferred.unwrap_or_else(|_| env::panic_str(ERR_TOKEN_TRANSFER_FAILED));

        let outcome = self.credit(&creator, &actual);
        self.total_tips += 1;

        events::emit_tip_received(&supporter, &creator, &outcome.handle_hex());
    }

    // ==================== WITHDRAW FLOW ====================

    /// Withdraw a sealed amount against the caller's credited balance. A
    /// request exceeding the balance resolves to "withdraw everything
    /// available" — never a failure.
    pub fn request_withdraw(&mut self, amount: SealedInput) -> Promise {
        let creator = env::predecessor_account_id();
        assert!(self.is_registered(creator.clone()), "{}", ERR_NOT_REGISTERED);

        let requested = self.open_input(&amount, &creator);
        let actual = self.debit(&creator, &requested);

        ext_token::ext(self.token.clone())
            .with_static_gas(GAS_FOR_TOKEN_TRANSFER)
            .confidential_transfer(creator.clone(), actual.clone())
            .then(
                Self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_CALLBACK)
                    .on_withdraw_transfer(creator, actual),
            )
    }

    /// Settles the withdraw after the token leg. On failure the debited
    /// ciphertext is credited back, so the flow as a whole is all-or-nothing.
    #[private]
    pub fn on_withdraw_transfer(
        &mut self,
        creator: AccountId,
        actual: Cipher64,
        #[callback_result] result: Result<Cipher64, PromiseError>,
    ) {
        match result {
            Ok(_) => {
                self.total_withdrawals += 1;
                events::emit_withdraw_requested(&creator, &actual.handle_hex());
            }
            Err(_) => {
                self.credit(&creator, &actual);
                env::log_str(&format!(
                    "Withdraw transfer failed for {}, credited balance restored",
                    creator
                ));
            }
        }
    }

    // ==================== VIEWS ====================

    pub fn token_address(&self) -> AccountId {
        self.token.clone()
    }

    pub fn get_owner(&self) -> AccountId {
        self.owner.clone()
    }

    /// (total creators, total tips, total withdrawals)
    pub fn get_stats(&self) -> (u32, u64, u64) {
        (self.total_creators, self.total_tips, self.total_withdrawals)
    }

    // ==================== INTERNAL ====================

    fn open_input(&self, input: &SealedInput, user: &AccountId) -> Cipher64 {
        input
            .open(env::current_account_id().as_bytes(), user.as_bytes())
            .unwrap_or_else(|_| env::panic_str(ERR_INVALID_PROOF))
    }
}
