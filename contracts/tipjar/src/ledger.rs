//! Confidential balance ledger: one sealed credited balance per creator,
//! mutated only through the clamped credit/debit primitives below.

use cipher64::{select, Cipher64};
use near_sdk::borsh::{BorshDeserialize, BorshSerialize};
use near_sdk::{env, near_bindgen, AccountId};

use crate::{Tipjar, TipjarExt, ERR_NOT_REGISTERED};

/// Per-creator ledger state. Created once at registration, never destroyed.
/// `registered` is monotonic; `credited` is assigned only by credit/debit.
#[derive(BorshDeserialize, BorshSerialize, Clone)]
#[borsh(crate = "near_sdk::borsh")]
pub struct CreatorAccount {
    pub registered: bool,
    pub credited: Cipher64,
}

#[near_bindgen]
impl Tipjar {
    /// Sealed credited balance. Decryption authorization is governed by the
    /// capability grants, not by this call.
    pub fn get_encrypted_balance(&self, creator: AccountId) -> Cipher64 {
        self.account_of(&creator).credited
    }
}

impl Tipjar {
    pub(crate) fn account_of(&self, creator: &AccountId) -> CreatorAccount {
        self.creators
            .get(creator)
            .unwrap_or_else(|| env::panic_str(ERR_NOT_REGISTERED))
    }

    /// Add `amount` to the credited balance. Credit never clamps its input;
    /// clamping already happened upstream at the token transfer. Returns the
    /// amount unchanged as the operation's outcome.
    pub(crate) fn credit(&mut self, creator: &AccountId, amount: &Cipher64) -> Cipher64 {
        let mut account = self.account_of(creator);

        let new_balance = account.credited.add(amount);
        self.grant_balance(new_balance.handle(), creator);

        account.credited = new_balance;
        self.creators.insert(creator, &account);

        amount.clone()
    }

    /// Clamped subtraction: `actual = select(requested <= credited,
    /// requested, credited)`, evaluated over ciphertexts so that neither the
    /// branch taken nor any intermediate reveals whether `requested`
    /// exceeded the balance. Returns what actually moved.
    pub(crate) fn debit(&mut self, creator: &AccountId, requested: &Cipher64) -> Cipher64 {
        let mut account = self.account_of(creator);

        let covered = requested.le(&account.credited);
        let actual = select(&covered, requested, &account.credited);
        let new_balance = account.credited.sub(&actual);

        self.grant_balance(new_balance.handle(), creator);
        self.grant_balance(actual.handle(), creator);

        account.credited = new_balance;
        self.creators.insert(creator, &account);

        actual
    }
}
