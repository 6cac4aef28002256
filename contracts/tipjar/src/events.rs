//! Domain events in NEP-297 `EVENT_JSON` form. An event fires only on full
//! success of its originating call; amounts appear solely as ciphertext
//! handles.

use near_sdk::serde::Serialize;
use near_sdk::{env, AccountId};

const STANDARD: &str = "tipjar";
const VERSION: &str = "1.0.0";

#[derive(Serialize)]
#[serde(crate = "near_sdk::serde")]
struct CreatorRegistered<'a> {
    creator: &'a AccountId,
}

#[derive(Serialize)]
#[serde(crate = "near_sdk::serde")]
struct TipReceived<'a> {
    supporter: &'a AccountId,
    creator: &'a AccountId,
    amount_handle: &'a str,
}

#[derive(Serialize)]
#[serde(crate = "near_sdk::serde")]
struct WithdrawRequested<'a> {
    creator: &'a AccountId,
    amount_handle: &'a str,
}

fn emit<T: Serialize>(event: &str, data: &T) {
    let payload = serde_json::json!({
        "standard": STANDARD,
        "version": VERSION,
        "event": event,
        "data": [data],
    });
    env::log_str(&format!("EVENT_JSON:{}", payload));
}

pub(crate) fn emit_creator_registered(creator: &AccountId) {
    emit("creator_registered", &CreatorRegistered { creator });
}

pub(crate) fn emit_tip_received(supporter: &AccountId, creator: &AccountId, amount_handle: &str) {
    emit(
        "tip_received",
        &TipReceived {
            supporter,
            creator,
            amount_handle,
        },
    );
}

pub(crate) fn emit_withdraw_requested(creator: &AccountId, amount_handle: &str) {
    emit(
        "withdraw_requested",
        &WithdrawRequested {
            creator,
            amount_handle,
        },
    );
}
