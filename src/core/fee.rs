//! Fee schedule
//!
//! The protocol's fee and reward constants are exact big-integer values
//! derived from fixed bit-width bases (2^64 and 2^80) and small divisors.
//! [`compute_fee_schedule`] builds the whole table once; callers thread
//! the resulting read-only [`FeeSchedule`] to wherever admission policy
//! needs it.

use num_bigint::BigUint;

/// Read-only table of protocol fee and reward constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Per-execution-step fee: 2^64 / 64.
    pub step: BigUint,
    /// Flat transaction fee: 2^64.
    pub tx: BigUint,
    /// Contract creation fee: 2^64.
    pub contract: BigUint,
    /// Per-word memory fee: 2^64 / 4.
    pub memory: BigUint,
    /// Data access fee: 2^64 / 16.
    pub data: BigUint,
    /// Cryptographic operation fee: 2^64 / 16.
    pub crypto: BigUint,
    /// External call fee: 2^64 / 16.
    pub extro: BigUint,
    /// Mining rewards per issuance period: 2^80 times 1024, 512, 256
    /// and 128 in order.
    pub period_rewards: [BigUint; 4],
}

/// Compute the fee table. Pure: the same values every call, no global
/// state.
pub fn compute_fee_schedule() -> FeeSchedule {
    let b64 = BigUint::from(2u32).pow(64);
    let b80 = BigUint::from(2u32).pow(80);

    FeeSchedule {
        step: &b64 / 64u32,
        tx: b64.clone(),
        contract: b64.clone(),
        memory: &b64 / 4u32,
        data: &b64 / 16u32,
        crypto: &b64 / 16u32,
        extro: &b64 / 16u32,
        period_rewards: [
            &b80 * 1024u32,
            &b80 * 512u32,
            &b80 * 256u32,
            &b80 * 128u32,
        ],
    }
}
