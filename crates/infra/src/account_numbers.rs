//! Account number generation.
//!
//! Generators only propose candidates. Uniqueness is settled by the store's
//! `create`, and the engine retries on `DuplicateAccountNumber`.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;

use bankledger_core::AccountNumber;

pub trait AccountNumberGenerator: Send + Sync {
    fn next_candidate(&self) -> AccountNumber;
}

/// Uniformly random 9-digit numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAccountNumbers;

impl RandomAccountNumbers {
    fn draw() -> AccountNumber {
        let value = rand::thread_rng().gen_range(0..AccountNumber::SPACE);
        match AccountNumber::from_value(value) {
            Ok(number) => number,
            // gen_range stays below SPACE
            Err(_) => unreachable!("value {value} is within the account number space"),
        }
    }
}

impl AccountNumberGenerator for RandomAccountNumbers {
    fn next_candidate(&self) -> AccountNumber {
        Self::draw()
    }
}

/// Hands out a scripted sequence first, then falls back to random numbers.
///
/// Lets tests force collisions deterministically.
#[derive(Debug, Default)]
pub struct FixedAccountNumbers {
    queue: Mutex<VecDeque<AccountNumber>>,
}

impl FixedAccountNumbers {
    pub fn new(numbers: impl IntoIterator<Item = AccountNumber>) -> Self {
        Self {
            queue: Mutex::new(numbers.into_iter().collect()),
        }
    }
}

impl AccountNumberGenerator for FixedAccountNumbers {
    fn next_candidate(&self) -> AccountNumber {
        self.queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(RandomAccountNumbers::draw)
    }
}
