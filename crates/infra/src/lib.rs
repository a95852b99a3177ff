//! Infrastructure layer: storage backends, the ledger engine, notification
//! transport, configuration.

pub mod account_numbers;
pub mod config;
pub mod contacts;
pub mod engine;
pub mod event_bus;
pub mod notifier;
pub mod store;

pub use account_numbers::{AccountNumberGenerator, FixedAccountNumbers, RandomAccountNumbers};
pub use config::{ConfigError, LedgerConfig, NotifyBus};
pub use contacts::{ContactDirectory, InMemoryContactDirectory};
pub use engine::{LedgerEngine, LedgerError, MutationReceipt};
pub use notifier::{BusNotifier, NoopNotifier, Notifier};
pub use store::{
    AccountStore, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError,
    TransactionLog, UnitOfWork,
};

#[cfg(test)]
mod integration_tests;
