use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use bankledger_core::{AccountId, AccountNumber, TransactionId, UserId};
use bankledger_ledger::{Account, AccountType, NewAccount, NewTransaction, TransactionRecord};

use super::{AccountStore, LedgerStore, StoreError, TransactionLog, UnitOfWork};

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    by_number: HashMap<AccountNumber, AccountId>,
    owner_types: HashSet<(UserId, AccountType)>,
    transactions: BTreeMap<TransactionId, TransactionRecord>,
}

impl LedgerState {
    fn account_by_number(&self, number: &AccountNumber) -> Option<&Account> {
        self.by_number.get(number).and_then(|id| self.accounts.get(id))
    }

    fn check_unique(&self, account: &Account) -> Result<(), StoreError> {
        if self.by_number.contains_key(&account.number) {
            return Err(StoreError::DuplicateAccountNumber(account.number.clone()));
        }
        if self.owner_types.contains(&(account.owner, account.account_type)) {
            return Err(StoreError::AccountTypeExists(account.account_type));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Shared {
    state: RwLock<LedgerState>,
    row_locks: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
    next_account_id: AtomicI64,
    next_transaction_id: AtomicI64,
    lock_timeout: Duration,
}

impl Shared {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::backend("ledger state lock poisoned"))
    }

    fn row_lock(&self, id: AccountId) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::backend("row lock table poisoned"))?;
        Ok(locks.entry(id).or_default().clone())
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev and the default service mode. Each account has its
/// own async mutex standing in for a row lock; committed state lives behind a
/// single `RwLock` that is never held across an `.await`.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(LedgerState::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_account_id: AtomicI64::new(1),
                next_transaction_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.shared.lock_timeout
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(InMemoryUnit {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            saved: BTreeMap::new(),
            created: Vec::new(),
            records: Vec::new(),
        }))
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.shared
            .read()?
            .account_by_number(number)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        let state = self.shared.read()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.shared
            .read()?
            .transactions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self
            .shared
            .read()?
            .transactions
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn transactions_for_owner(
        &self,
        owner: UserId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let state = self.shared.read()?;
        Ok(state
            .transactions
            .values()
            .filter(|t| {
                state
                    .accounts
                    .get(&t.account_id)
                    .is_some_and(|a| a.owner == owner)
            })
            .cloned()
            .collect())
    }
}

/// Staged writes plus the row locks they were made under.
///
/// Dropping the unit without committing discards everything.
struct InMemoryUnit {
    shared: Arc<Shared>,
    guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    saved: BTreeMap<AccountId, Account>,
    created: Vec<Account>,
    records: Vec<TransactionRecord>,
}

impl InMemoryUnit {
    fn staged(&self, number: &AccountNumber) -> Option<&Account> {
        self.created
            .iter()
            .find(|a| &a.number == number)
            .or_else(|| self.saved.values().find(|a| &a.number == number))
    }

    fn committed(&self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.shared
            .read()?
            .account_by_number(number)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl AccountStore for InMemoryUnit {
    async fn find(&mut self, number: &AccountNumber) -> Result<Account, StoreError> {
        if let Some(account) = self.staged(number) {
            return Ok(account.clone());
        }
        self.committed(number)
    }

    async fn find_for_update(&mut self, number: &AccountNumber) -> Result<Account, StoreError> {
        if let Some(account) = self.staged(number) {
            return Ok(account.clone());
        }

        let id = self.committed(number)?.id;
        if !self.guards.contains_key(&id) {
            let lock = self.shared.row_lock(id)?;
            let guard = tokio::time::timeout(self.shared.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::Busy(format!(
                        "lock on account {number} not acquired within {:?}",
                        self.shared.lock_timeout
                    ))
                })?;
            self.guards.insert(id, guard);
        }

        // Re-read under the lock: the previous holder may have committed.
        self.committed(number)
    }

    async fn save(&mut self, account: &Account) -> Result<(), StoreError> {
        if let Some(created) = self.created.iter_mut().find(|a| a.id == account.id) {
            *created = account.clone();
            return Ok(());
        }
        if !self.guards.contains_key(&account.id) {
            return Err(StoreError::backend(format!(
                "account {} saved without holding its lock",
                account.number
            )));
        }
        self.saved.insert(account.id, account.clone());
        Ok(())
    }

    async fn create(&mut self, account: NewAccount) -> Result<Account, StoreError> {
        if let Some(taken) = self.created.iter().find(|a| a.number == account.number) {
            return Err(StoreError::DuplicateAccountNumber(taken.number.clone()));
        }
        if self
            .created
            .iter()
            .any(|a| a.owner == account.owner && a.account_type == account.account_type)
        {
            return Err(StoreError::AccountTypeExists(account.account_type));
        }

        let id = AccountId::from_raw(self.shared.next_account_id.fetch_add(1, Ordering::SeqCst));
        let account = account.into_account(id);
        self.shared.read()?.check_unique(&account)?;

        self.created.push(account.clone());
        Ok(account)
    }
}

#[async_trait]
impl TransactionLog for InMemoryUnit {
    async fn append(&mut self, entry: NewTransaction) -> Result<TransactionRecord, StoreError> {
        let id = TransactionId::from_raw(
            self.shared
                .next_transaction_id
                .fetch_add(1, Ordering::SeqCst),
        );
        let record = entry.into_record(id);
        self.records.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryUnit {
            shared,
            guards,
            saved,
            created,
            records,
        } = *self;

        {
            let mut state = shared
                .state
                .write()
                .map_err(|_| StoreError::backend("ledger state lock poisoned"))?;

            // Another unit may have claimed the number or type since `create`.
            for account in &created {
                state.check_unique(account)?;
            }

            for account in created {
                state.by_number.insert(account.number.clone(), account.id);
                state.owner_types.insert((account.owner, account.account_type));
                state.accounts.insert(account.id, account);
            }
            for (id, account) in saved {
                state.accounts.insert(id, account);
            }
            for record in records {
                state.transactions.insert(record.id, record);
            }
        }

        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
