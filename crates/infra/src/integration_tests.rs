//! Integration tests for the full mutation pipeline.
//!
//! Tests: LedgerEngine → UnitOfWork (in-memory store) → Notifier → EventBus
//!
//! Verifies:
//! - The five reference scenarios (deposit, overdraft, transfer, self-transfer,
//!   racing withdrawals)
//! - Conservation and non-negativity under concurrent transfers
//! - Atomicity when a write or the commit fails mid-unit
//! - Lock ordering (A→B racing B→A) and lock timeouts

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use bankledger_core::{AccountId, AccountNumber, TransactionId, UserId};
use bankledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use bankledger_ledger::{
    Account, AccountType, NewAccount, NewTransaction, TransactionKind, TransactionRecord,
};

use crate::account_numbers::FixedAccountNumbers;
use crate::contacts::InMemoryContactDirectory;
use crate::engine::{LedgerEngine, LedgerError};
use crate::notifier::{BusNotifier, NoopNotifier};
use crate::store::{
    AccountStore, InMemoryLedgerStore, LedgerStore, StoreError, TransactionLog, UnitOfWork,
};

type Engine<S> = LedgerEngine<S, NoopNotifier>;

fn engine() -> Arc<Engine<InMemoryLedgerStore>> {
    Arc::new(LedgerEngine::new(InMemoryLedgerStore::new(), NoopNotifier))
}

async fn open<S: LedgerStore>(
    engine: &Engine<S>,
    owner: UserId,
    kind: AccountType,
    balance: i64,
) -> Account {
    engine.open_account(owner, kind, balance).await.unwrap()
}

async fn balance_of<S: LedgerStore>(engine: &Engine<S>, account: &Account) -> i64 {
    engine
        .balance(account.number.as_str())
        .await
        .unwrap()
        .minor_units()
}

async fn records_of<S: LedgerStore>(engine: &Engine<S>, account: &Account) -> Vec<TransactionRecord> {
    engine.transactions_for(account.number.as_str()).await.unwrap()
}

// Scenarios

#[tokio::test(flavor = "multi_thread")]
async fn deposit_into_empty_account() {
    let engine = engine();
    let a = open(&engine, UserId::new(), AccountType::Savings, 0).await;

    let receipt = engine.deposit(a.number.as_str(), 100).await.unwrap();

    assert_eq!(receipt.balance.minor_units(), 100);
    assert_eq!(balance_of(&engine, &a).await, 100);

    let records = records_of(&engine, &a).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, TransactionKind::Deposit);
    assert_eq!(records[0].amount.minor_units(), 100);
    assert_eq!(records[0], receipt.transactions[0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn overdraft_is_rejected_without_side_effects() {
    let engine = engine();
    let owner = UserId::new();
    let a = open(&engine, owner, AccountType::Checking, 100).await;
    let before = records_of(&engine, &a).await;

    let err = engine.withdraw(a.number.as_str(), owner, 150).await.unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_eq!(balance_of(&engine, &a).await, 100);
    assert_eq!(records_of(&engine, &a).await, before);
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_moves_money_and_records_both_legs() {
    let engine = engine();
    let alice = UserId::new();
    let bob = UserId::new();
    let a = open(&engine, alice, AccountType::Savings, 200).await;
    let b = open(&engine, bob, AccountType::Savings, 10).await;

    let receipt = engine
        .transfer(a.number.as_str(), b.number.as_str(), alice, 50)
        .await
        .unwrap();

    assert_eq!(receipt.balance.minor_units(), 150);
    assert_eq!(balance_of(&engine, &a).await, 150);
    assert_eq!(balance_of(&engine, &b).await, 60);

    let [out, inc] = <[TransactionRecord; 2]>::try_from(receipt.transactions).unwrap();
    assert_eq!(out.account_id, a.id);
    assert_eq!(inc.account_id, b.id);
    assert!(out.is_counterpart_of(&inc));
    assert_eq!(out.from_account_id, Some(a.id));
    assert_eq!(out.to_account_id, Some(b.id));
    assert_eq!(out.signed_amount(), -50);
    assert_eq!(inc.signed_amount(), 50);
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_to_same_account_is_rejected() {
    let engine = engine();
    let owner = UserId::new();
    let a = open(&engine, owner, AccountType::Savings, 100).await;

    let err = engine
        .transfer(a.number.as_str(), a.number.as_str(), owner, 10)
        .await
        .unwrap_err();

    assert_eq!(err, LedgerError::SameAccount);
    assert_eq!(balance_of(&engine, &a).await, 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn racing_withdrawals_cannot_both_succeed() {
    let engine = engine();
    let owner = UserId::new();
    let a = open(&engine, owner, AccountType::Checking, 150).await;

    let first = {
        let engine = engine.clone();
        let no = a.number.clone();
        tokio::spawn(async move { engine.withdraw(no.as_str(), owner, 100).await })
    };
    let second = {
        let engine = engine.clone();
        let no = a.number.clone();
        tokio::spawn(async move { engine.withdraw(no.as_str(), owner, 80).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let succeeded: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(succeeded.len(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(LedgerError::InsufficientBalance { .. })
    )));

    let final_balance = balance_of(&engine, &a).await;
    assert!(final_balance == 50 || final_balance == 70);

    let withdrawals = records_of(&engine, &a)
        .await
        .into_iter()
        .filter(|r| r.kind == TransactionKind::Withdrawal)
        .count();
    assert_eq!(withdrawals, 1);
}

// Preconditions

#[tokio::test(flavor = "multi_thread")]
async fn withdraw_merges_missing_and_foreign_accounts() {
    let engine = engine();
    let owner = UserId::new();
    let a = open(&engine, owner, AccountType::Savings, 100).await;

    assert_eq!(
        engine.withdraw(a.number.as_str(), UserId::new(), 10).await,
        Err(LedgerError::AccessDenied)
    );
    assert_eq!(
        engine.withdraw("999999999", owner, 10).await,
        Err(LedgerError::AccessDenied)
    );
    assert_eq!(
        engine.withdraw(a.number.as_str(), owner, 0).await.unwrap_err().code(),
        "invalid_amount"
    );
    assert_eq!(balance_of(&engine, &a).await, 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_reports_first_failing_precondition() {
    let engine = engine();
    let alice = UserId::new();
    let a = open(&engine, alice, AccountType::Savings, 20).await;
    let b = open(&engine, UserId::new(), AccountType::Savings, 0).await;

    // amount beats everything else
    let err = engine.transfer("999999999", "999999998", alice, -5).await.unwrap_err();
    assert_eq!(err.code(), "invalid_amount");

    // source ownership beats a missing destination
    let err = engine
        .transfer(b.number.as_str(), "999999998", alice, 5)
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::AccessDenied);

    // missing destination beats insufficient balance
    let err = engine
        .transfer(a.number.as_str(), "999999998", alice, 500)
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::AccountNotFound);

    let err = engine
        .transfer(a.number.as_str(), b.number.as_str(), alice, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

    assert_eq!(balance_of(&engine, &a).await, 20);
    assert_eq!(balance_of(&engine, &b).await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn deposit_to_unknown_account_is_not_found() {
    let engine = engine();
    assert_eq!(
        engine.deposit("000000000", 10).await,
        Err(LedgerError::AccountNotFound)
    );
    assert_eq!(engine.deposit("12ab", 10).await, Err(LedgerError::AccountNotFound));
}

// Properties

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_transfers_conserve_money_and_reconcile_with_log() {
    let engine = engine();
    let owners: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
    let mut accounts = Vec::new();
    for owner in &owners {
        accounts.push(open(&engine, *owner, AccountType::Checking, 1_000).await);
    }

    let mut tasks = Vec::new();
    for i in 0..120usize {
        let from = i % accounts.len();
        let to = (i * 7 + 1) % accounts.len();
        let amount = (i as i64 * 37) % 300 + 1;
        let engine = engine.clone();
        let from_no = accounts[from].number.clone();
        let to_no = accounts[to].number.clone();
        let caller = owners[from];
        tasks.push(tokio::spawn(async move {
            engine
                .transfer(from_no.as_str(), to_no.as_str(), caller, amount)
                .await
        }));
    }

    for task in tasks {
        match task.await.unwrap() {
            Ok(_)
            | Err(LedgerError::InsufficientBalance { .. })
            | Err(LedgerError::SameAccount) => {}
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }

    let mut total = 0;
    for account in &accounts {
        let balance = balance_of(&engine, account).await;
        assert!(balance >= 0);

        // The opening deposit is in the log, so the log alone explains the balance.
        let from_log: i64 = records_of(&engine, account)
            .await
            .iter()
            .map(TransactionRecord::signed_amount)
            .sum();
        assert_eq!(from_log, balance);
        total += balance;
    }
    assert_eq!(total, 4_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_transfer_record_has_exactly_one_counterpart() {
    let engine = engine();
    let alice = UserId::new();
    let bob = UserId::new();
    let a = open(&engine, alice, AccountType::Savings, 500).await;
    let b = open(&engine, bob, AccountType::Savings, 500).await;

    for amount in [10, 20, 30] {
        engine
            .transfer(a.number.as_str(), b.number.as_str(), alice, amount)
            .await
            .unwrap();
        engine
            .transfer(b.number.as_str(), a.number.as_str(), bob, amount)
            .await
            .unwrap();
    }

    let mut all = records_of(&engine, &a).await;
    all.extend(records_of(&engine, &b).await);
    let transfers: Vec<_> = all
        .iter()
        .filter(|r| r.kind == TransactionKind::Transfer)
        .collect();
    assert_eq!(transfers.len(), 12);

    for record in &transfers {
        let counterparts = transfers.iter().filter(|o| record.is_counterpart_of(o)).count();
        assert_eq!(counterparts, 1, "record {} is not paired", record.id);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn opposite_transfers_do_not_deadlock() {
    let engine = Arc::new(LedgerEngine::new(
        InMemoryLedgerStore::with_lock_timeout(Duration::from_secs(5)),
        NoopNotifier,
    ));
    let alice = UserId::new();
    let bob = UserId::new();
    let a = open(&engine, alice, AccountType::Savings, 1_000).await;
    let b = open(&engine, bob, AccountType::Savings, 1_000).await;

    let mut tasks = Vec::new();
    for i in 0..50 {
        let engine = engine.clone();
        let (from, to, caller) = if i % 2 == 0 {
            (a.number.clone(), b.number.clone(), alice)
        } else {
            (b.number.clone(), a.number.clone(), bob)
        };
        tasks.push(tokio::spawn(async move {
            engine.transfer(from.as_str(), to.as_str(), caller, 3).await
        }));
    }

    let all = tokio::time::timeout(Duration::from_secs(20), async {
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    })
    .await
    .expect("transfers deadlocked");

    assert!(all.iter().all(Result::is_ok));
    // 25 each way: a serial order of these nets to zero.
    assert_eq!(balance_of(&engine, &a).await, 1_000);
    assert_eq!(balance_of(&engine, &b).await, 1_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn held_lock_turns_into_busy_then_clears() {
    let engine = LedgerEngine::new(
        InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(50)),
        NoopNotifier,
    );
    let owner = UserId::new();
    let a = open(&engine, owner, AccountType::Savings, 100).await;

    let mut holder = engine.store().begin().await.unwrap();
    holder.find_for_update(&a.number).await.unwrap();

    let err = engine.withdraw(a.number.as_str(), owner, 10).await.unwrap_err();
    assert!(matches!(err, LedgerError::Busy(_)));
    assert!(err.is_retryable());

    holder.rollback().await.unwrap();
    let receipt = engine.withdraw(a.number.as_str(), owner, 10).await.unwrap();
    assert_eq!(receipt.balance.minor_units(), 90);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_reads_agree() {
    let engine = engine();
    let a = open(&engine, UserId::new(), AccountType::Savings, 321).await;

    let first = engine.balance(a.number.as_str()).await.unwrap();
    let second = engine.balance(a.number.as_str()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        records_of(&engine, &a).await,
        records_of(&engine, &a).await
    );
}

// Atomicity under injected failure

#[derive(Debug, Default, Clone)]
struct Faults {
    fail_save_of: Option<AccountNumber>,
    fail_commit: bool,
}

/// In-memory store whose units can be told to fail a save or the commit.
#[derive(Clone)]
struct FaultyStore {
    inner: InMemoryLedgerStore,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryLedgerStore::new(),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    fn inject(&self, faults: Faults) {
        *self.faults.lock().unwrap() = faults;
    }
}

struct FaultyUnit {
    inner: Box<dyn UnitOfWork>,
    faults: Faults,
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let faults = self.faults.lock().unwrap().clone();
        Ok(Box::new(FaultyUnit {
            inner: self.inner.begin().await?,
            faults,
        }))
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.inner.find_account(number).await
    }

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        self.inner.accounts_for_owner(owner).await
    }

    async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.inner.transaction(id).await
    }

    async fn transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.inner.transactions_for_account(account_id).await
    }

    async fn transactions_for_owner(
        &self,
        owner: UserId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.inner.transactions_for_owner(owner).await
    }
}

#[async_trait]
impl AccountStore for FaultyUnit {
    async fn find(&mut self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.inner.find(number).await
    }

    async fn find_for_update(&mut self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.inner.find_for_update(number).await
    }

    async fn save(&mut self, account: &Account) -> Result<(), StoreError> {
        if self.faults.fail_save_of.as_ref() == Some(&account.number) {
            return Err(StoreError::backend("injected write failure"));
        }
        self.inner.save(account).await
    }

    async fn create(&mut self, account: NewAccount) -> Result<Account, StoreError> {
        self.inner.create(account).await
    }
}

#[async_trait]
impl TransactionLog for FaultyUnit {
    async fn append(&mut self, entry: NewTransaction) -> Result<TransactionRecord, StoreError> {
        self.inner.append(entry).await
    }
}

#[async_trait]
impl UnitOfWork for FaultyUnit {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.faults.fail_commit {
            self.inner.rollback().await?;
            return Err(StoreError::backend("injected commit failure"));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

async fn snapshot<S: LedgerStore>(
    engine: &Engine<S>,
    accounts: &[&Account],
) -> Vec<(i64, Vec<TransactionRecord>)> {
    let mut out = Vec::new();
    for account in accounts {
        out.push((
            balance_of(engine, account).await,
            records_of(engine, account).await,
        ));
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_destination_write_leaves_no_trace() {
    let store = FaultyStore::new();
    let engine = LedgerEngine::new(store.clone(), NoopNotifier);
    let alice = UserId::new();
    let a = open(&engine, alice, AccountType::Savings, 200).await;
    let b = open(&engine, UserId::new(), AccountType::Savings, 10).await;
    let before = snapshot(&engine, &[&a, &b]).await;

    store.inject(Faults {
        fail_save_of: Some(b.number.clone()),
        ..Faults::default()
    });
    let err = engine
        .transfer(a.number.as_str(), b.number.as_str(), alice, 50)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "storage_failure");
    assert_eq!(snapshot(&engine, &[&a, &b]).await, before);

    // Locks were released by the rollback.
    store.inject(Faults::default());
    engine
        .transfer(a.number.as_str(), b.number.as_str(), alice, 50)
        .await
        .unwrap();
    assert_eq!(balance_of(&engine, &a).await, 150);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_commit_leaves_no_trace() {
    let store = FaultyStore::new();
    let engine = LedgerEngine::new(store.clone(), NoopNotifier);
    let owner = UserId::new();
    let a = open(&engine, owner, AccountType::Checking, 80).await;
    let before = snapshot(&engine, &[&a]).await;

    store.inject(Faults {
        fail_commit: true,
        ..Faults::default()
    });
    assert_eq!(
        engine.deposit(a.number.as_str(), 20).await.unwrap_err().code(),
        "storage_failure"
    );
    assert_eq!(
        engine.withdraw(a.number.as_str(), owner, 20).await.unwrap_err().code(),
        "storage_failure"
    );
    assert_eq!(snapshot(&engine, &[&a]).await, before);
}

// Account opening

#[tokio::test(flavor = "multi_thread")]
async fn opening_balance_is_recorded_as_a_deposit() {
    let engine = engine();
    let owner = UserId::new();
    let funded = open(&engine, owner, AccountType::Savings, 250).await;
    let empty = open(&engine, owner, AccountType::Checking, 0).await;

    let records = records_of(&engine, &funded).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, TransactionKind::Deposit);
    assert_eq!(records[0].amount.minor_units(), 250);
    assert!(records_of(&engine, &empty).await.is_empty());

    let listed = engine.accounts_for_owner(owner).await.unwrap();
    assert_eq!(listed, vec![funded, empty]);
}

#[tokio::test(flavor = "multi_thread")]
async fn one_account_per_type_per_owner() {
    let engine = engine();
    let owner = UserId::new();
    open(&engine, owner, AccountType::Savings, 0).await;

    assert_eq!(
        engine.open_account(owner, AccountType::Savings, 0).await,
        Err(LedgerError::AccountTypeExists(AccountType::Savings))
    );
    assert_eq!(
        engine.open_account(owner, AccountType::Checking, -1).await.unwrap_err().code(),
        "invalid_amount"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn colliding_account_numbers_are_retried() {
    let taken = AccountNumber::parse("000000777").unwrap();
    let fresh = AccountNumber::parse("000000778").unwrap();
    let engine = LedgerEngine::new(InMemoryLedgerStore::new(), NoopNotifier).with_account_numbers(
        Arc::new(FixedAccountNumbers::new([
            taken.clone(),
            taken.clone(),
            taken.clone(),
            fresh.clone(),
        ])),
    );

    let first = open(&engine, UserId::new(), AccountType::Savings, 0).await;
    assert_eq!(first.number, taken);

    let second = open(&engine, UserId::new(), AccountType::Savings, 0).await;
    assert_eq!(second.number, fresh);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_number_attempts_surface_as_storage_failure() {
    let taken = AccountNumber::parse("000000900").unwrap();
    let engine = LedgerEngine::new(InMemoryLedgerStore::new(), NoopNotifier)
        .with_account_numbers(Arc::new(FixedAccountNumbers::new(vec![taken.clone(); 4])))
        .with_account_number_attempts(3);

    open(&engine, UserId::new(), AccountType::Savings, 0).await;
    let err = engine
        .open_account(UserId::new(), AccountType::Savings, 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "storage_failure");
}

// Reads

#[tokio::test(flavor = "multi_thread")]
async fn owner_scoped_reads() {
    let engine = LedgerEngine::new(InMemoryLedgerStore::new(), NoopNotifier).with_account_numbers(
        Arc::new(FixedAccountNumbers::new([
            AccountNumber::parse("100000001").unwrap(),
            AccountNumber::parse("100000002").unwrap(),
        ])),
    );
    let alice = UserId::new();
    let bob = UserId::new();
    let a = open(&engine, alice, AccountType::Savings, 100).await;
    let b = open(&engine, bob, AccountType::Savings, 0).await;
    engine
        .transfer(a.number.as_str(), b.number.as_str(), alice, 40)
        .await
        .unwrap();

    assert_eq!(
        engine.owned_account(a.number.as_str(), bob).await,
        Err(LedgerError::AccessDenied)
    );
    assert_eq!(
        engine.owned_account("000000001", alice).await,
        Err(LedgerError::AccountNotFound)
    );
    assert_eq!(engine.owned_account(a.number.as_str(), alice).await.unwrap().id, a.id);

    let alice_log = engine.transactions_for_owner(alice).await.unwrap();
    assert_eq!(alice_log.len(), 2); // opening deposit + transfer out
    assert!(alice_log.windows(2).all(|w| w[0].id < w[1].id));

    let bob_log = engine.transactions_for_owner(bob).await.unwrap();
    assert_eq!(bob_log.len(), 1);

    let incoming = bob_log[0].id;
    assert_eq!(engine.owned_transaction(incoming, bob).await.unwrap(), bob_log[0]);
    assert_eq!(
        engine.owned_transaction(incoming, alice).await,
        Err(LedgerError::AccessDenied)
    );
    assert_eq!(
        engine.transaction(TransactionId::from_raw(9_999)).await,
        Err(LedgerError::TransactionNotFound)
    );
}

// Notifications

/// Next `n` envelopes whose type starts with `prefix` (others are skipped).
fn recv_matching(
    sub: Subscription<EventEnvelope<JsonValue>>,
    prefix: &str,
    n: usize,
) -> Vec<EventEnvelope<JsonValue>> {
    let mut got = Vec::new();
    while got.len() < n {
        let envelope = sub.recv_timeout(Duration::from_secs(2)).unwrap();
        if envelope.event_type().starts_with(prefix) {
            got.push(envelope);
        }
    }
    got
}

#[tokio::test(flavor = "multi_thread")]
async fn committed_transfer_notifies_both_owners_with_contacts() {
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    let contacts = Arc::new(InMemoryContactDirectory::new());
    let engine = LedgerEngine::new(InMemoryLedgerStore::new(), BusNotifier::new(bus.clone()))
        .with_contacts(contacts.clone());

    let alice = UserId::new();
    let bob = UserId::new();
    contacts.register(alice, "alice@example.com");
    let a = engine.open_account(alice, AccountType::Savings, 100).await.unwrap();
    let b = engine.open_account(bob, AccountType::Savings, 0).await.unwrap();

    let sub = bus.subscribe();
    engine
        .transfer(a.number.as_str(), b.number.as_str(), alice, 30)
        .await
        .unwrap();

    let mut got = tokio::task::spawn_blocking(move || recv_matching(sub, "transfer_", 2))
        .await
        .unwrap();
    got.sort_by(|x, y| x.event_type().cmp(y.event_type()));

    let received = got[0].payload();
    let sent = got[1].payload();
    assert_eq!(got[0].event_type(), "transfer_received");
    assert_eq!(got[1].event_type(), "transfer_sent");

    assert_eq!(sent["user_id"], alice.to_string());
    assert_eq!(sent["to_email"], "alice@example.com");
    assert_eq!(sent["from"], a.number.as_str());
    assert_eq!(sent["to"], b.number.as_str());
    assert_eq!(sent["amount"], 30);
    assert_eq!(sent["status"], "success");

    assert_eq!(received["user_id"], bob.to_string());
    assert_eq!(received["to_email"], JsonValue::Null);
}
