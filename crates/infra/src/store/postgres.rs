//! Postgres-backed ledger store.
//!
//! Each unit of work is one database transaction. Row locks come from
//! `SELECT ... FOR UPDATE`; the lock wait is bounded by `SET LOCAL
//! lock_timeout` issued when the unit begins. Schema: `migrations/0001_ledger.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (lock not available) | `55P03` | `Busy` |
//! | Database (deadlock detected) | `40P01` | `Busy` |
//! | Database (serialization failure) | `40001` | `Busy` |
//! | Database (unique violation, `accounts_account_no_key`) | `23505` | `DuplicateAccountNumber` |
//! | Database (unique violation, `accounts_owner_type_key`) | `23505` | `AccountTypeExists` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut | N/A | `Busy` |
//! | PoolClosed / Io / other | N/A | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use bankledger_core::{AccountId, AccountNumber, Amount, Balance, PostingId, TransactionId, UserId};
use bankledger_ledger::{
    Account, AccountType, NewAccount, NewTransaction, TransactionKind, TransactionRecord,
    TransactionStatus,
};

use super::{AccountStore, LedgerStore, StoreError, TransactionLog, UnitOfWork};

const ACCOUNT_NUMBER_CONSTRAINT: &str = "accounts_account_no_key";
const OWNER_TYPE_CONSTRAINT: &str = "accounts_owner_type_key";

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

const ACCOUNT_COLUMNS: &str =
    "id, account_no, owner_id, account_type, balance, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, posting_id, kind, amount, account_id, from_account_id, \
     to_account_id, status, occurred_at";

/// Postgres-backed ledger store.
///
/// `Send + Sync`; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout,
        }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str, lock_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create the ledger tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not accept bind parameters.
        let set_timeout = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PostgresUnit { tx }))
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Account, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_no = $1");
        let row = sqlx::query(&sql)
            .bind(number.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_account", e))?;
        row.as_ref().map(decode_account).unwrap_or(Err(StoreError::NotFound))
    }

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("accounts_for_owner", e))?;
        rows.iter().map(decode_account).collect()
    }

    async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.raw())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("transaction", e))?;
        row.as_ref()
            .map(decode_transaction)
            .unwrap_or(Err(StoreError::NotFound))
    }

    async fn transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = $1 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.raw())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("transactions_for_account", e))?;
        rows.iter().map(decode_transaction).collect()
    }

    async fn transactions_for_owner(
        &self,
        owner: UserId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let sql = r#"
            SELECT t.id, t.posting_id, t.kind, t.amount, t.account_id, t.from_account_id,
                   t.to_account_id, t.status, t.occurred_at
            FROM transactions t
            JOIN accounts a ON a.id = t.account_id
            WHERE a.owner_id = $1
            ORDER BY t.id
            "#;
        let rows = sqlx::query(sql)
            .bind(owner.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("transactions_for_owner", e))?;
        rows.iter().map(decode_transaction).collect()
    }
}

struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnit {
    async fn select_account(
        &mut self,
        number: &AccountNumber,
        for_update: bool,
    ) -> Result<Account, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_no = $1{lock}");
        let row = sqlx::query(&sql)
            .bind(number.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("select_account", e))?;
        row.as_ref().map(decode_account).unwrap_or(Err(StoreError::NotFound))
    }
}

#[async_trait]
impl AccountStore for PostgresUnit {
    async fn find(&mut self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.select_account(number, false).await
    }

    #[instrument(skip(self), fields(account_no = %number), err)]
    async fn find_for_update(&mut self, number: &AccountNumber) -> Result<Account, StoreError> {
        self.select_account(number, true).await
    }

    async fn save(&mut self, account: &Account) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = $2, updated_at = $3 WHERE id = $1")
            .bind(account.id.raw())
            .bind(account.balance.minor_units())
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("save_account", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create(&mut self, account: NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (account_no, owner_id, account_type, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id
            "#,
        )
        .bind(account.number.as_str())
        .bind(account.owner.as_uuid())
        .bind(account.account_type.as_str())
        .bind(account.balance.minor_units())
        .bind(account.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match unique_constraint(&e).as_deref() {
            Some(ACCOUNT_NUMBER_CONSTRAINT) => {
                StoreError::DuplicateAccountNumber(account.number.clone())
            }
            Some(OWNER_TYPE_CONSTRAINT) => StoreError::AccountTypeExists(account.account_type),
            _ => map_sqlx_error("create_account", e),
        })?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::backend(format!("failed to read account id: {e}")))?;
        debug!(account_id = id, "account row inserted");
        Ok(account.into_account(AccountId::from_raw(id)))
    }
}

#[async_trait]
impl TransactionLog for PostgresUnit {
    async fn append(&mut self, entry: NewTransaction) -> Result<TransactionRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions
                (posting_id, kind, amount, account_id, from_account_id, to_account_id, status, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(entry.posting_id.as_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.amount.minor_units())
        .bind(entry.account_id.raw())
        .bind(entry.from_account_id.map(|id| id.raw()))
        .bind(entry.to_account_id.map(|id| id.raw()))
        .bind(entry.status.as_str())
        .bind(entry.occurred_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_transaction", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::backend(format!("failed to read transaction id: {e}")))?;
        Ok(entry.into_record(TransactionId::from_raw(id)))
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // lock_not_available, deadlock_detected, serialization_failure
                Some("55P03") | Some("40P01") | Some("40001") => StoreError::Busy(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Busy(format!("timed out waiting for a connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Name of the violated unique constraint, if `err` is a unique violation.
fn unique_constraint(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return db_err.constraint().map(str::to_string);
        }
    }
    None
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    account_no: String,
    owner_id: uuid::Uuid,
    account_type: String,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            account_no: row.try_get("account_no")?,
            owner_id: row.try_get("owner_id")?,
            account_type: row.try_get("account_type")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: String| {
            StoreError::backend(format!("corrupt account row {}: {what}: {e}", row.id))
        };
        Ok(Account {
            id: AccountId::from_raw(row.id),
            number: AccountNumber::parse(&row.account_no)
                .map_err(|e| corrupt("account_no", e.to_string()))?,
            owner: UserId::from_uuid(row.owner_id),
            account_type: row
                .account_type
                .parse::<AccountType>()
                .map_err(|e| corrupt("account_type", e.to_string()))?,
            balance: Balance::new(row.balance).map_err(|e| corrupt("balance", e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct TransactionRow {
    id: i64,
    posting_id: uuid::Uuid,
    kind: String,
    amount: i64,
    account_id: i64,
    from_account_id: Option<i64>,
    to_account_id: Option<i64>,
    status: String,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            posting_id: row.try_get("posting_id")?,
            kind: row.try_get("kind")?,
            amount: row.try_get("amount")?,
            account_id: row.try_get("account_id")?,
            from_account_id: row.try_get("from_account_id")?,
            to_account_id: row.try_get("to_account_id")?,
            status: row.try_get("status")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let corrupt =
            |what: &str| StoreError::backend(format!("corrupt transaction row {}: {what}", row.id));
        Ok(TransactionRecord {
            id: TransactionId::from_raw(row.id),
            posting_id: PostingId::from_uuid(row.posting_id),
            kind: TransactionKind::parse(&row.kind).ok_or_else(|| corrupt("kind"))?,
            amount: Amount::new(row.amount).map_err(|_| corrupt("amount"))?,
            account_id: AccountId::from_raw(row.account_id),
            from_account_id: row.from_account_id.map(AccountId::from_raw),
            to_account_id: row.to_account_id.map(AccountId::from_raw),
            status: TransactionStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?,
            occurred_at: row.occurred_at,
        })
    }
}

fn decode_account(row: &PgRow) -> Result<Account, StoreError> {
    AccountRow::from_row(row)
        .map_err(|e| StoreError::backend(format!("failed to deserialize account row: {e}")))?
        .try_into()
}

fn decode_transaction(row: &PgRow) -> Result<TransactionRecord, StoreError> {
    TransactionRow::from_row(row)
        .map_err(|e| StoreError::backend(format!("failed to deserialize transaction row: {e}")))?
        .try_into()
}
