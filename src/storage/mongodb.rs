//! MongoDB implementation of the ledger store.
//!
//! Conditional writes ride on filtered updates and unique indexes: a
//! write that matches nothing, or trips a unique index, lost its race
//! and surfaces as `ConditionFailed`. Adjustment commits run inside a
//! session transaction so the account and its audit entry land together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use uuid::Uuid;

use crate::engine::day_key::DayKey;
use crate::interfaces::ledger_store::{LedgerStore, Result, StorageError};
use crate::model::{AdjustReason, AuditEntry, PointsAccount, UserAttendanceRecord};

/// Collection names.
const ATTENDANCE_COLLECTION: &str = "attendance";
const ACCOUNTS_COLLECTION: &str = "accounts";
const AUDIT_COLLECTION: &str = "audit";

/// Server error code for unique index violations.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB implementation of LedgerStore.
pub struct MongoLedgerStore {
    database: Database,
    attendance: Collection<Document>,
    accounts: Collection<Document>,
    audit: Collection<Document>,
}

impl MongoLedgerStore {
    /// Create a new MongoDB ledger store over an existing client.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let database = client.database(database_name);
        let attendance = database.collection(ATTENDANCE_COLLECTION);
        let accounts = database.collection(ACCOUNTS_COLLECTION);
        let audit = database.collection(AUDIT_COLLECTION);

        let store = Self {
            database,
            attendance,
            accounts,
            audit,
        };
        store.init().await?;

        Ok(store)
    }

    /// Connect to a MongoDB deployment and initialize the store.
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Self::new(&client, database_name).await
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // One attendance record per user.
        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.attendance.create_index(index).await?;

        // One account per user.
        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.accounts.create_index(index).await?;

        // Read path for per-user history.
        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .build();
        self.audit.create_index(index).await?;

        // At most one audit entry per (user, causation key). Entries
        // without a key are exempt through the partial filter.
        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "causation_key": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! { "causation_key": { "$exists": true } })
                    .build(),
            )
            .build();
        self.audit.create_index(index).await?;

        Ok(())
    }

    /// Get the database reference for transaction support.
    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl LedgerStore for MongoLedgerStore {
    async fn get_attendance(&self, user_id: &str) -> Result<Option<UserAttendanceRecord>> {
        let filter = doc! { "user_id": user_id };
        match self.attendance.find_one(filter).await? {
            Some(doc) => Ok(Some(attendance_from_doc(&doc)?)),
            None => Ok(None),
        }
    }

    async fn put_attendance(
        &self,
        record: &UserAttendanceRecord,
        expected_last_day: Option<DayKey>,
    ) -> Result<()> {
        match expected_last_day {
            // Fresh record: the unique index rejects a racing insert.
            None => match self.attendance.insert_one(attendance_doc(record)).await {
                Ok(_) => Ok(()),
                Err(err) if is_duplicate_key(&err) => Err(StorageError::ConditionFailed {
                    user_id: record.user_id.clone(),
                    detail: "attendance record already exists".to_string(),
                }),
                Err(err) => Err(err.into()),
            },
            Some(expected) => {
                let filter = doc! {
                    "user_id": &record.user_id,
                    "last_check_in_day": expected.as_days(),
                };
                let update = doc! {
                    "$set": {
                        "last_check_in_day": record.last_check_in_day.as_days(),
                        "current_streak": record.current_streak as i32,
                        "longest_streak": record.longest_streak as i32,
                        "updated_at": record.updated_at.to_rfc3339(),
                    }
                };
                let result = self.attendance.update_one(filter, update).await?;
                if result.matched_count == 0 {
                    return Err(StorageError::ConditionFailed {
                        user_id: record.user_id.clone(),
                        detail: format!("stored day is no longer {expected}"),
                    });
                }
                Ok(())
            }
        }
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<PointsAccount>> {
        let filter = doc! { "user_id": user_id };
        match self.accounts.find_one(filter).await? {
            Some(doc) => Ok(Some(account_from_doc(&doc)?)),
            None => Ok(None),
        }
    }

    async fn commit_adjustment(
        &self,
        expected_version: Option<u64>,
        account: &PointsAccount,
        entry: &AuditEntry,
    ) -> Result<()> {
        let mut session = self.database.client().start_session().await?;
        session.start_transaction().await?;

        match expected_version {
            None => {
                match self
                    .accounts
                    .insert_one(account_doc(account))
                    .session(&mut session)
                    .await
                {
                    Ok(_) => {}
                    Err(err) if is_duplicate_key(&err) => {
                        session.abort_transaction().await?;
                        return Err(StorageError::ConditionFailed {
                            user_id: account.user_id.clone(),
                            detail: "account already exists".to_string(),
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Some(expected) => {
                let filter = doc! {
                    "user_id": &account.user_id,
                    "version": expected as i64,
                };
                let update = doc! {
                    "$set": {
                        "balance": account.balance,
                        "version": account.version as i64,
                        "updated_at": account.updated_at.to_rfc3339(),
                    }
                };
                let result = self
                    .accounts
                    .update_one(filter, update)
                    .session(&mut session)
                    .await?;
                if result.matched_count == 0 {
                    session.abort_transaction().await?;
                    return Err(StorageError::ConditionFailed {
                        user_id: account.user_id.clone(),
                        detail: format!("stored version is no longer {expected}"),
                    });
                }
            }
        }

        match self
            .audit
            .insert_one(audit_doc(entry))
            .session(&mut session)
            .await
        {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => {
                session.abort_transaction().await?;
                return Err(StorageError::ConditionFailed {
                    user_id: entry.user_id.clone(),
                    detail: "duplicate causation key".to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        session.commit_transaction().await?;

        Ok(())
    }

    async fn find_audit_by_causation(
        &self,
        user_id: &str,
        causation_key: &str,
    ) -> Result<Option<AuditEntry>> {
        let filter = doc! { "user_id": user_id, "causation_key": causation_key };
        match self.audit.find_one(filter).await? {
            Some(doc) => Ok(Some(audit_from_doc(&doc)?)),
            None => Ok(None),
        }
    }

    async fn audit_entries(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        let filter = doc! { "user_id": user_id };
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();

        let mut cursor = self.audit.find(filter).with_options(options).await?;

        let mut entries = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            entries.push(audit_from_doc(&doc)?);
        }

        Ok(entries)
    }

    async fn recent_audit(&self, user_id: &str, limit: u32) -> Result<Vec<AuditEntry>> {
        let filter = doc! { "user_id": user_id };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(i64::from(limit))
            .build();

        let mut cursor = self.audit.find(filter).with_options(options).await?;

        let mut entries = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            entries.push(audit_from_doc(&doc)?);
        }

        Ok(entries)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_err)) => {
            write_err.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_err) => command_err.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn attendance_doc(record: &UserAttendanceRecord) -> Document {
    doc! {
        "user_id": &record.user_id,
        "last_check_in_day": record.last_check_in_day.as_days(),
        "current_streak": record.current_streak as i32,
        "longest_streak": record.longest_streak as i32,
        "updated_at": record.updated_at.to_rfc3339(),
    }
}

fn attendance_from_doc(doc: &Document) -> Result<UserAttendanceRecord> {
    Ok(UserAttendanceRecord {
        user_id: read_str(doc, "user_id")?,
        last_check_in_day: DayKey::from_days(read_i64(doc, "last_check_in_day")?),
        current_streak: read_u32(doc, "current_streak")?,
        longest_streak: read_u32(doc, "longest_streak")?,
        updated_at: read_time(doc, "updated_at")?,
    })
}

fn account_doc(account: &PointsAccount) -> Document {
    doc! {
        "user_id": &account.user_id,
        "balance": account.balance,
        "version": account.version as i64,
        "updated_at": account.updated_at.to_rfc3339(),
    }
}

fn account_from_doc(doc: &Document) -> Result<PointsAccount> {
    Ok(PointsAccount {
        user_id: read_str(doc, "user_id")?,
        balance: read_i64(doc, "balance")?,
        version: read_u64(doc, "version")?,
        updated_at: read_time(doc, "updated_at")?,
    })
}

fn audit_doc(entry: &AuditEntry) -> Document {
    let mut doc = doc! {
        "entry_id": entry.entry_id.to_string(),
        "user_id": &entry.user_id,
        "delta": entry.delta,
        "reason": entry.reason.as_str(),
        "resulting_balance": entry.resulting_balance,
        "created_at": entry.created_at.to_rfc3339(),
    };
    if let Some(key) = &entry.causation_key {
        doc.insert("causation_key", key);
    }
    if let Some(counterparty) = &entry.counterparty {
        doc.insert("counterparty", counterparty);
    }
    if let Some(note) = &entry.note {
        doc.insert("note", note);
    }
    doc
}

fn audit_from_doc(doc: &Document) -> Result<AuditEntry> {
    let reason_code = read_str(doc, "reason")?;
    let reason = AdjustReason::parse(&reason_code).ok_or_else(|| {
        StorageError::MalformedDocument(format!("unknown reason code {reason_code}"))
    })?;

    Ok(AuditEntry {
        entry_id: Uuid::parse_str(&read_str(doc, "entry_id")?)?,
        user_id: read_str(doc, "user_id")?,
        delta: read_i64(doc, "delta")?,
        reason,
        resulting_balance: read_i64(doc, "resulting_balance")?,
        created_at: read_time(doc, "created_at")?,
        causation_key: doc.get_str("causation_key").ok().map(str::to_string),
        counterparty: doc.get_str("counterparty").ok().map(str::to_string),
        note: doc.get_str("note").ok().map(str::to_string),
    })
}

fn read_str(doc: &Document, key: &str) -> Result<String> {
    doc.get_str(key)
        .map(str::to_string)
        .map_err(|_| StorageError::MalformedDocument(format!("missing string field {key}")))
}

fn read_i64(doc: &Document, key: &str) -> Result<i64> {
    doc.get_i64(key)
        .map_err(|_| StorageError::MalformedDocument(format!("missing i64 field {key}")))
}

fn read_i32(doc: &Document, key: &str) -> Result<i32> {
    doc.get_i32(key)
        .map_err(|_| StorageError::MalformedDocument(format!("missing i32 field {key}")))
}

fn read_u32(doc: &Document, key: &str) -> Result<u32> {
    let raw = read_i32(doc, key)?;
    u32::try_from(raw)
        .map_err(|_| StorageError::MalformedDocument(format!("negative value in {key}: {raw}")))
}

fn read_u64(doc: &Document, key: &str) -> Result<u64> {
    let raw = read_i64(doc, key)?;
    u64::try_from(raw)
        .map_err(|_| StorageError::MalformedDocument(format!("negative value in {key}: {raw}")))
}

fn read_time(doc: &Document, key: &str) -> Result<DateTime<Utc>> {
    let raw = read_str(doc, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::MalformedDocument(format!("bad timestamp in {key}: {raw}")))
}
