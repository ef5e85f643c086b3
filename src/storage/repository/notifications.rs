// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Notification repository.
//!
//! Every live notification has three entries: the row itself, a queue key
//! ordering it by creation time, and (for series members) a series index
//! entry. All three are written and removed together.

use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::models::{NewNotification, Notification};
use crate::storage::database::{
    pair_key, pair_prefix, queue_key, StoreError, StoreResult, COUNTERS, DEAD_LETTERS,
    NOTIFICATIONS, NOTIFICATION_QUEUE, NOTIFICATION_SERIES,
};

/// A notification is abandoned once it has failed this many times.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Upper bound on one worker batch.
pub const BATCH_SIZE: usize = 100;

const NOTIFICATION_SEQUENCE: &str = "notification_id";

/// What happened to a notification after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Still eligible; `times_tried` is the updated count
    Retry { times_tried: u32 },
    /// Attempts exhausted; moved to the dead-letter table
    DeadLettered,
}

fn series_key(series_id: &str, id: u64) -> String {
    pair_key(series_id, &format!("{id:020}"))
}

pub struct NotificationRepository<'a> {
    txn: &'a WriteTransaction,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(txn: &'a WriteTransaction) -> Self {
        Self { txn }
    }

    /// Schedule one notification, assigning its id.
    pub fn create(
        &self,
        new: &NewNotification,
        series_id: Option<&str>,
        now: i64,
    ) -> StoreResult<Notification> {
        let notification = Notification {
            id: self.next_id()?,
            series_id: series_id.map(str::to_string),
            creation_time: now,
            send_after: new.send_after,
            times_tried: 0,
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            body: new.body.clone(),
        };

        let json = serde_json::to_vec(&notification)?;
        let mut rows = self.txn.open_table(NOTIFICATIONS)?;
        rows.insert(notification.id, json.as_slice())?;

        let mut queue = self.txn.open_table(NOTIFICATION_QUEUE)?;
        let key = queue_key(notification.creation_time, notification.id);
        queue.insert(key.as_slice(), notification.id)?;

        if let Some(series_id) = series_id {
            let mut series = self.txn.open_table(NOTIFICATION_SERIES)?;
            series.insert(series_key(series_id, notification.id).as_str(), notification.id)?;
        }

        Ok(notification)
    }

    /// Schedule every item under one fresh series id.
    pub fn create_series(
        &self,
        items: &[NewNotification],
        now: i64,
    ) -> StoreResult<(String, Vec<Notification>)> {
        let series_id = uuid::Uuid::new_v4().to_string();
        let created = items
            .iter()
            .map(|item| self.create(item, Some(&series_id), now))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((series_id, created))
    }

    pub fn get(&self, id: u64) -> StoreResult<Notification> {
        let rows = self.txn.open_table(NOTIFICATIONS)?;
        let bytes = rows.get(id)?;
        match bytes {
            Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
            None => Err(StoreError::NotFound(format!("Notification {id}"))),
        }
    }

    /// Up to `limit` deliverable notifications, oldest creation time first.
    ///
    /// Deliverable means `send_after < now` and attempts remain.
    pub fn pending_batch(&self, now: i64, limit: usize) -> StoreResult<Vec<Notification>> {
        scan_pending(
            &self.txn.open_table(NOTIFICATION_QUEUE)?,
            &self.txn.open_table(NOTIFICATIONS)?,
            now,
            limit,
        )
    }

    /// Count a failed delivery, dead-lettering the row once attempts run out.
    pub fn record_failed_attempt(&self, id: u64) -> StoreResult<AttemptOutcome> {
        let mut notification = self.get(id)?;
        notification.times_tried += 1;

        if notification.times_tried >= MAX_DELIVERY_ATTEMPTS {
            self.unlink(&notification)?;
            let json = serde_json::to_vec(&notification)?;
            let mut dead = self.txn.open_table(DEAD_LETTERS)?;
            dead.insert(id, json.as_slice())?;
            return Ok(AttemptOutcome::DeadLettered);
        }

        let json = serde_json::to_vec(&notification)?;
        let mut rows = self.txn.open_table(NOTIFICATIONS)?;
        rows.insert(id, json.as_slice())?;
        Ok(AttemptOutcome::Retry {
            times_tried: notification.times_tried,
        })
    }

    /// Move a notification straight to the dead-letter table.
    pub fn dead_letter(&self, id: u64) -> StoreResult<()> {
        let notification = self.get(id)?;
        self.unlink(&notification)?;
        let json = serde_json::to_vec(&notification)?;
        let mut dead = self.txn.open_table(DEAD_LETTERS)?;
        dead.insert(id, json.as_slice())?;
        Ok(())
    }

    pub fn get_dead_letter(&self, id: u64) -> StoreResult<Notification> {
        let dead = self.txn.open_table(DEAD_LETTERS)?;
        let bytes = dead.get(id)?;
        match bytes {
            Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
            None => Err(StoreError::NotFound(format!("Dead letter {id}"))),
        }
    }

    /// Delete a notification owned by `user_id`.
    ///
    /// A notification owned by someone else is reported as not found.
    pub fn delete(&self, id: u64, user_id: &str) -> StoreResult<()> {
        let notification = self.get(id)?;
        if notification.user_id != user_id {
            return Err(StoreError::NotFound(format!("Notification {id}")));
        }
        self.unlink(&notification)
    }

    /// Delete every member of a series owned by `user_id`. Returns how many were removed.
    pub fn delete_series(&self, series_id: &str, user_id: &str) -> StoreResult<usize> {
        let prefix = pair_prefix(series_id);
        let mut ids = Vec::new();
        {
            let series = self.txn.open_table(NOTIFICATION_SERIES)?;
            for entry in series.range(prefix.as_str()..)? {
                let (key, id) = entry?;
                if !key.value().starts_with(&prefix) {
                    break;
                }
                ids.push(id.value());
            }
        }

        let mut removed = 0;
        for id in ids {
            let notification = self.get(id)?;
            if notification.user_id == user_id {
                self.unlink(&notification)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn unlink(&self, notification: &Notification) -> StoreResult<()> {
        let mut rows = self.txn.open_table(NOTIFICATIONS)?;
        rows.remove(notification.id)?;

        let mut queue = self.txn.open_table(NOTIFICATION_QUEUE)?;
        let key = queue_key(notification.creation_time, notification.id);
        queue.remove(key.as_slice())?;

        if let Some(series_id) = &notification.series_id {
            let mut series = self.txn.open_table(NOTIFICATION_SERIES)?;
            series.remove(series_key(series_id, notification.id).as_str())?;
        }
        Ok(())
    }

    fn next_id(&self) -> StoreResult<u64> {
        let mut counters = self.txn.open_table(COUNTERS)?;
        let current = counters
            .get(NOTIFICATION_SEQUENCE)?
            .map(|v| v.value())
            .unwrap_or(0);
        let next = current + 1;
        counters.insert(NOTIFICATION_SEQUENCE, next)?;
        Ok(next)
    }
}

/// Read-only view used by the worker to pick a batch without taking the writer.
pub struct NotificationReader<'a> {
    txn: &'a ReadTransaction,
}

impl<'a> NotificationReader<'a> {
    pub fn new(txn: &'a ReadTransaction) -> Self {
        Self { txn }
    }

    /// Same selection as [`NotificationRepository::pending_batch`].
    pub fn pending_batch(&self, now: i64, limit: usize) -> StoreResult<Vec<Notification>> {
        scan_pending(
            &self.txn.open_table(NOTIFICATION_QUEUE)?,
            &self.txn.open_table(NOTIFICATIONS)?,
            now,
            limit,
        )
    }
}

fn scan_pending(
    queue: &impl ReadableTable<&'static [u8], u64>,
    rows: &impl ReadableTable<u64, &'static [u8]>,
    now: i64,
    limit: usize,
) -> StoreResult<Vec<Notification>> {
    let mut batch = Vec::new();
    for entry in queue.iter()? {
        if batch.len() >= limit {
            break;
        }
        let (_, id) = entry?;
        let Some(bytes) = rows.get(id.value())? else {
            continue;
        };
        let notification: Notification = serde_json::from_slice(bytes.value())?;
        if notification.send_after < now && notification.times_tried < MAX_DELIVERY_ATTEMPTS {
            batch.push(notification);
        }
    }
    Ok(batch)
}
