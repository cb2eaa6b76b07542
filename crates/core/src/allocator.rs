//! # Slot Allocator
//!
//! Owns the mapping from appointment requests to committed applications and
//! enforces that no two applications hold the same `(date, time)` slot.
//!
//! ## Store layout
//!
//! - `application:<id>` holds the application record
//! - `slot:<YYYY-MM-DD>:<HH:MM>` holds the id of the application occupying that slot
//!
//! A reservation first claims the slot key with `set_if_absent` and only then
//! writes the record. Two concurrent reservations for one slot race on that
//! single conditional write, so at most one of them can win. If the record
//! write fails the claim is released again, leaving the slot free.
//!
//! `update` and `cancel` hold a per-application lock for their whole
//! read-modify-write, so two edits of one application never interleave.
//!
//! ## Retries
//!
//! Idempotent store calls (reads, plain writes, deletes) are retried with
//! exponential backoff when the store reports a transient failure. Slot
//! claims are attempted exactly once: a claim whose acknowledgement was lost
//! would read back as a conflict with itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::errors::{BookingError, BookingResult};
use crate::models::application::{
    APPLICATION_KEY_PREFIX, Application, ApplicationId, Payload, UpdateApplicationRequest,
};
use crate::models::slot::TimeOfDay;
use crate::policy::SlotPolicy;
use crate::store::{KvStore, StoreError, StoreResult};

const SLOT_KEY_PREFIX: &str = "slot:";

fn slot_prefix(date: NaiveDate) -> String {
    format!("{}{}:", SLOT_KEY_PREFIX, date)
}

fn slot_key(date: NaiveDate, time: TimeOfDay) -> String {
    format!("{}{}", slot_prefix(date), time)
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Issues strictly increasing millisecond-timestamp ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ApplicationId {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return ApplicationId::new(candidate),
                Err(current) => last = current,
            }
        }
    }
}

/// Outcome of reconciling the slot index with the stored applications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Applications that had no slot entry and were given one.
    pub claimed: usize,
    /// Slot entries whose holder is missing or booked elsewhere, removed.
    pub released: usize,
    /// Applications whose slot is held by a different application.
    pub duplicates: Vec<ApplicationId>,
}

/// One async lock per application id. Idle entries are pruned on the next
/// acquisition.
#[derive(Debug, Default)]
struct RecordLocks {
    held: Mutex<HashMap<ApplicationId, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    async fn acquire(&self, id: ApplicationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            held.retain(|_, lock| Arc::strong_count(lock) > 1);
            held.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct SlotAllocator {
    store: Arc<dyn KvStore>,
    policy: SlotPolicy,
    retry: RetryPolicy,
    ids: IdGenerator,
    locks: RecordLocks,
}

impl SlotAllocator {
    pub fn new(store: Arc<dyn KvStore>, policy: SlotPolicy) -> Self {
        Self {
            store,
            policy,
            retry: RetryPolicy::default(),
            ids: IdGenerator::new(),
            locks: RecordLocks::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &SlotPolicy {
        &self.policy
    }

    /// Free times on `date`, ascending. Dates outside the policy still get an
    /// answer; clients are expected not to offer them.
    pub async fn list_available_slots(&self, date: NaiveDate) -> BookingResult<Vec<TimeOfDay>> {
        let booked = self.booked_times(date).await?;
        Ok(self.free_times(&booked))
    }

    /// The time grid minus `booked`, which must be sorted.
    pub fn free_times(&self, booked: &[TimeOfDay]) -> Vec<TimeOfDay> {
        self.policy
            .time_grid()
            .into_iter()
            .filter(|time| booked.binary_search(time).is_err())
            .collect()
    }

    /// Times already held on `date`, ascending.
    pub async fn booked_times(&self, date: NaiveDate) -> BookingResult<Vec<TimeOfDay>> {
        let prefix = slot_prefix(date);
        let keys = self.retrying("scan", || self.store.scan(&prefix)).await?;

        let mut times = Vec::with_capacity(keys.len());
        for key in &keys {
            match key[prefix.len()..].parse::<TimeOfDay>() {
                Ok(time) => times.push(time),
                Err(_) => warn!(key = %key, "Ignoring malformed slot key"),
            }
        }
        times.sort();
        Ok(times)
    }

    /// Books `time` on `date` for a new application carrying `payload`.
    ///
    /// # Errors
    ///
    /// * `BookingError::Validation` - the slot is not offered by the policy
    /// * `BookingError::Conflict` - another application holds the slot
    /// * `BookingError::StoreUnavailable` - the store kept failing
    pub async fn reserve(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        payload: Payload,
    ) -> BookingResult<Application> {
        self.policy.ensure_bookable(date, time)?;

        let application = Application {
            id: self.ids.next(),
            created_at: Utc::now(),
            appointment_date: date,
            appointment_time: time,
            payload: payload.sanitized(),
        };

        self.claim(&application).await?;

        if let Err(err) = self.write(&application).await {
            self.release(date, time, application.id).await;
            return Err(err);
        }

        info!(
            id = %application.id,
            date = %date,
            time = %time,
            "Reserved appointment slot"
        );
        Ok(application)
    }

    pub async fn get(&self, id: ApplicationId) -> BookingResult<Application> {
        self.load(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Application with ID {} not found", id)))
    }

    /// Deletes the application and frees its slot.
    pub async fn cancel(&self, id: ApplicationId) -> BookingResult<()> {
        let _guard = self.locks.acquire(id).await;
        let application = self.get(id).await?;

        let key = id.key();
        self.retrying("delete", || self.store.delete(&key)).await?;
        self.release(application.appointment_date, application.appointment_time, id)
            .await;

        info!(
            id = %id,
            date = %application.appointment_date,
            time = %application.appointment_time,
            "Cancelled appointment"
        );
        Ok(())
    }

    /// Replaces the payload of an application and optionally moves it.
    ///
    /// Moving to another slot goes through the same claim as `reserve`, so an
    /// edit can never produce a double booking.
    pub async fn update(
        &self,
        id: ApplicationId,
        changes: UpdateApplicationRequest,
    ) -> BookingResult<Application> {
        let _guard = self.locks.acquire(id).await;
        let current = self.get(id).await?;

        let updated = Application {
            id,
            created_at: current.created_at,
            appointment_date: changes.appointment_date.unwrap_or(current.appointment_date),
            appointment_time: changes.appointment_time.unwrap_or(current.appointment_time),
            payload: changes.payload.sanitized(),
        };

        let moved = (updated.appointment_date, updated.appointment_time)
            != (current.appointment_date, current.appointment_time);

        if moved {
            self.policy
                .ensure_bookable(updated.appointment_date, updated.appointment_time)?;
            self.claim(&updated).await?;
        } else {
            let key = slot_key(current.appointment_date, current.appointment_time);
            let holder = self.retrying("get", || self.store.get(&key)).await?;
            if holder != Some(id_value(id)) {
                return Err(BookingError::NotFound(format!(
                    "Application with ID {} no longer holds its slot",
                    id
                )));
            }
        }

        if let Err(err) = self.write(&updated).await {
            if moved {
                self.release(updated.appointment_date, updated.appointment_time, id)
                    .await;
            }
            return Err(err);
        }

        if moved {
            self.release(current.appointment_date, current.appointment_time, id)
                .await;
            info!(
                id = %id,
                from = %format!("{} {}", current.appointment_date, current.appointment_time),
                to = %format!("{} {}", updated.appointment_date, updated.appointment_time),
                "Moved appointment"
            );
        } else {
            info!(id = %id, "Updated application");
        }

        Ok(updated)
    }

    /// Every committed application, newest first.
    pub async fn list_all(&self) -> BookingResult<Vec<Application>> {
        let keys = self
            .retrying("scan", || self.store.scan(APPLICATION_KEY_PREFIX))
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values = self.retrying("mget", || self.store.mget(&keys)).await?;

        // Records deleted between the scan and the fetch come back empty.
        let mut applications = values
            .into_iter()
            .flatten()
            .map(serde_json::from_value::<Application>)
            .collect::<Result<Vec<_>, _>>()?;

        applications.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(applications)
    }

    /// Brings the slot index in line with the stored applications.
    ///
    /// Intended for start-up. Missing claims are created, claims for vanished
    /// applications are dropped, and applications sharing a slot are reported
    /// without being touched.
    pub async fn rebuild_index(&self) -> BookingResult<IndexReport> {
        let mut report = IndexReport::default();

        let mut applications = self.list_all().await?;
        applications.sort_by_key(|application| application.id);

        for application in &applications {
            let key = slot_key(application.appointment_date, application.appointment_time);
            let claimed = self
                .store
                .set_if_absent(&key, id_value(application.id))
                .await?;
            if claimed {
                report.claimed += 1;
                continue;
            }

            let holder = self.retrying("get", || self.store.get(&key)).await?;
            if holder != Some(id_value(application.id)) {
                warn!(
                    id = %application.id,
                    slot = %key,
                    "Application shares its slot with another application"
                );
                report.duplicates.push(application.id);
            }
        }

        let placed: HashMap<ApplicationId, String> = applications
            .iter()
            .map(|application| {
                let key = slot_key(application.appointment_date, application.appointment_time);
                (application.id, key)
            })
            .collect();

        let slot_keys = self
            .retrying("scan", || self.store.scan(SLOT_KEY_PREFIX))
            .await?;
        for key in &slot_keys {
            let holder = self.retrying("get", || self.store.get(key)).await?;
            // The holder must exist and still sit at this slot.
            let held = holder
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<ApplicationId>().ok())
                .is_some_and(|id| placed.get(&id) == Some(key));

            if !held {
                self.retrying("delete", || self.store.delete(key)).await?;
                warn!(slot = %key, "Released slot not held by a stored application");
                report.released += 1;
            }
        }

        info!(
            claimed = report.claimed,
            released = report.released,
            duplicates = report.duplicates.len(),
            "Slot index rebuilt"
        );
        Ok(report)
    }

    async fn load(&self, id: ApplicationId) -> BookingResult<Option<Application>> {
        let key = id.key();
        let value = self.retrying("get", || self.store.get(&key)).await?;
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn write(&self, application: &Application) -> BookingResult<()> {
        let key = application.id.key();
        let value = serde_json::to_value(application)?;
        self.retrying("set", || self.store.set(&key, value.clone()))
            .await?;
        Ok(())
    }

    async fn claim(&self, application: &Application) -> BookingResult<()> {
        let key = slot_key(application.appointment_date, application.appointment_time);
        let claimed = self
            .store
            .set_if_absent(&key, id_value(application.id))
            .await?;
        if !claimed {
            debug!(slot = %key, "Slot claim rejected");
            return Err(BookingError::Conflict(format!(
                "The slot {} {} is already taken",
                application.appointment_date, application.appointment_time
            )));
        }
        Ok(())
    }

    /// Frees a slot if `id` still holds it. Failures are logged, not returned:
    /// the caller's outcome is already decided.
    async fn release(&self, date: NaiveDate, time: TimeOfDay, id: ApplicationId) {
        let key = slot_key(date, time);
        let result = async {
            let holder = self.retrying("get", || self.store.get(&key)).await?;
            if holder == Some(id_value(id)) {
                self.retrying("delete", || self.store.delete(&key)).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;

        if let Err(err) = result {
            warn!(slot = %key, id = %id, "Failed to release slot: {}", err);
        }
    }

    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient store error: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn id_value(id: ApplicationId) -> Value {
    Value::String(id.to_string())
}
