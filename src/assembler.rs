//! Partial-reading assembler for the legacy per-field topics
//!
//! Legacy firmware publishes each sensor on its own topic. The assembler
//! groups these scalar values into one reading per (module, time bucket).
//!
//! ## Lifecycle of a partial reading
//!
//! ```text
//! first scalar for key ──► created (all fields 0.0, count 0)
//!        │
//!        ▼
//! every scalar for key ──► field overwritten, count += 1
//!        │
//!        ├── count == 5           → removed, returned as completed Reading
//!        └── age > staleness (30s) → removed by sweep, never returned
//! ```
//!
//! The counter increments once per message, not once per distinct field.
//! Five updates to `temperature` alone complete a reading.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::config::AssemblerConfig;
use crate::{Reading, Variable};

/// Number of scalar messages that complete a reading
pub const FIELD_COUNT: u8 = 5;

/// Groups scalar messages believed to belong to the same sampling cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub module_id: String,

    /// `floor(unix_seconds / bucket_width)`
    pub bucket: i64,
}

/// A reading under construction
#[derive(Debug, Clone)]
pub struct PartialReading {
    pub reading: Reading,

    /// Scalar messages applied so far (0-5)
    pub received_count: u8,

    /// Wall-clock time the first message for this key arrived
    pub created_at: DateTime<Utc>,
}

impl PartialReading {
    fn new(module_id: &str, now: DateTime<Utc>) -> Self {
        let mut reading = Reading::new(module_id, now);
        for variable in Variable::ALL {
            reading.set(variable, 0.0);
        }

        Self {
            reading,
            received_count: 0,
            created_at: now,
        }
    }

    fn record(&mut self, variable: Variable, value: f64) {
        self.reading.set(variable, value);
        self.received_count = self.received_count.saturating_add(1);
    }

    fn is_stale(&self, now: DateTime<Utc>, staleness: TimeDelta) -> bool {
        now - self.created_at > staleness
    }
}

/// Owns the working set of in-flight partial readings
///
/// Not synchronized. It must be driven by exactly one consumer, which is
/// the ingest actor.
#[derive(Debug)]
pub struct Assembler {
    working_set: HashMap<BucketKey, PartialReading>,
    bucket_width_secs: i64,
    staleness: TimeDelta,

    /// Partials dropped for staleness since creation
    evicted: u64,
}

impl Assembler {
    pub fn new(config: &AssemblerConfig) -> Self {
        Self {
            working_set: HashMap::new(),
            bucket_width_secs: config.bucket_width_secs.max(1) as i64,
            staleness: TimeDelta::seconds(config.staleness_secs as i64),
            evicted: 0,
        }
    }

    pub fn bucket_key(&self, module_id: &str, now: DateTime<Utc>) -> BucketKey {
        BucketKey {
            module_id: module_id.to_string(),
            bucket: now.timestamp().div_euclid(self.bucket_width_secs),
        }
    }

    /// Apply one scalar value and return the reading if it is now complete
    pub fn ingest_scalar(
        &mut self,
        module_id: &str,
        variable: Variable,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<Reading> {
        let key = self.bucket_key(module_id, now);

        let partial = match self.working_set.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let partial = entry.into_mut();
                // a stale entry must not absorb messages from a later cycle
                if partial.is_stale(now, self.staleness) {
                    debug!(
                        "{module_id}: replacing stale partial reading {} ({}/{FIELD_COUNT})",
                        partial.reading.id, partial.received_count
                    );
                    self.evicted += 1;
                    *partial = PartialReading::new(module_id, now);
                }
                partial
            }
            Entry::Vacant(entry) => {
                trace!("{module_id}: new partial reading for bucket {}", key.bucket);
                entry.insert(PartialReading::new(module_id, now))
            }
        };

        partial.record(variable, value);
        trace!(
            "{module_id}: {variable} = {value} ({}/{FIELD_COUNT})",
            partial.received_count
        );

        if partial.received_count < FIELD_COUNT {
            return None;
        }

        self.working_set
            .remove(&key)
            .map(|partial| partial.reading)
    }

    /// Drop every partial reading older than the staleness threshold
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let staleness = self.staleness;
        let before = self.working_set.len();

        self.working_set.retain(|key, partial| {
            let stale = partial.is_stale(now, staleness);
            if stale {
                debug!(
                    "{}: dropping stale partial reading {} ({}/{FIELD_COUNT})",
                    key.module_id, partial.reading.id, partial.received_count
                );
            }
            !stale
        });

        let evicted = before - self.working_set.len();
        self.evicted += evicted as u64;
        evicted
    }

    /// Number of partial readings currently in flight
    pub fn pending(&self) -> usize {
        self.working_set.len()
    }

    /// Total partial readings dropped for staleness
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn get(&self, key: &BucketKey) -> Option<&PartialReading> {
        self.working_set.get(key)
    }

    /// Discard all in-flight partial readings, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.working_set.len();
        self.working_set.clear();
        dropped
    }
}
