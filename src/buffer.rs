//! # Recency Buffer
//!
//! Fixed-capacity ring buffer holding the most recent records of one class.
//!
//! Producers push readings in real time, so insertion order is also
//! timestamp order. When the buffer is full the oldest record is dropped;
//! this is normal operation, not an error.

use std::collections::VecDeque;
use std::time::Duration;

use crate::record::{now_timestamp, Record};

/// Default number of records retained per class
pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

/// Multiplier applied to the freshness window before a record counts as stale.
/// Tolerates one missed read cycle.
const FRESHNESS_TOLERANCE: f64 = 2.0;

/// Ring buffer of the last `capacity` records
#[derive(Debug, Clone)]
pub struct RecencyBuffer<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T: Record> RecencyBuffer<T> {
    /// Create an empty buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one when full
    pub fn push(&mut self, record: T) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recent record, optionally filtered by freshness
    ///
    /// With `freshness` set, returns `None` when the newest record is older
    /// than twice the window.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use greybike::buffer::RecencyBuffer;
    /// use greybike::record::ElectricalReading;
    ///
    /// let mut buffer = RecencyBuffer::new(10);
    /// buffer.push(ElectricalReading::new(1.2, 48.0, None));
    /// assert!(buffer.latest(Some(Duration::from_secs(1))).is_some());
    /// ```
    pub fn latest(&self, freshness: Option<Duration>) -> Option<&T> {
        self.latest_at(now_timestamp(), freshness)
    }

    /// Same as [`latest`](Self::latest) with an explicit current time
    pub fn latest_at(&self, now: f64, freshness: Option<Duration>) -> Option<&T> {
        let record = self.records.back()?;
        match freshness {
            Some(window) => {
                let max_age = window.as_secs_f64() * FRESHNESS_TOLERANCE;
                if now - record.timestamp() > max_age {
                    None
                } else {
                    Some(record)
                }
            }
            None => Some(record),
        }
    }

    /// Retained records from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
