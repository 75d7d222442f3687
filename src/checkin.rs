//! Daily attendance records.
use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{load_collection, save_collection, KeyValueStore, Result, CHECKINS_KEY};

/// One attendance record for a calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCheckIn {
    /// Day key, serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub status: bool,
    /// Free-text remarks for the day
    #[serde(default)]
    pub notes: String,
}

/// Outcome of [`CheckInLog::toggle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInToggle {
    Added(DailyCheckIn),
    Removed(DailyCheckIn),
}

/// At most one check-in per date, persisted under `checkins`.
pub struct CheckInLog {
    records: Vec<DailyCheckIn>,
    kv: Arc<dyn KeyValueStore>,
}

impl CheckInLog {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            records: Vec::new(),
            kv,
        }
    }

    /// Hydrates from storage, keeping the first record seen for any
    /// duplicated date.
    pub fn load(&mut self) -> usize {
        let records: Vec<DailyCheckIn> = load_collection(self.kv.as_ref(), CHECKINS_KEY);
        self.records = one_per_date(records);
        info!("Loaded {} check-ins", self.records.len());
        self.records.len()
    }

    pub fn save(&self) -> Result<()> {
        save_collection(self.kv.as_ref(), CHECKINS_KEY, &self.records)
    }

    /// Checks in for `date`, or removes the existing record for that date.
    pub fn toggle(&mut self, date: NaiveDate, notes: impl Into<String>) -> CheckInToggle {
        let outcome = match self.records.iter().position(|r| r.date == date) {
            Some(index) => CheckInToggle::Removed(self.records.remove(index)),
            None => {
                let record = DailyCheckIn {
                    date,
                    status: true,
                    notes: notes.into(),
                };
                self.records.push(record.clone());
                CheckInToggle::Added(record)
            }
        };

        match &outcome {
            CheckInToggle::Added(r) => info!("Checked in for {}", r.date),
            CheckInToggle::Removed(r) => info!("Removed check-in for {}", r.date),
        }
        if let Err(e) = self.save() {
            warn!("Failed to persist check-ins: {}", e);
        }
        outcome
    }

    pub fn is_checked_in(&self, date: NaiveDate) -> bool {
        self.records.iter().any(|r| r.date == date && r.status)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DailyCheckIn> {
        self.records.iter().find(|r| r.date == date)
    }

    /// Records in insertion order
    pub fn records(&self) -> &[DailyCheckIn] {
        &self.records
    }

    /// Records ordered by date, oldest first
    pub fn sorted(&self) -> Vec<DailyCheckIn> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.date);
        records
    }

    /// Replaces every record, used by archive import. Duplicated dates keep
    /// their first record.
    pub fn replace_all(&mut self, records: Vec<DailyCheckIn>) {
        self.records = one_per_date(records);
        if let Err(e) = self.save() {
            warn!("Failed to persist check-ins: {}", e);
        }
    }

    /// Consecutive checked-in days ending at `today`, or at yesterday when
    /// today has no record yet.
    pub fn current_streak(&self, today: NaiveDate) -> u32 {
        let mut day = if self.is_checked_in(today) {
            today
        } else {
            today - Duration::days(1)
        };

        let mut streak = 0;
        while self.is_checked_in(day) {
            streak += 1;
            day -= Duration::days(1);
        }
        streak
    }
}

/// Keeps the first record for each date.
fn one_per_date(mut records: Vec<DailyCheckIn>) -> Vec<DailyCheckIn> {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.date));
    if records.len() != before {
        warn!(
            "Dropped {} duplicate check-in records",
            before - records.len()
        );
    }
    records
}
