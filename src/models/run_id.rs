//! Run identifiers
//!
//! A run identifier names one execution of one stage. Its text form is
//! `YYYYMMDD-HHMMSS-ffffff-NNNN`: a UTC timestamp with microseconds followed
//! by a sequence discriminator. Every field is fixed width, so lexicographic
//! order is chronological order.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%6f";
const TIMESTAMP_LEN: usize = 22;
const SEQUENCE_LEN: usize = 4;
const MAX_SEQUENCE: u32 = 9999;

/// Last allocated (timestamp, sequence) pair in this process.
static LAST_ALLOCATED: Mutex<Option<(String, u32)>> = Mutex::new(None);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunIdentifier(String);

impl RunIdentifier {
    /// Allocate a fresh identifier.
    ///
    /// Identifiers are strictly increasing in allocation order within a
    /// process, even when the wall clock stalls or steps backwards.
    pub fn mint() -> Self {
        let mut last = LAST_ALLOCATED
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            let stamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
            let (stamp, seq) = match last.as_ref() {
                Some((prev, prev_seq)) if stamp <= *prev => (prev.clone(), prev_seq + 1),
                _ => (stamp, 0),
            };

            if seq > MAX_SEQUENCE {
                // Sequence space for this microsecond is exhausted; wait for the clock.
                std::thread::sleep(std::time::Duration::from_micros(1));
                continue;
            }

            *last = Some((stamp.clone(), seq));
            return Self(format!("{stamp}-{seq:04}"));
        }
    }

    /// Parse an identifier from its text form.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != TIMESTAMP_LEN + 1 + SEQUENCE_LEN {
            bail!("Invalid run identifier '{s}': expected YYYYMMDD-HHMMSS-ffffff-NNNN");
        }
        let (stamp, seq) = s.split_at(TIMESTAMP_LEN);
        let seq = seq.strip_prefix('-').unwrap_or("");
        if seq.len() != SEQUENCE_LEN || !seq.chars().all(|c| c.is_ascii_digit()) {
            bail!("Invalid run identifier '{s}': bad sequence '{seq}'");
        }
        if NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_err() {
            bail!("Invalid run identifier '{s}': bad timestamp '{stamp}'");
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Allocation time encoded in the identifier.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0[..TIMESTAMP_LEN], TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Sequence discriminator within one timestamp.
    pub fn sequence(&self) -> u32 {
        self.0[TIMESTAMP_LEN + 1..].parse().unwrap_or(0)
    }
}

impl std::fmt::Display for RunIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RunIdentifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RunIdentifier {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RunIdentifier> for String {
    fn from(id: RunIdentifier) -> Self {
        id.0
    }
}
