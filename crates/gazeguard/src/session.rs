//! Attendance session: the roster, who has been credited, and the attendance table.

use crate::roster::Roster;
use chrono::NaiveTime;
use gazeguard_core::{Embedding, Matcher, NearestMatcher};
use std::collections::HashSet;
use std::fmt;

/// Arrival times are recorded and reported as `HH:MM:SS`.
pub const ARRIVAL_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Absent,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Present => f.write_str("Present"),
            Status::Absent => f.write_str("Absent"),
        }
    }
}

/// One row of the attendance table.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub name: String,
    pub arrival: Option<NaiveTime>,
    pub status: Status,
}

impl AttendanceRecord {
    fn absent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arrival: None,
            status: Status::Absent,
        }
    }

    /// Arrival time as `HH:MM:SS`, empty while absent.
    pub fn arrival_text(&self) -> String {
        self.arrival
            .map(|t| t.format(ARRIVAL_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// End-of-run totals derived from the attendance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub present_names: Vec<String>,
    pub absent_names: Vec<String>,
}

impl Summary {
    pub fn present(&self) -> usize {
        self.present_names.len()
    }

    pub fn absent(&self) -> usize {
        self.absent_names.len()
    }
}

/// Owns all mutable attendance state for one run.
///
/// Records only ever move from Absent to Present, and each name is credited
/// at most once.
pub struct Session {
    roster: Roster,
    matcher: NearestMatcher,
    recognized: HashSet<String>,
    records: Vec<AttendanceRecord>,
}

impl Session {
    pub fn new(roster: Roster) -> Self {
        let records = roster.names().iter().map(|n| AttendanceRecord::absent(n)).collect();
        Self {
            roster,
            matcher: NearestMatcher::new(),
            recognized: HashSet::new(),
            records,
        }
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Name of the enrolled person this descriptor belongs to, if any.
    pub fn identify(&self, probe: &Embedding) -> Option<&str> {
        let result = self.matcher.compare(probe, self.roster.descriptors());
        tracing::trace!(distance = result.distance, nearest = ?result.nearest, matched = result.matched, "match");
        result.accepted().map(|idx| self.roster.name(idx))
    }

    /// Credit `name` with an arrival at `at`.
    ///
    /// Returns `true` only for the first arrival of that name in this session;
    /// later calls leave the table untouched.
    pub fn record_arrival(&mut self, name: &str, at: NaiveTime) -> bool {
        if self.recognized.contains(name) {
            return false;
        }

        let mut credited = false;
        for record in self.records.iter_mut().filter(|r| r.name == name) {
            record.arrival = Some(at);
            record.status = Status::Present;
            credited = true;
        }

        if credited {
            self.recognized.insert(name.to_string());
            tracing::info!(name, arrival = %at.format(ARRIVAL_FORMAT), "arrival recorded");
        }
        credited
    }

    pub fn is_recognized(&self, name: &str) -> bool {
        self.recognized.contains(name)
    }

    pub fn summary(&self) -> Summary {
        let (present, absent): (Vec<_>, Vec<_>) =
            self.records.iter().partition(|r| r.status == Status::Present);

        Summary {
            total: self.records.len(),
            present_names: present.into_iter().map(|r| r.name.clone()).collect(),
            absent_names: absent.into_iter().map(|r| r.name.clone()).collect(),
        }
    }
}
