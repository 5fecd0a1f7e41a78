//! Date-range chunking for bulk background jobs.
//!
//! An unbounded population (all users, all subscribers) is processed as a
//! sequence of fixed-size registration-date ranges. The chunk is re-derived
//! from the live boundary on every bulk invocation and never persisted:
//! resumability comes from the parent job's lock preventing overlapping
//! passes, not from checkpointing the cursor.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use courier_common::types::BoundaryRange;

/// A cursor over a [`BoundaryRange`], advancing in fixed steps of days.
///
/// Ranges are half-open: an entity registered exactly on a chunk's end date
/// belongs to the next chunk, never to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateChunk {
    pub start: NaiveDate,
    pub size_days: u32,
    pub max: NaiveDate,
}

impl DateChunk {
    /// Seed a chunk sequence from the population boundary.
    pub fn initial(boundary: BoundaryRange, size_days: u32) -> Self {
        Self {
            start: boundary.first_registration_date,
            size_days,
            max: boundary.last_registration_date,
        }
    }

    /// The `[start, end)` range this chunk covers, with `end` clamped to the
    /// boundary maximum.
    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        let end = self
            .start
            .checked_add_days(Days::new(self.size_days as u64))
            .unwrap_or(self.max)
            .min(self.max);
        (self.start, end)
    }

    /// The chunk after this one. May be exhausted.
    pub fn next(&self) -> Self {
        Self {
            start: self
                .start
                .checked_add_days(Days::new(self.size_days as u64))
                .unwrap_or(self.max),
            size_days: self.size_days,
            max: self.max,
        }
    }

    /// True once the cursor has moved past the boundary: no further work.
    pub fn is_exhausted(&self) -> bool {
        self.start >= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(n))
            .unwrap()
    }

    fn boundary(first: u64, last: u64) -> BoundaryRange {
        BoundaryRange {
            first_registration_date: day(first),
            last_registration_date: day(last),
        }
    }

    #[test]
    fn test_chunk_sequence_covers_boundary() {
        // boundary (day 0, day 65), size 30 -> [0,30) [30,60) [60,65)
        let mut chunk = DateChunk::initial(boundary(0, 65), 30);

        assert_eq!(chunk.range(), (day(0), day(30)));
        chunk = chunk.next();
        assert_eq!(chunk.range(), (day(30), day(60)));
        chunk = chunk.next();
        assert_eq!(chunk.range(), (day(60), day(65)));
        chunk = chunk.next();
        assert!(chunk.is_exhausted());
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let mut chunk = DateChunk::initial(boundary(0, 60), 30);
        assert!(!chunk.is_exhausted());
        chunk = chunk.next();
        assert_eq!(chunk.range(), (day(30), day(60)));
        chunk = chunk.next();
        assert!(chunk.is_exhausted());
    }

    #[test]
    fn test_empty_boundary_is_immediately_exhausted() {
        let chunk = DateChunk::initial(boundary(10, 10), 30);
        assert!(chunk.is_exhausted());
    }

    #[test]
    fn test_ranges_are_half_open() {
        let chunk = DateChunk::initial(boundary(0, 65), 30);
        let (_, end) = chunk.range();
        let (next_start, _) = chunk.next().range();
        // a user registered exactly on `end` falls into the next chunk
        assert_eq!(end, next_start);
    }

    #[test]
    fn test_round_trips_through_json() {
        let chunk = DateChunk::initial(boundary(0, 65), 30);
        let json = serde_json::to_string(&chunk).unwrap();
        let back: DateChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(chunk, back);
    }
}
