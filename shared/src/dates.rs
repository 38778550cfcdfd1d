//! Stay date handling. Check-out is exclusive throughout the system: a
//! stay of 2024-06-01 to 2024-06-03 occupies the nights of the 1st and
//! 2nd and releases the room on the 3rd.

use chrono::NaiveDate;

use crate::error::{ServiceError, ServiceResult};

/// A validated half-open date range for a stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> ServiceResult<Self> {
        if check_in >= check_out {
            return Err(ServiceError::validation("check-out must be after check-in"));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Every occupied night, check-out excluded.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let check_out = self.check_out;
        self.check_in
            .iter_days()
            .take_while(move |d| *d < check_out)
    }
}
