//! Loan policy: loan periods, borrow limits, card validity, fines and credit deductions.

use crate::model::ReaderType;
use chrono::{Duration, NaiveDate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoanPolicy {
    pub max_renewals: i32,
    pub min_credit_score: i32,
    pub daily_fine_cents: i64,
    /// Charged when a lost item is reported without an explicit fine.
    pub lost_fine_cents: i64,
    pub max_active_reservations: i64,
    pub reservation_hold_days: i64,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        LoanPolicy {
            max_renewals: 2,
            min_credit_score: 60,
            daily_fine_cents: 100,
            lost_fine_cents: 5000,
            max_active_reservations: 3,
            reservation_hold_days: 3,
        }
    }
}

impl LoanPolicy {
    /// Days per loan and per renewal.
    pub fn loan_days(&self, reader_type: ReaderType) -> i64 {
        match reader_type {
            ReaderType::Student => 30,
            ReaderType::Teacher => 60,
            ReaderType::Public => 15,
        }
    }

    pub fn max_active_borrows(&self, reader_type: ReaderType) -> i64 {
        match reader_type {
            ReaderType::Student => 5,
            ReaderType::Teacher => 10,
            ReaderType::Public => 3,
        }
    }

    pub fn card_validity_days(&self, reader_type: ReaderType) -> i64 {
        match reader_type {
            ReaderType::Student => 365,
            ReaderType::Teacher => 365 * 3,
            ReaderType::Public => 180,
        }
    }

    pub fn due_date(&self, reader_type: ReaderType, from: NaiveDate) -> NaiveDate {
        from + Duration::days(self.loan_days(reader_type))
    }

    pub fn valid_until(&self, reader_type: ReaderType, today: NaiveDate) -> NaiveDate {
        today + Duration::days(self.card_validity_days(reader_type))
    }

    /// Fine in cents for returning on `returned_on`; zero when on time.
    pub fn overdue_fine_cents(&self, due_date: NaiveDate, returned_on: NaiveDate) -> i64 {
        let late = (returned_on - due_date).num_days();
        if late <= 0 {
            0
        } else {
            late.saturating_mul(self.daily_fine_cents)
        }
    }

    /// One point per whole currency unit of fine, at most 10.
    pub fn return_credit_deduction(&self, fine_cents: i64) -> i32 {
        (fine_cents / 100).clamp(0, 10) as i32
    }

    /// One point per five currency units of fine, at most 20.
    pub fn lost_credit_deduction(&self, fine_cents: i64) -> i32 {
        (fine_cents / 500).clamp(0, 20) as i32
    }

    /// One point per day overdue, at most 10.
    pub fn overdue_credit_deduction(&self, days_overdue: i64) -> i32 {
        days_overdue.clamp(0, 10) as i32
    }
}
