//! Date display helpers.

use crate::error::{AppError, AppResult};
use chrono::NaiveDate;

pub const ISO_DATE: &str = "%Y-%m-%d";
pub const DAY_MONTH_YEAR: &str = "%d/%m/%Y";

/// `2023-10-05` -> `05/10/2023`.
pub fn to_day_month_year(input: &str) -> AppResult<String> {
    let date = NaiveDate::parse_from_str(input.trim(), ISO_DATE)
        .map_err(|_| AppError::Validation(format!("'{}' is not a YYYY-MM-DD date", input)))?;
    Ok(date.format(DAY_MONTH_YEAR).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_date_becomes_day_month_year() {
        assert_eq!(to_day_month_year("2023-10-05").unwrap(), "05/10/2023");
        assert_eq!(to_day_month_year("2024-02-29").unwrap(), "29/02/2024");
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(to_day_month_year("invalid-date"), Err(AppError::Validation(_))));
        assert!(to_day_month_year("2023-02-30").is_err());
        assert!(to_day_month_year("05/10/2023").is_err());
        assert!(to_day_month_year("").is_err());
    }
}
