use crate::error::AppResult;
use crate::service::{RequestValidator, Validate, ValidationRule};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reader_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReaderType {
    Student,
    Teacher,
    Public,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reader_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReaderStatus {
    Active,
    Frozen,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Reader {
    pub reader_id: String,
    pub name: String,
    pub id_card: String,
    pub phone: String,
    pub email: Option<String>,
    pub reader_type: ReaderType,
    pub register_date: DateTime<Utc>,
    pub valid_until: NaiveDate,
    pub status: ReaderStatus,
    pub credit_score: i32,
}

pub const MAX_CREDIT_SCORE: i32 = 100;

impl Reader {
    pub fn is_active(&self) -> bool {
        self.status == ReaderStatus::Active
    }

    /// Active and card not yet expired.
    pub fn is_valid(&self, today: NaiveDate) -> bool {
        self.is_active() && self.valid_until >= today
    }
}

/// Identity fields supplied on register and update.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReaderDetails {
    pub name: String,
    pub id_card: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub reader_type: ReaderType,
}

impl Validate for ReaderDetails {
    fn validate(&self) -> AppResult<()> {
        RequestValidator::check_str("name", &self.name, &ValidationRule::length(1, 50))?;
        RequestValidator::check_str("id_card", &self.id_card, &ValidationRule::length(15, 18))?;
        RequestValidator::check_str(
            "phone",
            &self.phone,
            &ValidationRule::length(11, 11).with_pattern(r"^[0-9]{11}$"),
        )?;
        RequestValidator::check_opt_str(
            "email",
            self.email.as_deref(),
            &ValidationRule {
                max_length: Some(100),
                ..Default::default()
            }
            .with_format("email"),
        )?;
        Ok(())
    }
}

/// Body of `GET /readers/{reader_id}/status`.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ReaderStatusReport {
    pub reader_id: String,
    pub name: String,
    pub status: ReaderStatus,
    pub is_active: bool,
    pub is_valid: bool,
    pub can_borrow: bool,
    pub borrow_reason: String,
    pub credit_score: i32,
    pub valid_until: NaiveDate,
}


#[cfg(test)]
mod tests {
    use super::fixtures::details;
    use super::*;

    #[test]
    fn accepts_well_formed_reader() {
        let d = details(ReaderType::Student, "110101200001011234", "13800138000");
        assert!(d.validate().is_ok());
    }

    #[test]
    fn rejects_bad_phone_and_id_card() {
        assert!(details(ReaderType::Student, "110101200001011234", "1380013800").validate().is_err());
        assert!(details(ReaderType::Student, "1101", "13800138000").validate().is_err());
    }

    #[test]
    fn reader_type_parses_from_snake_case() {
        let t: ReaderType = serde_json::from_value(serde_json::json!("teacher")).unwrap();
        assert_eq!(t, ReaderType::Teacher);
        assert!(serde_json::from_value::<ReaderType>(serde_json::json!("alien")).is_err());
    }
}
