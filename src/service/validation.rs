//! Request validation: per-field rules checked before any service code runs.

use crate::error::{AppError, AppResult};
use regex::Regex;

/// Constraints for one request field. Lengths count characters, not bytes.
#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub pattern: Option<&'static str>,
    pub format: Option<&'static str>,
}

impl ValidationRule {
    pub fn length(min: usize, max: usize) -> Self {
        ValidationRule {
            min_length: Some(min),
            max_length: Some(max),
            ..Default::default()
        }
    }

    pub fn range(min: i64, max: i64) -> Self {
        ValidationRule {
            minimum: Some(min),
            maximum: Some(max),
            ..Default::default()
        }
    }

    pub fn at_least(min: i64) -> Self {
        ValidationRule {
            minimum: Some(min),
            ..Default::default()
        }
    }

    pub fn with_pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_format(mut self, format: &'static str) -> Self {
        self.format = Some(format);
        self
    }
}

/// Implemented by every request body; handlers call it before touching a service.
pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

pub struct RequestValidator;

impl RequestValidator {
    pub fn check_str(field: &str, value: &str, rule: &ValidationRule) -> AppResult<()> {
        let len = value.chars().count();
        if let Some(min) = rule.min_length {
            if len < min {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    field, min
                )));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    field, max
                )));
            }
        }
        if let Some(pattern) = rule.pattern {
            let re = Regex::new(pattern)
                .map_err(|_| AppError::Validation(format!("invalid pattern for {}", field)))?;
            if !re.is_match(value) {
                return Err(AppError::Validation(format!(
                    "{} does not match required pattern",
                    field
                )));
            }
        }
        if let Some(format) = rule.format {
            validate_format(field, value, format)?;
        }
        Ok(())
    }

    pub fn check_opt_str(field: &str, value: Option<&str>, rule: &ValidationRule) -> AppResult<()> {
        match value {
            Some(v) => Self::check_str(field, v, rule),
            None => Ok(()),
        }
    }

    pub fn check_int(field: &str, value: i64, rule: &ValidationRule) -> AppResult<()> {
        if let Some(min) = rule.minimum {
            if value < min {
                return Err(AppError::Validation(format!("{} must be at least {}", field, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if value > max {
                return Err(AppError::Validation(format!("{} must be at most {}", field, max)));
            }
        }
        Ok(())
    }
}

fn validate_format(field: &str, v: &str, format: &str) -> AppResult<()> {
    match format.to_lowercase().as_str() {
        "email" => {
            let mut parts = v.splitn(2, '@');
            let local = parts.next().unwrap_or("");
            let domain = parts.next().unwrap_or("");
            if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
                return Err(AppError::Validation(format!("{} must be a valid email", field)));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_characters() {
        let rule = ValidationRule::length(1, 3);
        assert!(RequestValidator::check_str("name", "张三丰", &rule).is_ok());
        assert!(RequestValidator::check_str("name", "张三丰子", &rule).is_err());
        assert!(RequestValidator::check_str("name", "", &rule).is_err());
    }

    #[test]
    fn integer_bounds() {
        let rule = ValidationRule::range(1901, 2030);
        assert!(RequestValidator::check_int("publish_year", 1901, &rule).is_ok());
        assert!(RequestValidator::check_int("publish_year", 1900, &rule).is_err());
        assert!(RequestValidator::check_int("publish_year", 2031, &rule).is_err());
    }

    #[test]
    fn pattern_and_email_format() {
        let phone = ValidationRule::length(11, 11).with_pattern(r"^[0-9]{11}$");
        assert!(RequestValidator::check_str("phone", "13800138000", &phone).is_ok());
        assert!(RequestValidator::check_str("phone", "1380013800a", &phone).is_err());

        let email = ValidationRule::default().with_format("email");
        assert!(RequestValidator::check_str("email", "a@b.cn", &email).is_ok());
        assert!(RequestValidator::check_str("email", "nope", &email).is_err());
        assert!(RequestValidator::check_str("email", "@b.cn", &email).is_err());
        assert!(RequestValidator::check_opt_str("email", None, &email).is_ok());
    }
}
