// src/validator.rs - Centralized validation module
use std::collections::HashMap;
use serde::Serialize;
use regex::Regex;
use lazy_static::lazy_static;
use chrono::{Datelike, NaiveDate};
use crate::error::ApiError;
use crate::models::CreateBookingDetailRequest;

lazy_static! {
    // Vietnamese mobile numbers: 0 or +84 prefix, carrier digit, 8 digits
    static ref PHONE_REGEX: Regex = Regex::new(r"^(0|\+84)(3|5|7|8|9)\d{8}$").unwrap();
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

const MAX_AGE_YEARS: i32 = 120;

// ==================== VALIDATION RESULT ====================

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Records the error of a field check, if any.
    pub fn check(&mut self, field: &str, outcome: Result<(), String>) {
        if let Err(message) = outcome {
            self.add_error(field, message);
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        let mut fields: Vec<_> = self.errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let message = fields
            .iter()
            .map(|(field, errors)| format!("{}: {}", field, errors.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        ApiError::ValidationError(message)
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self.to_api_error())
        }
    }
}

// ==================== FIELD VALIDATORS ====================

pub struct FieldValidator;

impl FieldValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            Err(format!("{} cannot be empty", field))
        } else {
            Ok(())
        }
    }

    pub fn length(value: &str, field: &str, min: Option<usize>, max: Option<usize>) -> Result<(), String> {
        let len = value.chars().count();

        if let Some(min_len) = min {
            if len < min_len {
                return Err(format!("{} must be at least {} characters", field, min_len));
            }
        }

        if let Some(max_len) = max {
            if len > max_len {
                return Err(format!("{} must not exceed {} characters", field, max_len));
            }
        }

        Ok(())
    }

    pub fn phone(value: &str) -> Result<(), String> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace() && *c != '.').collect();
        if PHONE_REGEX.is_match(&compact) {
            Ok(())
        } else {
            Err("Invalid phone number (expected 0xxxxxxxxx or +84xxxxxxxxx)".to_string())
        }
    }

    pub fn email(value: &str) -> Result<(), String> {
        if EMAIL_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Invalid email format".to_string())
        }
    }

    /// Appointment dates may be today or later.
    pub fn not_in_past(date: NaiveDate, today: NaiveDate) -> Result<(), String> {
        if date < today {
            Err(format!("Date {} is in the past", date))
        } else {
            Ok(())
        }
    }

    pub fn date_of_birth(dob: NaiveDate, today: NaiveDate) -> Result<(), String> {
        if dob > today {
            return Err("Date of birth cannot be in the future".to_string());
        }
        if today.year() - dob.year() > MAX_AGE_YEARS {
            return Err("Date of birth is not plausible".to_string());
        }
        Ok(())
    }
}

// ==================== REQUEST VALIDATORS ====================

/// Business checks for a new booking line item on top of the derive rules.
pub fn validate_booking_detail(request: &CreateBookingDetailRequest, today: NaiveDate) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.check("full_name", FieldValidator::not_empty(&request.full_name, "Full name"));
    result.check("full_name", FieldValidator::length(&request.full_name, "Full name", Some(2), Some(100)));
    result.check("phone", FieldValidator::phone(&request.phone));
    result.check("date_of_birth", FieldValidator::date_of_birth(request.date_of_birth, today));
    result.check("slot_date", FieldValidator::not_in_past(request.slot_date, today));
    result
}
