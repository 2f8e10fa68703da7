//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::models::CustomFields;

/// Validate that a display field is present
pub fn validate_required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a 0-100 score such as probability or lead score
pub fn validate_percentage(field: &str, value: i32) -> Result<(), String> {
    if !(0..=100).contains(&value) {
        return Err(format!("{} must be between 0 and 100", field));
    }

    Ok(())
}

/// Validate an ISO 4217 style currency code
pub fn validate_currency(currency: &str) -> Result<(), String> {
    static CURRENCY_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = CURRENCY_REGEX
        .get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("Failed to compile currency regex"));

    if !regex.is_match(currency) {
        return Err("Currency must be a three-letter upper-case code".to_string());
    }

    Ok(())
}

/// Validate a monetary amount
pub fn validate_amount(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{} must be a finite number", field));
    }

    if value < 0.0 {
        return Err(format!("{} must not be negative", field));
    }

    Ok(())
}

pub fn validate_custom_fields(fields: &CustomFields) -> Result<(), String> {
    fields.validate().map_err(|e| e.to_string())
}
