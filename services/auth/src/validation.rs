//! Input validation utilities

use crm::{models::Registration, validation::validate_email};

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_upper {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !has_lower {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !has_digit {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

fn validate_name(field: &str, value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", field));
    }
    if trimmed.chars().count() > 100 {
        return Err(format!("{} must be at most 100 characters long", field));
    }
    Ok(())
}

/// Validate a sign-up request
pub fn validate_registration(registration: &Registration) -> Result<(), String> {
    validate_email(&registration.email)?;
    validate_password(&registration.password)?;
    validate_name("First name", &registration.first_name)?;
    validate_name("Last name", &registration.last_name)?;
    if let Some(name) = &registration.organization_name {
        validate_name("Organization name", name)?;
    }
    Ok(())
}
