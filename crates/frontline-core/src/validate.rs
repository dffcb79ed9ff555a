//! Input validation shared by the store and HTTP layers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(Error::Validation(format!("invalid email address: {email}")))
    }
}

/// Reduce a phone number to the bare digits WhatsApp expects (E.164 without `+`).
pub fn normalize_phone(phone: &str) -> Result<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if (8..=15).contains(&digits.len()) {
        Ok(digits)
    } else {
        Err(Error::Validation(format!(
            "phone number must contain 8 to 15 digits, got {}",
            digits.len()
        )))
    }
}

pub fn require_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::Validation(format!("{field} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

pub fn validate_price(price: f64) -> Result<f64> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(Error::Validation("price must be a non-negative number".into()))
    }
}

pub fn validate_rating(stars: i64) -> Result<u8> {
    match u8::try_from(stars) {
        Ok(s @ 1..=5) => Ok(s),
        _ => Err(Error::Validation(format!("rating must be 1-5, got {stars}"))),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
