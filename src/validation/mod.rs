use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::{NewPaymentLink, PayerData};

pub const TITLE_MAX_LEN: usize = 120;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
pub const SUCCESS_MESSAGE_MAX_LEN: usize = 500;
pub const EMAIL_MAX_LEN: usize = 254;
pub const NAME_MAX_LEN: usize = 120;
pub const PHONE_MIN_DIGITS: usize = 7;
pub const PHONE_MAX_DIGITS: usize = 15;
pub const CURRENCY_LEN: usize = 3;
pub const SHORT_CODE_MIN_LEN: usize = 6;
pub const SHORT_CODE_MAX_LEN: usize = 10;
pub const MINOR_UNIT_SCALE: i64 = 2;
pub const PROVIDER_REFERENCE_MAX_LEN: usize = 255;
pub const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Collapses whitespace runs to one space, then drops other control characters.
pub fn sanitize_string(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.chars().filter(|ch| !ch.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::zero() {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Rejects amounts that cannot be expressed exactly in minor units.
pub fn validate_minor_units(amount: &BigDecimal) -> ValidationResult {
    if amount.with_scale(MINOR_UNIT_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", MINOR_UNIT_SCALE),
        ));
    }

    Ok(())
}

pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    validate_positive_amount(amount)?;
    validate_minor_units(amount)
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    validate_required("currency", currency)?;

    if currency.len() != CURRENCY_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            format!("must be {} uppercase letters", CURRENCY_LEN),
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult {
    let email = sanitize_string(email);
    validate_required("email", &email)?;
    validate_max_len("email", &email, EMAIL_MAX_LEN)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !domain.contains('@')
                && !email.contains(' ')
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::new("email", "must be a valid email address"));
    }

    Ok(())
}

pub fn validate_phone(phone: &str) -> ValidationResult {
    let phone = sanitize_string(phone);
    validate_required("phone", &phone)?;

    let body = phone.strip_prefix('+').unwrap_or(&phone);
    if !body
        .chars()
        .all(|ch| ch.is_ascii_digit() || ch == ' ' || ch == '-')
    {
        return Err(ValidationError::new(
            "phone",
            "must contain only digits, spaces, or dashes",
        ));
    }

    let digits = body.chars().filter(|ch| ch.is_ascii_digit()).count();
    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits) {
        return Err(ValidationError::new(
            "phone",
            format!(
                "must contain between {} and {} digits",
                PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
            ),
        ));
    }

    Ok(())
}

/// Email and name, the minimum the card widget needs.
pub fn validate_payer_identity(payer: &PayerData) -> ValidationResult {
    validate_email(payer.email.as_deref().unwrap_or_default())?;

    let name = sanitize_string(payer.name.as_deref().unwrap_or_default());
    validate_required("name", &name)?;
    validate_max_len("name", &name, NAME_MAX_LEN)?;

    Ok(())
}

pub fn validate_payer(payer: &PayerData, require_phone: bool) -> ValidationResult {
    validate_payer_identity(payer)?;

    match payer.phone.as_deref() {
        Some(phone) => validate_phone(phone),
        None if require_phone => Err(ValidationError::new("phone", "must not be empty")),
        None => Ok(()),
    }
}

pub fn validate_short_code(short_code: &str) -> ValidationResult {
    validate_required("short_code", short_code)?;

    if !(SHORT_CODE_MIN_LEN..=SHORT_CODE_MAX_LEN).contains(&short_code.len()) {
        return Err(ValidationError::new(
            "short_code",
            format!(
                "must be between {} and {} characters",
                SHORT_CODE_MIN_LEN, SHORT_CODE_MAX_LEN
            ),
        ));
    }

    if !short_code
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(
            "short_code",
            "must contain only URL-safe characters",
        ));
    }

    Ok(())
}

/// Provider references end up in provider URL paths.
pub fn validate_provider_reference(reference: &str) -> ValidationResult {
    validate_required("provider_reference", reference)?;
    validate_max_len("provider_reference", reference, PROVIDER_REFERENCE_MAX_LEN)?;

    if !reference
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(ValidationError::new(
            "provider_reference",
            "must contain only letters, digits, or underscores",
        ));
    }

    Ok(())
}

pub fn validate_redirect_url(raw: &str) -> ValidationResult {
    let parsed = url::Url::parse(raw)
        .map_err(|_| ValidationError::new("redirect_url", "must be an absolute URL"))?;
    validate_enum("redirect_url", parsed.scheme(), ALLOWED_URL_SCHEMES)
}

/// Normalizes and checks merchant input for a new link.
pub fn validate_new_link(
    input: &NewPaymentLink,
    now: DateTime<Utc>,
) -> Result<NewPaymentLink, ValidationError> {
    let title = sanitize_string(&input.title);
    validate_required("title", &title)?;
    validate_max_len("title", &title, TITLE_MAX_LEN)?;

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    if let Some(description) = &description {
        validate_max_len("description", description, DESCRIPTION_MAX_LEN)?;
    }

    validate_amount(&input.amount)?;

    let currency = input.currency.trim().to_ascii_uppercase();
    validate_currency(&currency)?;

    if let Some(max_uses) = input.max_uses {
        if max_uses <= 0 {
            return Err(ValidationError::new("max_uses", "must be greater than zero"));
        }
    }

    if let Some(expires_at) = input.expires_at {
        if expires_at <= now {
            return Err(ValidationError::new("expires_at", "must be in the future"));
        }
    }

    if let Some(redirect_url) = &input.redirect_url {
        validate_redirect_url(redirect_url)?;
    }

    if let Some(message) = &input.success_message {
        validate_max_len("success_message", message, SUCCESS_MESSAGE_MAX_LEN)?;
    }

    Ok(NewPaymentLink {
        title,
        description,
        currency,
        ..input.clone()
    })
}
