use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const EMAIL_MAX_CHARS: usize = 100;
pub const PASSWORD_MIN_CHARS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(&'static str),
    #[error("name must be between 2 and 50 characters and contain only letters, digits and spaces")]
    InvalidName,
    #[error("invalid email format")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    InvalidPassword,
}

fn email_regex() -> &'static Regex {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    &EMAIL_RE
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        return Err(ValidationError::InvalidName);
    }
    // Unicode letters and digits are allowed, punctuation is not.
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace())
    {
        return Err(ValidationError::InvalidName);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }
    if email.chars().count() > EMAIL_MAX_CHARS || !email_regex().is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ValidationError::InvalidPassword);
    }
    Ok(())
}

/// Checks name, then email, then password, stopping at the first failure.
pub fn validate_user_input(name: &str, email: &str, password: &str) -> Result<(), ValidationError> {
    validate_name(name)?;
    validate_email(email)?;
    validate_password(password)?;
    Ok(())
}
