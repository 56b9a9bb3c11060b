//! Credential validation shared by registration and login.
//!
//! The registration and login flows enforce different password strictness
//! (registration additionally requires a minimum length). Both rules live
//! here, selected by [`CredentialContext`], instead of being duplicated.

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialContext {
    Registration,
    Login,
}

fn has_letter_and_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_alphabetic()) && value.chars().any(|c| c.is_ascii_digit())
}

/// A user id must contain at least one letter and one digit.
///
/// # Errors
/// Returns `AppError::Validation` when the rule is not met.
pub fn validate_userid(value: &str) -> AppResult<()> {
    if !has_letter_and_digit(value) {
        return Err(AppError::Validation(
            "user id must contain both letters and numbers".into(),
        ));
    }
    Ok(())
}

/// A password must contain at least one letter and one digit; in the
/// registration context it must also be at least 8 characters long.
///
/// # Errors
/// Returns `AppError::Validation` when a rule is not met.
pub fn validate_password(value: &str, context: CredentialContext) -> AppResult<()> {
    if context == CredentialContext::Registration && value.chars().count() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters long".into(),
        ));
    }
    if !has_letter_and_digit(value) {
        return Err(AppError::Validation(
            "password must contain both letters and numbers".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn userid_requires_letters_and_digits() {
        assert!(validate_userid("alice").is_err());
        assert!(validate_userid("12345").is_err());
        assert!(validate_userid("alice1").is_ok());
    }

    #[test]
    fn registration_password_requires_length() {
        assert!(validate_password("ab1", CredentialContext::Registration).is_err());
        assert!(validate_password("abcdefg1", CredentialContext::Registration).is_ok());
    }

    #[test]
    fn login_password_skips_length_check() {
        assert!(validate_password("ab1", CredentialContext::Login).is_ok());
        assert!(validate_password("abcdefgh", CredentialContext::Login).is_err());
    }
}
