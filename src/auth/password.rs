use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;

const SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Returns false for malformed hashes instead of erroring, so a corrupt row
/// reads as a failed login.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

/// Registration policy: at least 8 characters drawn from at least three of
/// uppercase, lowercase, digits and symbols.
pub fn check_complexity(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let classes = [
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| SYMBOLS.contains(c)),
    ];

    if classes.iter().filter(|present| **present).count() < 3 {
        return Err(AppError::bad_request(
            "Password must mix at least three of: uppercase, lowercase, digits, symbols",
        ));
    }
    Ok(())
}

/// Admin resets only enforce the minimum length.
pub fn check_length(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "New password must be at least 8 characters",
        ));
    }
    Ok(())
}
