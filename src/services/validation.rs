//! Field rules shared by the registries

use crate::error::{AppError, AppResult};

/// Exact number of decimal digits of a valid ISBN
pub const ISBN_DIGITS: u32 = 13;

/// Maximum number of decimal digits of a publication year
pub const MAX_YEAR_DIGITS: u32 = 4;

/// True when `value` contains only whitespace
pub fn is_blank(value: &str) -> bool {
    value.chars().all(char::is_whitespace)
}

/// Number of decimal digits of `value` (0 has one digit)
pub fn digit_count(value: u64) -> u32 {
    value.checked_ilog10().map_or(1, |log| log + 1)
}

pub fn validate_full_name(full_name: &str) -> AppResult<()> {
    if is_blank(full_name) {
        return Err(AppError::InvalidInput("Author full name must not be empty".to_string()));
    }
    Ok(())
}

/// Checks the bibliographic fields of a book
pub fn validate_book(title: &str, isbn: i64, year: i32) -> AppResult<()> {
    if is_blank(title) {
        return Err(AppError::InvalidInput("Book title must not be empty".to_string()));
    }

    if isbn < 0 || digit_count(isbn.unsigned_abs()) != ISBN_DIGITS {
        return Err(AppError::InvalidInput(format!(
            "ISBN {} must have exactly {} digits",
            isbn, ISBN_DIGITS
        )));
    }

    if digit_count(u64::from(year.unsigned_abs())) > MAX_YEAR_DIGITS {
        return Err(AppError::InvalidInput(format!(
            "Year {} must have at most {} digits",
            year, MAX_YEAR_DIGITS
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank() {
        assert!(is_blank(""));
        assert!(is_blank(" \t\n "));
        assert!(!is_blank(" a "));
    }

    #[test]
    fn test_digit_count() {
        assert_eq!(digit_count(0), 1);
        assert_eq!(digit_count(9), 1);
        assert_eq!(digit_count(10), 2);
        assert_eq!(digit_count(9_782_070_409_228), 13);
    }

    #[test]
    fn test_isbn_length() {
        assert!(validate_book("Germinal", 9_782_070_409_228, 1885).is_ok());
        assert!(validate_book("Germinal", 978_207_040_922, 1885).is_err());
        assert!(validate_book("Germinal", 97_820_704_092_281, 1885).is_err());
        assert!(validate_book("Germinal", -9_782_070_409_228, 1885).is_err());
    }

    #[test]
    fn test_year_length() {
        assert!(validate_book("Germinal", 9_782_070_409_228, 0).is_ok());
        assert!(validate_book("Germinal", 9_782_070_409_228, 9999).is_ok());
        assert!(validate_book("Germinal", 9_782_070_409_228, 10000).is_err());
    }

    #[test]
    fn test_blank_title() {
        let err = validate_book(" \t", 9_782_070_409_228, 1885).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
