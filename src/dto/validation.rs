//! Validation helpers for DTOs.

use validator::ValidationError;

/// Identifiers are opaque but bounded; anything longer is a hostile payload.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates a wallet address: non-empty, bounded, visible ASCII only.
pub fn validate_wallet(wallet: &str) -> Result<(), ValidationError> {
    validate_identifier(wallet, "wallet")
}

/// Validates a match/lobby identifier: non-empty, bounded, visible ASCII only.
pub fn validate_match_id(match_id: &str) -> Result<(), ValidationError> {
    validate_identifier(match_id, "match_id")
}

fn validate_identifier(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        let mut err = ValidationError::new("identifier_empty");
        err.message = Some(format!("{field} must not be empty").into());
        return Err(err);
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "{field} must be at most {MAX_IDENTIFIER_LEN} characters (got {})",
                value.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !value.chars().all(|c| c.is_ascii_graphic()) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some(format!("{field} must contain only visible ASCII characters").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_wallet_valid() {
        assert!(validate_wallet("0xAbCd1234").is_ok());
        assert!(validate_wallet("GDRXE2BQUC3AZNPVFSCEZ76NJ3WWL25FYFK6RGZGIEKWE4SOOHSUEUVX").is_ok());
        assert!(validate_wallet("a").is_ok());
    }

    #[test]
    fn test_validate_wallet_invalid() {
        assert!(validate_wallet("").is_err()); // empty
        assert!(validate_wallet("wallet with spaces").is_err()); // space
        assert!(validate_wallet("walle\u{7}t").is_err()); // control character
        assert!(validate_wallet(&"x".repeat(129)).is_err()); // too long
    }

    #[test]
    fn test_validate_match_id_valid() {
        assert!(validate_match_id("match-42").is_ok());
        assert!(validate_match_id("6f2c9a").is_ok());
    }

    #[test]
    fn test_validate_match_id_invalid() {
        assert!(validate_match_id("").is_err());
        assert!(validate_match_id("id\nwith\nnewlines").is_err());
    }
}
