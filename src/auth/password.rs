use crate::error::{AppError, AppResult};

/// bcrypt cost factor. Matches the hashes already present in migrated data.
const HASH_COST: u32 = 10;

pub fn hash(password: &str) -> AppResult<String> {
    bcrypt::hash(password, HASH_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a plaintext password against a stored hash. Any bcrypt parse
/// failure counts as a mismatch rather than an error.
pub fn verify(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hashed = hash("senha123").unwrap();
        assert!(verify("senha123", &hashed));
        assert!(!verify("senha124", &hashed));
    }

    #[test]
    fn hash_is_salted() {
        let h1 = hash("senha123").unwrap();
        let h2 = hash("senha123").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify("senha123", "not-a-bcrypt-hash"));
    }
}
