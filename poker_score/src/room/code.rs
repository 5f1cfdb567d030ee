//! Six-digit room join codes.

use rand::Rng;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// Draw a random code in 100000..=999999
pub fn generate_room_code() -> String {
    rand::rng().random_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Whether `code` has the shape of a room code
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) && !code.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_room_code();
            assert!(is_valid_room_code(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_code_validation() {
        assert!(is_valid_room_code("123456"));
        assert!(!is_valid_room_code("012345"));
        assert!(!is_valid_room_code("12345"));
        assert!(!is_valid_room_code("12a456"));
        assert!(!is_valid_room_code(" 123456"));
    }
}
