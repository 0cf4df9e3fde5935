//! Card number generation and masking.

use rand::Rng;

pub const CARD_NUMBER_LEN: usize = 16;

/// Issuer identification prefixes are at most six digits.
const MAX_PREFIX_LEN: usize = 6;

/// Produces 16-digit numbers starting with a fixed issuer prefix and
/// ending in a Luhn check digit. Uniqueness is the caller's concern.
#[derive(Debug, Clone)]
pub struct CardNumberGenerator {
    prefix: String,
}

impl CardNumberGenerator {
    /// Non-digit characters in the prefix are dropped and it is capped
    /// at six digits.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix
            .into()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .take(MAX_PREFIX_LEN)
            .collect();
        Self { prefix }
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut number = String::with_capacity(CARD_NUMBER_LEN);
        number.push_str(&self.prefix);
        while number.len() < CARD_NUMBER_LEN - 1 {
            number.push((b'0' + rng.gen_range(0..10u8)) as char);
        }
        let check = luhn_check_digit(&number);
        number.push((b'0' + check) as char);
        number
    }
}

impl Default for CardNumberGenerator {
    fn default() -> Self {
        Self::new("444455")
    }
}

/// Check digit that makes the Luhn sum of `partial` plus the digit a
/// multiple of 10. Doubles every second digit from the right, folding
/// results above 9.
fn luhn_check_digit(partial: &str) -> u8 {
    let mut sum = 0u32;
    let mut double = true;
    for c in partial.chars().rev() {
        let mut digit = c.to_digit(10).unwrap_or(0);
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }
    ((10 - sum % 10) % 10) as u8
}

pub fn is_luhn_valid(number: &str) -> bool {
    if number.len() != CARD_NUMBER_LEN || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    let mut double = false;
    for c in number.chars().rev() {
        let mut digit = c.to_digit(10).unwrap_or(0);
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }
    sum % 10 == 0
}

/// Display form hiding everything but the last four digits.
pub fn mask(number: &str) -> String {
    if number.len() < 4 {
        return number.to_string();
    }
    format!("**** **** **** {}", &number[number.len() - 4..])
}
