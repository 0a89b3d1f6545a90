mod id;

pub use id::*;

use chrono::Utc;
use rand::{thread_rng, Rng};

/// Milliseconds since the unix epoch.
pub type Timestamp = i64;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Returns the current time as a [Timestamp].
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Formats a number in lowercase base 36.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();

    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }

    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Returns a random string of lowercase base 36 characters.
pub fn random_base36(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .take(length)
        .collect()
}
