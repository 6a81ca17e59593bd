//! Time-prefixed unique identifiers.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Alphabet used for UID characters. Ambiguous characters (0, 1, I, O, U,
/// V, l) are excluded.
const ALPHABET: &[u8; 55] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

/// Number of characters in a UID.
pub const UID_LEN: usize = 12;

/// A 12-character identifier drawn from a 55-character alphabet.
///
/// The first 2 characters encode a week index, the next 5 the offset into
/// that week as a positional base-55 fraction, and the final 5 are uniform
/// random. UIDs created later therefore tend to sort later, and the random
/// tail keeps same-instant collisions unlikely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Generate a new UID from the current time and random entropy.
    pub fn generate() -> Self {
        let n = ALPHABET.len();
        let now = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_millis() * 1_000_000) as f64;

        let week = 86_400_000_000_000f64 * 7.0;
        let weeks = (now / week).floor();
        let mut ofs = now - weeks * week;
        let mut scale = n as f64;

        let mut id = [0u8; UID_LEN];
        id[0] = ALPHABET[((weeks / scale) as u64 % n as u64) as usize];
        id[1] = ALPHABET[(weeks as u64 % n as u64) as usize];

        for slot in id.iter_mut().take(7).skip(2) {
            let r = (ofs / week * scale).floor();
            ofs -= r * week / scale;
            scale *= n as f64;
            *slot = ALPHABET[r as usize % n];
        }

        let mut rng = rand::thread_rng();
        for slot in id.iter_mut().skip(7) {
            *slot = ALPHABET[rng.gen_range(0..n)];
        }

        Uid(String::from_utf8_lossy(&id).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Uid(s)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Uid(s.to_string())
    }
}
