//! Proof-of-work solver for the challenge page.

use std::fmt::Write;

use sha2::{Digest, Sha512};
use tokio_util::sync::CancellationToken;

use super::ChallengeError;

/// Hash attempts between cooperative yields.
pub const YIELD_EVERY: u64 = 4096;

/// Hex SHA-512 of `seed` followed by the decimal `nonce`.
pub fn digest_hex(seed: &str, nonce: u64) -> String {
    hex::encode(Sha512::digest(format!("{}{}", seed, nonce).as_bytes()))
}

/// Number of leading `0` characters the hex encoding of `digest` would have.
pub fn leading_zero_nibbles(digest: &[u8]) -> u32 {
    let mut count = 0;
    for byte in digest {
        if *byte == 0 {
            count += 2;
        } else {
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
    }
    count
}

/// Find the smallest nonce (starting at 1) whose digest has at least
/// `difficulty` leading zero hex digits.
///
/// Yields to the scheduler every [`YIELD_EVERY`] attempts and checks `cancel`
/// on every attempt. There is no iteration cap: an unsolvable seed spins
/// until cancelled.
pub async fn solve(
    seed: &str,
    difficulty: u32,
    cancel: &CancellationToken,
) -> Result<u64, ChallengeError> {
    let mut input = String::with_capacity(seed.len() + 20);
    let mut nonce: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ChallengeError::Cancelled);
        }

        nonce += 1;
        input.clear();
        input.push_str(seed);
        let _ = write!(input, "{}", nonce);

        if leading_zero_nibbles(&Sha512::digest(input.as_bytes())) >= difficulty {
            return Ok(nonce);
        }

        if nonce % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
    }
}
