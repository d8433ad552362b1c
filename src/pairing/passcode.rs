//! Constant-time passcode comparison.
//!
//! Both sides are first reduced to fixed-length HMAC-SHA256 digests, so the
//! comparison always walks 32 bytes no matter how long the secret or the
//! submission is, and never exits early.

const DIGEST_KEY: &[u8] = b"nimble-server/passcode/v1";

/// Bytes compared per verification.
pub const DIGEST_LEN: usize = 32;

fn digest(code: &[u8]) -> [u8; DIGEST_LEN] {
    hmac_sha256::HMAC::mac(code, DIGEST_KEY)
}

/// OR-fold the XOR of every byte pair.  `on_step` runs once per byte.
pub fn fold_diff(a: &[u8; DIGEST_LEN], b: &[u8; DIGEST_LEN], mut on_step: impl FnMut()) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
        on_step();
    }
    core::hint::black_box(diff) == 0
}

/// Compare a submitted code with the expected one in constant time.
pub fn codes_match(expected: &[u8], submitted: &[u8]) -> bool {
    fold_diff(&digest(expected), &digest(submitted), || {})
}

/// As [`codes_match`], reporting the number of comparison steps taken.
pub fn codes_match_counted(expected: &[u8], submitted: &[u8]) -> (bool, usize) {
    let mut steps = 0;
    let ok = fold_diff(&digest(expected), &digest(submitted), || steps += 1);
    (ok, steps)
}
