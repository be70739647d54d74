//! CPython-compatible hashing for the immediate types.
//!
//! Integers and floats hash exactly like CPython so that `hash(1) == hash(1.0)` and
//! mixed numeric dict keys behave. Strings use a fixed-seed aHash: stable within a
//! process, but not equal to CPython's randomized string hashes.

use ahash::RandomState;

const HASH_BITS: u32 = 61;
const HASH_MODULUS: u64 = (1_u64 << HASH_BITS) - 1;
const HASH_INF: i64 = 314_159;

/// Hash reported for `None`; any fixed value works.
pub(crate) const NONE_HASH: i64 = 0x00FC_A864;

/// CPython never returns -1 from a hash function.
#[inline]
fn fix_minus_one(hash: i64) -> i64 {
    if hash == -1 { -2 } else { hash }
}

/// Hash of an `int`, reduced modulo the Mersenne prime 2**61 - 1.
pub(crate) fn hash_int(value: i64) -> i64 {
    let reduced = (value.unsigned_abs() % HASH_MODULUS) as i64;
    fix_minus_one(if value < 0 { -reduced } else { reduced })
}

/// Hash of a `float`, consistent with `hash_int` for integral values.
pub(crate) fn hash_float(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    if value.is_infinite() {
        return if value > 0.0 { HASH_INF } else { -HASH_INF };
    }

    let (mut mantissa, mut exponent) = frexp(value.abs());
    let mut acc: u64 = 0;
    while mantissa != 0.0 {
        acc = ((acc << 28) & HASH_MODULUS) | (acc >> (HASH_BITS - 28));
        mantissa *= 268_435_456.0; // 2**28
        exponent -= 28;
        let digit = mantissa as u64;
        mantissa -= digit as f64;
        acc += digit;
        if acc >= HASH_MODULUS {
            acc -= HASH_MODULUS;
        }
    }

    let exponent = exponent.rem_euclid(HASH_BITS as i32) as u32;
    acc = ((acc << exponent) & HASH_MODULUS) | (acc >> (HASH_BITS - exponent));
    let hash = acc as i64;
    fix_minus_one(if value < 0.0 { -hash } else { hash })
}

/// Decomposes `value` into a mantissa in `[0.5, 1)` and a power-of-two exponent.
fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 {
        return (0.0, 0);
    }
    let bits = value.to_bits();
    let raw_exponent = ((bits >> 52) & 0x7ff) as i32;
    if raw_exponent == 0 {
        // subnormal: scale into the normal range first
        let (mantissa, exponent) = frexp(value * 2f64.powi(64));
        return (mantissa, exponent - 64);
    }
    let mantissa = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (mantissa, raw_exponent - 1022)
}

/// Hash of a `str`.
pub(crate) fn hash_str(value: &str) -> i64 {
    let state = RandomState::with_seeds(
        0x243F_6A88_85A3_08D3,
        0x1319_8A2E_0370_7344,
        0xA409_3822_299F_31D0,
        0x082E_FA98_EC4E_6C89,
    );
    fix_minus_one(state.hash_one(value) as i64)
}

/// Combines element hashes the way CPython's tuple hash (xxHash based) does.
pub(crate) fn hash_tuple(item_hashes: &[i64]) -> i64 {
    const PRIME_1: u64 = 11_400_714_785_074_694_791;
    const PRIME_2: u64 = 14_029_467_366_897_019_727;
    const PRIME_5: u64 = 2_870_177_450_012_600_261;

    let mut acc = PRIME_5;
    for &hash in item_hashes {
        acc = acc.wrapping_add((hash as u64).wrapping_mul(PRIME_2));
        acc = acc.rotate_left(31);
        acc = acc.wrapping_mul(PRIME_1);
    }
    acc = acc.wrapping_add((item_hashes.len() as u64) ^ (PRIME_5 ^ 3_527_539));
    if acc == u64::MAX {
        return 1_546_275_796;
    }
    acc as i64
}

/// Identity hash for objects without value semantics.
pub(crate) fn hash_identity(index: usize) -> i64 {
    fix_minus_one((index as u64).rotate_right(4) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints_match_cpython() {
        assert_eq!(hash_int(0), 0);
        assert_eq!(hash_int(42), 42);
        assert_eq!(hash_int(-1), -2);
        assert_eq!(hash_int(-5), -5);
        assert_eq!(hash_int(1 << 61), 1);
        assert_eq!(hash_int(i64::MAX), 3);
    }

    #[test]
    fn integral_floats_hash_like_ints() {
        for value in [0_i64, 1, -1, 7, 1_000_000, -123_456_789] {
            assert_eq!(hash_float(value as f64), hash_int(value), "value {value}");
        }
    }

    #[test]
    fn float_specials() {
        assert_eq!(hash_float(f64::INFINITY), 314_159);
        assert_eq!(hash_float(f64::NEG_INFINITY), -314_159);
        assert_eq!(hash_float(f64::NAN), 0);
        assert_eq!(hash_float(0.5), 1_152_921_504_606_846_976);
        assert_eq!(hash_float(-2.5), -1_152_921_504_606_846_978);
        assert_eq!(hash_float(1e-310), 615_709_907_932_414_099);
    }

    #[test]
    fn empty_tuple_matches_cpython() {
        assert_eq!(hash_tuple(&[]), 5_740_354_900_026_072_187);
    }

    #[test]
    fn strings_are_stable() {
        assert_eq!(hash_str("spam"), hash_str("spam"));
        assert_ne!(hash_str("spam"), hash_str("eggs"));
    }
}
