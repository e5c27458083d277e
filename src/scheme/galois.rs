//! Galois elements for slot rotations
//!
//! For a ring Z[X]/(X^N + 1) with N = 2 · slot_count, the batched slots are
//! permuted cyclically by the automorphisms τ_g(X) = X^g with g a power of
//! the generator 3. Rotating left by `k` slots is τ_{3^k mod 2N}.
//!
//! 3 has order N/2 = slot_count in (Z/2NZ)^*, so its powers are exactly the
//! slot rotations. The remaining units (e.g. 2N - 1) are not rotations.

use std::collections::BTreeSet;

/// Galois element for a left rotation by `steps` slots
pub fn rotation_element(steps: usize, slot_count: usize) -> usize {
    let two_n = 4 * slot_count;
    let mut result = 1usize;
    let mut base = 3 % two_n;
    let mut e = steps % slot_count;

    while e > 0 {
        if e & 1 == 1 {
            result = (result * base) % two_n;
        }
        base = (base * base) % two_n;
        e >>= 1;
    }

    result
}

/// Rotation step realized by Galois element `g`, if it is a power of 3
pub fn element_steps(g: usize, slot_count: usize) -> Option<usize> {
    let two_n = 4 * slot_count;
    let mut val = 1usize;

    for k in 0..slot_count {
        if val == g % two_n {
            return Some(k);
        }
        val = (val * 3) % two_n;
    }

    None
}

/// Elements 3^(2^i) for every i < log2(N) - 1
///
/// These cover the power-of-two steps 1, 2, 4, .., slot_count / 2.
pub fn power_of_two_elements(slot_count: usize) -> Vec<usize> {
    let log_n = (2 * slot_count).trailing_zeros() as usize;
    (0..log_n.saturating_sub(1))
        .map(|i| rotation_element(1 << i, slot_count))
        .collect()
}

/// Sequence of Galois elements whose composition rotates by `steps`
///
/// A direct key for the full step is used when present; otherwise the
/// rotation is split along the binary decomposition of `steps`. Returns the
/// first element that is required but not in `available`.
pub fn rotation_path(
    steps: usize,
    slot_count: usize,
    available: &BTreeSet<usize>,
) -> Result<Vec<usize>, usize> {
    let steps = steps % slot_count;
    if steps == 0 {
        return Ok(Vec::new());
    }

    let direct = rotation_element(steps, slot_count);
    if available.contains(&direct) {
        return Ok(vec![direct]);
    }

    let mut path = Vec::new();
    let mut bit = 0;
    let mut rest = steps;
    while rest > 0 {
        if rest & 1 == 1 {
            let element = rotation_element(1 << bit, slot_count);
            if !available.contains(&element) {
                return Err(element);
            }
            path.push(element);
        }
        rest >>= 1;
        bit += 1;
    }

    Ok(path)
}

/// Check if g is a valid Galois element (odd and coprime to 2N)
pub fn is_valid_galois_element(g: usize, ring_dim: usize) -> bool {
    g % 2 == 1 && g < 2 * ring_dim && gcd(g, 2 * ring_dim) == 1
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
