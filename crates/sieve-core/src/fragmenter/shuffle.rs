//! Seeded order erasure for fragment segments

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sieve_model::{ContentHash, CriterionId};

/// Seed for one criterion pass, derived from the run seed
pub(crate) fn criterion_seed(run_seed: u64, criterion: &CriterionId, pass: u16) -> u64 {
    let digest = ContentHash::compute(criterion.as_str().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    run_seed ^ u64::from_le_bytes(head) ^ u64::from(pass).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Shuffle in place; never leaves two or more distinct items in their original order
pub(crate) fn erase_order<T: Clone + PartialEq>(items: &mut [T], seed: u64) {
    if items.len() < 2 {
        return;
    }
    let original = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    if items == original.as_slice() {
        items.rotate_left(1);
    }
}
