//! Shuffled index order with a cursor.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::item::Item;

/// A permutation of `[0, n)` fixed at construction, plus a cursor.
///
/// This is the whole resumable state of a source: resuming means advancing
/// the cursor by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    order: Vec<usize>,
    cursor: usize,
}

impl Permutation {
    /// Shuffle `[0, n)` with the given RNG.
    pub fn shuffled<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        Self { order, cursor: 0 }
    }

    /// Shuffle `[0, n)` deterministically from a seed.
    pub fn seeded(n: usize, seed: u64) -> Self {
        Self::shuffled(n, &mut StdRng::seed_from_u64(seed))
    }

    /// Shuffle `[0, n)` from thread-local entropy.
    pub fn random(n: usize) -> Self {
        Self::shuffled(n, &mut rand::thread_rng())
    }

    /// Build from `seed` when given, otherwise from entropy.
    pub fn from_seed(n: usize, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(n, seed),
            None => Self::random(n),
        }
    }

    /// Get the next item without advancing.
    pub fn peek(&self) -> Option<Item> {
        self.order.get(self.cursor).copied().map(Item)
    }

    /// Hand out the next item and advance the cursor.
    pub fn advance(&mut self) -> Option<Item> {
        let item = self.peek()?;
        self.cursor += 1;
        Some(item)
    }

    /// Total number of items.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the permutation is over an empty range.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Items not yet handed out.
    pub fn remaining(&self) -> usize {
        self.order.len() - self.cursor
    }

    /// Check if every item has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// The full order, including items already handed out.
    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }
}
