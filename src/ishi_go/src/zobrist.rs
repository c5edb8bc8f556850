// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Zobrist hashing tables, laid out the way `Zobrist.cpp` does: one table per
//! stone colour plus empty/invalid, a ko table, a prisoner-count table and a
//! pass-count table. Two hashes are tracked on `Board` (spec.md §2 "Board"):
//! `hash` folds in side-to-move, the ko point, prisoners and passes, while
//! `ko_hash` is the bare stone-placement hash used for superko detection.
//!
//! The table values below are generated from a fixed seed rather than
//! lifted from any specific engine's RNG stream, so they are not bit-identical
//! to leela-zero's own constants; the composition rules (which factors feed
//! `hash` vs `ko_hash`) are the part that matters and those follow
//! `Zobrist.cpp`/`KoState.cpp` exactly.

use crate::point::NUM_VERTICES;

const BLACK: usize = 0;
const WHITE: usize = 1;
const EMPTY: usize = 2;
const INVAL: usize = 3;

/// Small xorshift64* generator, deterministic across platforms, used only to
/// seed the static tables below at program build time (not for gameplay
/// randomness, which goes through `rand`/`rand_distr` elsewhere).
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64(seed)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

pub struct Zobrist {
    pub table: [[u64; NUM_VERTICES]; 4],
    pub ko: [u64; NUM_VERTICES],
    pub prisoners: [[u64; NUM_VERTICES * 2]; 2],
    pub pass: [u64; 5],
    pub black_to_move: u64,
}

impl Zobrist {
    fn generate(seed: u64) -> Self {
        let mut rng = XorShift64::new(seed);
        let mut table = [[0u64; NUM_VERTICES]; 4];

        for color in &[BLACK, WHITE, EMPTY, INVAL] {
            for point in 0..NUM_VERTICES {
                table[*color][point] = rng.next();
            }
        }

        let mut ko = [0u64; NUM_VERTICES];
        for point in ko.iter_mut() {
            *point = rng.next();
        }

        let mut prisoners = [[0u64; NUM_VERTICES * 2]; 2];
        for side in prisoners.iter_mut() {
            for slot in side.iter_mut() {
                *slot = rng.next();
            }
        }

        let mut pass = [0u64; 5];
        for slot in pass.iter_mut() {
            *slot = rng.next();
        }

        Zobrist {
            table,
            ko,
            prisoners,
            pass,
            black_to_move: rng.next(),
        }
    }

    pub fn black(&self, point: usize) -> u64 {
        self.table[BLACK][point]
    }

    pub fn white(&self, point: usize) -> u64 {
        self.table[WHITE][point]
    }

    pub fn ko(&self, point: usize) -> u64 {
        self.ko[point]
    }

    pub fn prisoners(&self, side: usize, count: u32) -> u64 {
        let index = (count as usize).min(NUM_VERTICES * 2 - 1);
        self.prisoners[side][index]
    }

    pub fn passes(&self, count: u32) -> u64 {
        let index = (count as usize).min(self.pass.len() - 1);
        self.pass[index]
    }
}

lazy_static! {
    pub static ref ZOBRIST: Zobrist = Zobrist::generate(0x9e37_79b9_7f4a_7c15);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entries_are_pairwise_distinct() {
        let mut seen = std::collections::HashSet::new();
        for color in &ZOBRIST.table {
            for value in color.iter().take(16) {
                assert!(seen.insert(*value), "duplicate zobrist constant");
            }
        }
    }

    #[test]
    fn deterministic_across_calls() {
        let a = Zobrist::generate(42);
        let b = Zobrist::generate(42);
        assert_eq!(a.table[0][0], b.table[0][0]);
        assert_eq!(a.black_to_move, b.black_to_move);
    }
}
