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

//! The 8 symmetries of the dihedral group D4, used by the cache (spec.md
//! §4.1 "symmetry-aware lookup fallback") and the feature planes to fold an
//! under-explored position onto one already seen under a different
//! rotation/reflection.

use crate::point::{from_xy, to_xy, BOARD_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symmetry {
    Identity,
    Rot90,
    Rot180,
    Rot270,
    FlipHorizontal,
    FlipVertical,
    FlipMainDiagonal,
    FlipAntiDiagonal,
}

pub const ALL: [Symmetry; 8] = [
    Symmetry::Identity,
    Symmetry::Rot90,
    Symmetry::Rot180,
    Symmetry::Rot270,
    Symmetry::FlipHorizontal,
    Symmetry::FlipVertical,
    Symmetry::FlipMainDiagonal,
    Symmetry::FlipAntiDiagonal,
];

impl Symmetry {
    /// Applies this symmetry to a board point, treated as belonging to a
    /// `BOARD_SIZE x BOARD_SIZE` grid.
    pub fn apply(self, point: usize) -> usize {
        let (x, y) = to_xy(point);
        let n = BOARD_SIZE - 1;

        let (nx, ny) = match self {
            Symmetry::Identity => (x, y),
            Symmetry::Rot90 => (y, n - x),
            Symmetry::Rot180 => (n - x, n - y),
            Symmetry::Rot270 => (n - y, x),
            Symmetry::FlipHorizontal => (n - x, y),
            Symmetry::FlipVertical => (x, n - y),
            Symmetry::FlipMainDiagonal => (y, x),
            Symmetry::FlipAntiDiagonal => (n - y, n - x),
        };

        from_xy(nx, ny)
    }

    /// The symmetry that undoes this one; every element of D4 has an
    /// inverse within the group.
    pub fn inverse(self) -> Symmetry {
        match self {
            Symmetry::Rot90 => Symmetry::Rot270,
            Symmetry::Rot270 => Symmetry::Rot90,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::NUM_VERTICES;

    #[test]
    fn each_symmetry_is_a_bijection() {
        for sym in ALL.iter() {
            let mut seen = vec![false; NUM_VERTICES];
            for point in 0..NUM_VERTICES {
                let mapped = sym.apply(point);
                assert!(!seen[mapped], "{:?} collided at {}", sym, point);
                seen[mapped] = true;
            }
        }
    }

    #[test]
    fn inverse_round_trips() {
        for sym in ALL.iter() {
            for point in 0..NUM_VERTICES {
                let there = sym.apply(point);
                let back = sym.inverse().apply(there);
                assert_eq!(back, point);
            }
        }
    }

    #[test]
    fn identity_is_a_fixed_point_map() {
        for point in 0..NUM_VERTICES {
            assert_eq!(Symmetry::Identity.apply(point), point);
        }
    }
}
