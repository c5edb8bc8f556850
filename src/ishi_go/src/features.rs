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

//! Feature-plane extraction, the input side of the `Predictor` contract
//! (`ishi_nn::predictor`). Laid out CHW (channel, height, width) like the
//! teacher's `go::features::Features` trait, but with a deliberately small
//! fixed channel count: the convolutional forward pass is out of scope here
//! (spec.md §1 "Non-goals"), so there is no benefit in shipping the
//! teacher's full multi-plane-history encoding only to feed a reference
//! predictor that does not consume most of it.

use crate::board::Board;
use crate::color::Color;
use crate::point::NUM_VERTICES;
use ishi_utils::types::f16;

/// own stones, opponent stones, empty points, side-to-move indicator.
pub const NUM_FEATURES: usize = 4;

pub fn extract(board: &Board, to_move: Color) -> Vec<f16> {
    let mut planes = vec![f16::from(0.0f32); NUM_FEATURES * NUM_VERTICES];
    let opponent = to_move.opposite();

    for point in 0..NUM_VERTICES {
        match board.at(point) {
            Some(c) if c == to_move => planes[point] = f16::from(1.0f32),
            Some(c) if c == opponent => planes[NUM_VERTICES + point] = f16::from(1.0f32),
            None => planes[2 * NUM_VERTICES + point] = f16::from(1.0f32),
            _ => {}
        }
    }

    let side_to_move_value = if to_move == Color::Black { 1.0 } else { 0.0 };
    for point in 0..NUM_VERTICES {
        planes[3 * NUM_VERTICES + point] = f16::from(side_to_move_value);
    }

    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planes_sum_to_one_per_point() {
        let board = Board::new(7.5);
        let planes = extract(&board, Color::Black);

        for point in 0..NUM_VERTICES {
            let own = planes[point].to_f32();
            let opp = planes[NUM_VERTICES + point].to_f32();
            let empty = planes[2 * NUM_VERTICES + point].to_f32();
            assert_eq!(own + opp + empty, 1.0);
        }
    }

    #[test]
    fn side_to_move_plane_is_uniform() {
        let board = Board::new(7.5);
        let planes = extract(&board, Color::White);
        for point in 0..NUM_VERTICES {
            assert_eq!(planes[3 * NUM_VERTICES + point].to_f32(), 0.0);
        }
    }
}
