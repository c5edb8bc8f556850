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

//! Board state and rules (spec.md §2 "Board"): legality, stone placement,
//! capture, suicide, simple and positional-superko, and Chinese-rules area
//! scoring. Grounded on `FastBoard`/`FastState`/`KoState` in
//! `original_source/`, generalised to plain safe Rust (no bitboards, no
//! libboost): groups and liberties are recomputed by flood fill, which is
//! the same algorithm leela-zero's `FastBoard::calc_reach_color` uses, just
//! without the bitset acceleration.

use std::fmt;

use crate::color::Color;
use crate::point::{from_xy, to_xy, BOARD_SIZE, NUM_VERTICES, PASS};
use crate::zobrist::ZOBRIST;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IllegalMove {
    OccupiedPoint,
    Suicide,
    SimpleKo,
    PositionalSuperko,
    OffBoard,
}

impl fmt::Display for IllegalMove {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            IllegalMove::OccupiedPoint => "occupied point",
            IllegalMove::Suicide => "suicide",
            IllegalMove::SimpleKo => "ko",
            IllegalMove::PositionalSuperko => "positional superko",
            IllegalMove::OffBoard => "off board",
        };
        write!(fmt, "{}", text)
    }
}

#[derive(Clone, Debug)]
pub struct Board {
    stones: Vec<Option<Color>>,
    pub to_move: Color,
    pub ko_point: Option<usize>,
    pub prisoners: [u32; 2],
    pub passes: u32,
    pub komi: f32,
    pub move_number: u32,
    pub hash: u64,
    pub ko_hash: u64,
    /// Stone-only hashes of every position reached so far, oldest first,
    /// used for the positional-superko check (spec.md §2 "Invariants").
    history: Vec<u64>,
}

impl Board {
    pub fn new(komi: f32) -> Self {
        let mut board = Board {
            stones: vec![None; NUM_VERTICES],
            to_move: Color::Black,
            ko_point: None,
            prisoners: [0, 0],
            passes: 0,
            komi,
            move_number: 0,
            hash: 0,
            ko_hash: 0,
            history: Vec::new(),
        };
        board.hash = board.compute_hash();
        board.ko_hash = board.compute_ko_hash();
        board.history.push(board.ko_hash);
        board
    }

    pub fn at(&self, point: usize) -> Option<Color> {
        self.stones[point]
    }

    fn compute_ko_hash(&self) -> u64 {
        let mut hash = 0u64;
        for (point, stone) in self.stones.iter().enumerate() {
            hash ^= match stone {
                Some(Color::Black) => ZOBRIST.black(point),
                Some(Color::White) => ZOBRIST.white(point),
                None => 0,
            };
        }
        hash
    }

    fn compute_hash(&self) -> u64 {
        let mut hash = self.compute_ko_hash();
        if let Some(ko) = self.ko_point {
            hash ^= ZOBRIST.ko(ko);
        }
        if self.to_move == Color::Black {
            hash ^= ZOBRIST.black_to_move;
        }
        hash ^= ZOBRIST.prisoners(0, self.prisoners[0]);
        hash ^= ZOBRIST.prisoners(1, self.prisoners[1]);
        hash ^= ZOBRIST.passes(self.passes);
        hash
    }

    fn neighbors(point: usize) -> Vec<usize> {
        let (x, y) = to_xy(point);
        let mut out = Vec::with_capacity(4);
        if x > 0 {
            out.push(from_xy(x - 1, y));
        }
        if x + 1 < BOARD_SIZE {
            out.push(from_xy(x + 1, y));
        }
        if y > 0 {
            out.push(from_xy(x, y - 1));
        }
        if y + 1 < BOARD_SIZE {
            out.push(from_xy(x, y + 1));
        }
        out
    }

    /// Flood-fills the group containing `point`, returning its member
    /// points and its liberty count. `point` must be occupied.
    fn group_and_liberties(&self, point: usize) -> (Vec<usize>, usize) {
        let color = self.stones[point].expect("group_and_liberties on empty point");
        let mut group = vec![point];
        let mut visited = vec![false; NUM_VERTICES];
        let mut liberties = std::collections::HashSet::new();
        visited[point] = true;

        let mut frontier = vec![point];
        while let Some(p) = frontier.pop() {
            for n in Board::neighbors(p) {
                match self.stones[n] {
                    None => {
                        liberties.insert(n);
                    }
                    Some(c) if c == color && !visited[n] => {
                        visited[n] = true;
                        group.push(n);
                        frontier.push(n);
                    }
                    _ => {}
                }
            }
        }

        (group, liberties.len())
    }

    /// Returns `Ok(captured)` with the points removed from the board, or an
    /// `Err` describing why `point` cannot be played by `color` right now.
    /// Does not mutate `self`; callers use this for both legality probing
    /// (`is_legal`) and the real `play`.
    fn simulate(&self, point: usize, color: Color) -> Result<(Board, Vec<usize>), IllegalMove> {
        if point >= NUM_VERTICES {
            return Err(IllegalMove::OffBoard);
        }
        if self.stones[point].is_some() {
            return Err(IllegalMove::OccupiedPoint);
        }
        if self.ko_point == Some(point) {
            return Err(IllegalMove::SimpleKo);
        }

        let mut next = self.clone();
        next.stones[point] = Some(color);

        let opponent = color.opposite();
        let mut captured = Vec::new();
        for n in Board::neighbors(point) {
            if next.stones[n] == Some(opponent) {
                let (group, liberties) = next.group_and_liberties(n);
                if liberties == 0 {
                    for g in group {
                        next.stones[g] = None;
                        captured.push(g);
                    }
                }
            }
        }

        let (own_group, own_liberties) = next.group_and_liberties(point);
        if own_liberties == 0 {
            return Err(IllegalMove::Suicide);
        }

        next.prisoners[color.index()] += captured.len() as u32;
        next.passes = 0;
        next.ko_point = if captured.len() == 1 && own_group.len() == 1 && own_liberties == 1 {
            Some(captured[0])
        } else {
            None
        };
        next.to_move = opponent;
        next.move_number = self.move_number + 1;
        next.ko_hash = next.compute_ko_hash();
        next.hash = next.compute_hash();

        if next.history.iter().any(|&h| h == next.ko_hash) {
            return Err(IllegalMove::PositionalSuperko);
        }

        Ok((next, captured))
    }

    pub fn is_legal(&self, point: i16, color: Color) -> Result<(), IllegalMove> {
        if point == PASS {
            return Ok(());
        }
        self.simulate(point as usize, color).map(|_| ())
    }

    /// Plays `point` (an intersection, or `PASS`) for `self.to_move`,
    /// mutating the board in place and pushing the new stone-hash onto the
    /// superko history.
    pub fn play(&mut self, point: i16) -> Result<Vec<usize>, IllegalMove> {
        if point == PASS {
            self.passes += 1;
            self.ko_point = None;
            self.move_number += 1;
            let mover = self.to_move;
            self.to_move = mover.opposite();
            self.hash = self.compute_hash();
            self.history.push(self.ko_hash);
            return Ok(Vec::new());
        }

        let (next, captured) = self.simulate(point as usize, self.to_move)?;
        *self = next;
        self.history.push(self.ko_hash);
        Ok(captured)
    }

    /// Places a stone outright, bypassing capture/suicide/ko legality.
    /// Used only for SGF `AB`/`AW` setup stones and handicap placement
    /// (spec.md §6.3), which are not "moves" and carry no ko/capture
    /// semantics of their own.
    pub fn place_setup_stone(&mut self, point: usize, color: Color) {
        self.stones[point] = Some(color);
        self.ko_hash = self.compute_ko_hash();
        self.hash = self.compute_hash();
        self.history.clear();
        self.history.push(self.ko_hash);
    }

    pub fn is_game_over(&self) -> bool {
        self.passes >= 2
    }

    /// Chinese-rules area score from black's point of view: stones plus
    /// territory that reaches only one colour, minus komi. Matches
    /// `FastBoard::area_score`'s flood-fill approach.
    pub fn area_score(&self) -> f32 {
        let mut owner = vec![None; NUM_VERTICES];

        for point in 0..NUM_VERTICES {
            if owner[point].is_some() {
                continue;
            }
            match self.stones[point] {
                Some(c) => owner[point] = Some(c),
                None => {
                    let mut region = vec![point];
                    let mut visited = vec![false; NUM_VERTICES];
                    visited[point] = true;
                    let mut borders = std::collections::HashSet::new();
                    let mut frontier = vec![point];

                    while let Some(p) = frontier.pop() {
                        for n in Board::neighbors(p) {
                            match self.stones[n] {
                                None if !visited[n] => {
                                    visited[n] = true;
                                    region.push(n);
                                    frontier.push(n);
                                }
                                Some(c) => {
                                    borders.insert(c);
                                }
                                _ => {}
                            }
                        }
                    }

                    let territory_owner = if borders.len() == 1 {
                        borders.into_iter().next()
                    } else {
                        None
                    };

                    for r in region {
                        owner[r] = territory_owner;
                    }
                }
            }
        }

        let black = owner.iter().filter(|o| **o == Some(Color::Black)).count() as f32;
        let white = owner.iter().filter(|o| **o == Some(Color::White)).count() as f32;

        black - white - self.komi
    }

    pub fn stones(&self) -> &[Option<Color>] {
        &self.stones
    }
}

impl fmt::Display for Board {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for y in (0..BOARD_SIZE).rev() {
            for x in 0..BOARD_SIZE {
                let c = match self.stones[from_xy(x, y)] {
                    Some(Color::Black) => 'X',
                    Some(Color::White) => 'O',
                    None => '.',
                };
                write!(fmt, "{}", c)?;
            }
            writeln!(fmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::from_xy;

    #[test]
    fn empty_board_has_zero_area_score_minus_komi() {
        let board = Board::new(7.5);
        assert_eq!(board.area_score(), -7.5);
    }

    #[test]
    fn capturing_a_single_stone_removes_it() {
        let mut board = Board::new(7.5);
        // Surround a lone white stone at (1,1) with black stones.
        let white = from_xy(1, 1) as i16;
        let black_points = [(0, 1), (2, 1), (1, 0), (1, 2)];

        board.to_move = Color::White;
        board.play(white).unwrap();

        for (i, &(x, y)) in black_points.iter().enumerate() {
            board.to_move = Color::Black;
            let p = from_xy(x, y) as i16;
            let captured = board.play(p).unwrap();
            if i == black_points.len() - 1 {
                assert_eq!(captured, vec![from_xy(1, 1)]);
            }
        }

        assert_eq!(board.at(from_xy(1, 1)), None);
        assert_eq!(board.prisoners[Color::Black.index()], 1);
    }

    #[test]
    fn suicide_is_illegal() {
        let mut board = Board::new(7.5);
        // White stones surround (0,0), black may not play there.
        board.to_move = Color::White;
        board.play(from_xy(1, 0) as i16).unwrap();
        board.to_move = Color::White;
        board.play(from_xy(0, 1) as i16).unwrap();

        board.to_move = Color::Black;
        assert_eq!(
            board.is_legal(from_xy(0, 0) as i16, Color::Black),
            Err(IllegalMove::Suicide)
        );
    }

    #[test]
    fn simple_ko_forbids_immediate_recapture() {
        // `p` is a lone white stone with a single liberty at `l`; the other
        // three neighbours of `l` are white, so recapturing at `l` leaves
        // black with a single liberty too (the just-vacated `p`) -- the
        // textbook one-stone-for-one-stone snapback shape that triggers a
        // simple ko rather than a plain capture.
        let mut board = Board::new(7.5);
        let p = from_xy(5, 5);
        let l = from_xy(4, 5);
        let north_p = from_xy(5, 6);
        let south_p = from_xy(5, 4);
        let east_p = from_xy(6, 5);
        let north_l = from_xy(4, 6);
        let south_l = from_xy(4, 4);
        let west_l = from_xy(3, 5);

        for &point in &[north_p, south_p, east_p] {
            board.to_move = Color::Black;
            board.play(point as i16).unwrap();
        }
        for &point in &[north_l, south_l, west_l, p] {
            board.to_move = Color::White;
            board.play(point as i16).unwrap();
        }

        board.to_move = Color::Black;
        let captured = board.play(l as i16).unwrap();

        assert_eq!(captured, vec![p]);
        assert_eq!(board.at(p), None);
        assert_eq!(board.ko_point, Some(p));

        board.to_move = Color::White;
        assert_eq!(board.is_legal(p as i16, Color::White), Err(IllegalMove::SimpleKo));
    }

    #[test]
    fn pass_twice_ends_the_game() {
        let mut board = Board::new(7.5);
        board.play(PASS).unwrap();
        board.play(PASS).unwrap();
        assert!(board.is_game_over());
    }

    #[test]
    fn setup_stones_are_placed_without_capturing() {
        let mut board = Board::new(7.5);
        let black = from_xy(3, 3);
        let white = from_xy(3, 4);
        board.place_setup_stone(black, Color::Black);
        board.place_setup_stone(white, Color::White);

        assert_eq!(board.at(black), Some(Color::Black));
        assert_eq!(board.at(white), Some(Color::White));
        assert_eq!(board.prisoners, [0, 0]);
    }
}
