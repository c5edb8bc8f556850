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

//! Per-mode search knobs, grounded on `dg_mcts::options::SearchOptions` /
//! `PolicyChecker` traits: what varies between an engine playing a GTP
//! game and one generating self-play scoring data is not the search
//! algorithm, just a handful of policies layered on top of it (whether
//! root noise is applied, whether a move into one's own eye is ever a
//! policy candidate).

use ishi_go::{Board, Color, Move};

/// Filters candidate moves before they become tree children. The default
/// (`StandardSearch`) forbids playing into a one-point eye, mirroring the
/// teacher's `is_eye` heuristic; a training/self-play mode may want to
/// allow it so that the resulting statistics are not biased.
pub trait PolicyChecker: Send + Sync {
    fn is_policy_candidate(&self, board: &Board, color: Color, point: Move) -> bool;
}

/// Root-level options: whether Dirichlet noise is mixed into priors, and
/// whether a "pass wins" shortcut is allowed to end search early.
pub trait SearchOptions: PolicyChecker {
    /// `Some((epsilon, alpha))` when root noise should be applied
    /// (spec.md §4.4 `dirichlet_noise`); `None` disables it entirely.
    fn dirichlet_noise(&self) -> Option<(f32, f32)>;

    /// Dumb-pass mode: never avoid passing even when an alternative would
    /// score better (spec.md §4.5 "Best-move selection" post-filters).
    fn dumbpass(&self) -> bool;
}

/// One-point-eye heuristic: `point` is empty and every orthogonal
/// neighbour on the board is a `color` stone. This is the cheap
/// approximation `dg_mcts`'s `is_eye` uses; it does not attempt the
/// full diagonal-control check real eye detection needs, which is a
/// deliberate simplification appropriate for a policy pre-filter rather
/// than a scoring decision.
pub fn is_eye(board: &Board, color: Color, point: usize) -> bool {
    if board.at(point).is_some() {
        return false;
    }

    let (x, y) = ishi_go::point::to_xy(point);
    let neighbors = [
        (x.checked_sub(1), Some(y)),
        (Some(x + 1).filter(|&v| v < ishi_go::point::BOARD_SIZE), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), Some(y + 1).filter(|&v| v < ishi_go::point::BOARD_SIZE)),
    ];

    for (nx, ny) in neighbors.iter() {
        match (nx, ny) {
            (Some(nx), Some(ny)) => {
                let neighbor_point = ishi_go::point::from_xy(*nx, *ny);
                if board.at(neighbor_point) != Some(color) {
                    return false;
                }
            }
            _ => {
                // An off-board neighbour does not disqualify an edge/corner
                // eye; leela-zero's own heuristic treats the board edge as
                // friendly.
            }
        }
    }

    true
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StandardSearch {
    pub noise: bool,
}

impl PolicyChecker for StandardSearch {
    fn is_policy_candidate(&self, board: &Board, color: Color, point: Move) -> bool {
        if point as usize >= ishi_go::NUM_VERTICES {
            return true;
        }
        !is_eye(board, color, point as usize)
    }
}

impl SearchOptions for StandardSearch {
    fn dirichlet_noise(&self) -> Option<(f32, f32)> {
        if self.noise {
            let area = ishi_go::NUM_VERTICES as f32;
            Some((0.25, 0.03 * 361.0 / area))
        } else {
            None
        }
    }

    fn dumbpass(&self) -> bool {
        false
    }
}

/// Deterministic variant of `StandardSearch`: same policy filter, no root
/// noise, used for reproducible analysis sessions (`lz-analyze`).
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardDeterministicSearch;

impl PolicyChecker for StandardDeterministicSearch {
    fn is_policy_candidate(&self, board: &Board, color: Color, point: Move) -> bool {
        StandardSearch::default().is_policy_candidate(board, color, point)
    }
}

impl SearchOptions for StandardDeterministicSearch {
    fn dirichlet_noise(&self) -> Option<(f32, f32)> {
        None
    }

    fn dumbpass(&self) -> bool {
        false
    }
}

/// Used for self-play scoring passes (spec.md §4.5 NO_PRUNING mode):
/// plays into eyes are allowed so the resulting score reflects the true
/// position rather than a policy bias, and passing is never second-guessed.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoringSearch;

impl PolicyChecker for ScoringSearch {
    fn is_policy_candidate(&self, _board: &Board, _color: Color, _point: Move) -> bool {
        true
    }
}

impl SearchOptions for ScoringSearch {
    fn dirichlet_noise(&self) -> Option<(f32, f32)> {
        None
    }

    fn dumbpass(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_surrounded_by_own_color_is_an_eye() {
        let mut board = Board::new(7.5);
        board.to_move = Color::Black;
        board.play(ishi_go::point::from_xy(1, 0) as Move).unwrap();
        board.to_move = Color::Black;
        board.play(ishi_go::point::from_xy(0, 1) as Move).unwrap();

        assert!(is_eye(&board, Color::Black, ishi_go::point::from_xy(0, 0)));
    }

    #[test]
    fn standard_search_rejects_eyes_as_candidates() {
        let mut board = Board::new(7.5);
        board.to_move = Color::Black;
        board.play(ishi_go::point::from_xy(1, 0) as Move).unwrap();
        board.to_move = Color::Black;
        board.play(ishi_go::point::from_xy(0, 1) as Move).unwrap();

        let search = StandardSearch::default();
        let eye = ishi_go::point::from_xy(0, 0) as Move;
        assert!(!search.is_policy_candidate(&board, Color::Black, eye));
    }

    #[test]
    fn scoring_search_allows_everything() {
        let board = Board::new(7.5);
        let search = ScoringSearch;
        assert!(search.is_policy_candidate(&board, Color::Black, 0));
        assert!(search.dumbpass());
    }
}
