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

//! Process-wide engine state backing the GTP loop: the running search
//! tree, the live configuration, per-colour clocks, and an undo stack.
//! Grounded on leela-zero's top-level `main.cpp` owning a single
//! long-lived `UCTSearch`/`GameState` pair across GTP commands.

use std::sync::Arc;

use ishi_go::sgf::GameRecord;
use ishi_go::{Board, Color, IllegalMove, Move};
use ishi_mcts::{Node, SearchResult, SearchTree, TimeState};
use ishi_utils::config::{split_memory_budget, ConfigHandle, EngineConfig};

const DEFAULT_KOMI: f32 = 7.5;

pub struct Engine {
    tree: SearchTree,
    config: ConfigHandle,
    undo_stack: Vec<Board>,
    black_time: TimeState,
    white_time: TimeState,
}

impl Engine {
    pub fn new() -> Self {
        let config = ConfigHandle::default();
        let tree_budget = config.load().max_tree_size;
        Engine {
            tree: SearchTree::fresh(Board::new(DEFAULT_KOMI), tree_budget),
            config,
            undo_stack: Vec::new(),
            black_time: TimeState::unlimited(),
            white_time: TimeState::unlimited(),
        }
    }

    pub fn clear_board(&mut self) {
        let komi = self.tree.root_board.komi;
        let tree_budget = self.config.load().max_tree_size;
        self.tree = SearchTree::fresh(Board::new(komi), tree_budget);
        self.undo_stack.clear();
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.tree.root_board.komi = komi;
    }

    /// Plays `mv` for `color`, pushing the board prior to the move onto
    /// the undo stack and reusing the tree when `mv` is already a child
    /// of the current root (spec.md §4.5 "Tree reuse on move advance").
    pub fn play(&mut self, color: Color, mv: Move) -> SearchResult<()> {
        self.undo_stack.push(self.tree.root_board.clone());
        self.tree.root_board.to_move = color;
        let tree_budget = self.config.load().max_tree_size;
        self.tree.advance(mv, tree_budget)
    }

    /// Falls back to a fresh root over the prior board; the discarded
    /// subtree's statistics are not worth preserving across an undo.
    pub fn undo(&mut self) -> Result<(), ()> {
        match self.undo_stack.pop() {
            Some(previous) => {
                let tree_budget = self.config.load().max_tree_size;
                self.tree = SearchTree::fresh(previous, tree_budget);
                Ok(())
            }
            None => Err(()),
        }
    }

    /// Replaces the current game with `record`'s handicap/setup stones
    /// followed by its main-line moves (GTP `loadsgf`, spec.md §6.3). Stops
    /// and reports the first illegal move rather than applying a partial
    /// prefix silently.
    pub fn load_game_record(&mut self, record: &GameRecord) -> Result<(), IllegalMove> {
        let tree_budget = self.config.load().max_tree_size;
        let mut board = Board::new(record.komi);
        for &point in &record.black_setup {
            board.place_setup_stone(point, Color::Black);
        }
        for &point in &record.white_setup {
            board.place_setup_stone(point, Color::White);
        }
        board.to_move = record.first_to_move.unwrap_or(Color::Black);

        for &(color, mv) in &record.moves {
            board.to_move = color;
            board.play(mv)?;
        }

        self.tree = SearchTree::fresh(board, tree_budget);
        self.undo_stack.clear();
        Ok(())
    }

    pub fn set_time(&mut self, main_cs: i64, byo_cs: i64, stones: u32) {
        let state = if byo_cs <= 0 {
            TimeState::absolute(main_cs)
        } else if stones <= 1 {
            TimeState::byoyomi(main_cs, byo_cs, stones.max(1))
        } else {
            TimeState::canadian(main_cs, stones, byo_cs)
        };
        self.black_time = state;
        self.white_time = state;
    }

    pub fn set_time_unlimited(&mut self) {
        self.black_time = TimeState::unlimited();
        self.white_time = TimeState::unlimited();
    }

    /// Applies one `lz-setoption` knob (spec.md §6.1 options table) onto a
    /// fresh `EngineConfig` snapshot, then atomically swaps it in. Returns
    /// `false` for an unknown option name or an unparsable value.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        let mut next = (*self.config.load()).clone();
        let applied = match name {
            "Maximum Memory Use" => value
                .parse::<usize>()
                .map(|mib| {
                    next.total_memory_mib = mib;
                    let (tree, cache) = split_memory_budget(next.total_memory_mib, next.cache_pct);
                    next.max_tree_size = tree;
                    next.cache_capacity = cache;
                })
                .is_ok(),
            "Percentage of memory for cache" => value
                .parse::<u32>()
                .ok()
                .filter(|pct| (1..=99).contains(pct))
                .map(|pct| {
                    next.cache_pct = pct;
                    let (tree, cache) = split_memory_budget(next.total_memory_mib, next.cache_pct);
                    next.max_tree_size = tree;
                    next.cache_capacity = cache;
                })
                .is_some(),
            "Visits" => value
                .parse::<usize>()
                .map(|v| next.max_visits = if v == 0 { usize::MAX / 2 } else { v })
                .is_ok(),
            "Playouts" => value
                .parse::<usize>()
                .map(|v| next.max_playouts = if v == 0 { usize::MAX / 2 } else { v })
                .is_ok(),
            "Lagbuffer" => value.parse::<i32>().map(|v| next.lagbuffer_cs = v).is_ok(),
            "Resign Percentage" => value.parse::<i32>().map(|v| next.resign_pct = v).is_ok(),
            "Pondering" => match value {
                "true" => {
                    next.pondering = true;
                    true
                }
                "false" => {
                    next.pondering = false;
                    true
                }
                _ => false,
            },
            _ => false,
        };

        if applied {
            self.config.store(next);
        }
        applied
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load()
    }

    pub fn board(&self) -> &Board {
        &self.tree.root_board
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    pub fn root(&self) -> &Node {
        &self.tree.root
    }

    pub fn time_state(&self, color: Color) -> TimeState {
        match color {
            Color::Black => self.black_time,
            Color::White => self.white_time,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_board_resets_to_an_empty_position() {
        let mut engine = Engine::new();
        engine.play(Color::Black, ishi_go::point::from_xy(3, 3) as Move).unwrap();
        engine.clear_board();
        assert_eq!(engine.board().stones().iter().filter(|s| s.is_some()).count(), 0);
    }

    #[test]
    fn undo_restores_the_previous_board() {
        let mut engine = Engine::new();
        let before = engine.board().clone();
        engine.play(Color::Black, ishi_go::point::from_xy(3, 3) as Move).unwrap();
        engine.undo().unwrap();
        assert_eq!(engine.board().stones(), before.stones());
    }

    #[test]
    fn undo_with_empty_history_fails() {
        let mut engine = Engine::new();
        assert!(engine.undo().is_err());
    }

    #[test]
    fn setting_an_unknown_option_is_rejected() {
        let mut engine = Engine::new();
        assert!(!engine.set_option("Not A Real Option", "1"));
    }

    #[test]
    fn setting_resign_percentage_is_visible_immediately() {
        let mut engine = Engine::new();
        assert!(engine.set_option("Resign Percentage", "5"));
        assert_eq!(engine.config().resign_pct, 5);
    }

    #[test]
    fn maximum_memory_use_reshapes_both_budgets() {
        let mut engine = Engine::new();
        assert!(engine.set_option("Maximum Memory Use", "1000"));
        let config = engine.config();
        assert_eq!(config.total_memory_mib, 1000);
        assert!(config.max_tree_size > 0);
        assert!(config.cache_capacity > 0);
    }

    #[test]
    fn cache_percentage_shifts_the_split_without_changing_the_total() {
        let mut engine = Engine::new();
        assert!(engine.set_option("Maximum Memory Use", "1000"));
        let before = engine.config().cache_capacity;

        assert!(engine.set_option("Percentage of memory for cache", "50"));
        let after = engine.config();
        assert!(after.cache_capacity > before);
        assert_eq!(after.total_memory_mib, 1000);
    }

    #[test]
    fn cache_percentage_out_of_range_is_rejected() {
        let mut engine = Engine::new();
        assert!(!engine.set_option("Percentage of memory for cache", "100"));
        assert!(!engine.set_option("Percentage of memory for cache", "0"));
    }

    #[test]
    fn loading_a_game_record_replays_its_moves() {
        let record = ishi_go::sgf::parse("(;GM[1]SZ[19]KM[6.5];B[pd];W[dp])").unwrap();
        let mut engine = Engine::new();
        engine.load_game_record(&record).unwrap();

        assert_eq!(engine.board().komi, 6.5);
        assert_eq!(engine.board().stones().iter().filter(|s| s.is_some()).count(), 2);
    }

    #[test]
    fn loading_a_game_record_rejects_an_illegal_move() {
        let record = ishi_go::sgf::parse("(;GM[1]SZ[19];B[pd];W[pd])").unwrap();
        let mut engine = Engine::new();
        assert!(engine.load_game_record(&record).is_err());
    }
}
