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

pub mod cache;
pub mod error;
pub mod node;
pub mod options;
pub mod scheduler;
pub mod search;
pub mod time_control;

pub use cache::FingerprintCache;
pub use error::{SearchError, SearchResult};
pub use node::Node;
pub use options::{ScoringSearch, SearchOptions, StandardDeterministicSearch, StandardSearch};
pub use scheduler::Scheduler;
pub use search::{
    run_search, select_best_move, BestMove, PuctParams, SearchTree, StopSignal, TimeManagement, TreeBudget,
};
pub use time_control::{Overtime, TimeState};

#[cfg(test)]
mod property_tests {
    use super::*;
    use ishi_go::{Board, Color};
    use ishi_nn::reference::ReferencePredictor;

    /// P1-ish universal invariant (spec.md §8): a node's visit count only
    /// ever grows across playouts, it never regresses.
    #[test]
    fn visits_are_monotonic_across_playouts() {
        let board = Board::new(7.5);
        let root = Node::new_root();
        let predictor = ReferencePredictor::new();
        let cache = FingerprintCache::new(1_000);
        let options = StandardDeterministicSearch;
        let budget = TreeBudget::new(1_000);

        let puct = search::PuctParams::from(&ishi_utils::config::EngineConfig::default());
        let mut previous = root.visits();
        for _ in 0..16 {
            let _ = search::playout(&root, &board, &predictor, &cache, &options, &budget, puct);
            let current = root.visits();
            assert!(current >= previous);
            previous = current;
        }
    }

    /// L2 (spec.md §8): inserting the same fingerprint twice leaves the
    /// cache's size unchanged.
    #[test]
    fn cache_insert_is_idempotent() {
        let cache = FingerprintCache::new(10);
        let mut policy = vec![0f32; ishi_go::NUM_VERTICES + 1];
        policy[0] = 1.0;
        let eval = ishi_nn::Evaluation::new(policy, 0.5);

        cache.insert(42, eval.clone());
        let size_after_first = cache.len();
        cache.insert(42, eval);
        assert_eq!(cache.len(), size_after_first);
    }

    /// L4-ish round-trip (spec.md §8): a black-POV value for white is the
    /// mirror image of the same node's value for black.
    #[test]
    fn value_for_is_mirrored_between_colors() {
        let root = Node::new_root();
        root.update(0.75);
        let black = root.value_for(Color::Black);
        let white = root.value_for(Color::White);
        assert!((black - (1.0 - white)).abs() < 1e-6);
    }
}
