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

//! Search core (spec.md §4.5): the per-playout descent, root preparation,
//! tree reuse across moves, contender pruning, the memory-pressure curve,
//! and best-move selection. Grounded on `UCTSearch.cpp`'s `play_simulation`
//! / `think` / `get_best_move`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ishi_go::{Board, Color, Move};
use ishi_nn::{Evaluation, Predictor};
use log::{debug, warn};

use crate::cache::{all_symmetries, lookup_with_symmetry, FingerprintCache};
use crate::error::{SearchError, SearchResult};
use crate::node::Node;
use crate::options::SearchOptions;
use crate::time_control::{max_time_for_move, TimeState};
pub use ishi_utils::config::TimeManagement;

/// The memory-pressure curve controlling `min_psa_ratio` (spec.md §4.5
/// "Memory pressure"): cheap memory is spent freely until the tree is
/// mostly full, then expansion is pinched hard.
pub fn min_psa_ratio_for_fill(fill: f32) -> f32 {
    if fill < 0.50 {
        0.000
    } else if fill < 0.95 {
        0.001
    } else if fill < 1.00 {
        0.010
    } else {
        2.000
    }
}

/// Tracks the number of live tree nodes against a fixed budget, the sole
/// input to `min_psa_ratio_for_fill`.
pub struct TreeBudget {
    budget: usize,
    live: AtomicUsize,
}

impl TreeBudget {
    pub fn new(budget: usize) -> Self {
        TreeBudget { budget: budget.max(1), live: AtomicUsize::new(1) }
    }

    pub fn record_created(&self, count: usize) {
        self.live.fetch_add(count, Ordering::AcqRel);
    }

    pub fn fill(&self) -> f32 {
        self.live.load(Ordering::Acquire) as f32 / self.budget as f32
    }

    pub fn min_psa_ratio(&self) -> f32 {
        min_psa_ratio_for_fill(self.fill())
    }
}

/// Per-playout PUCT constants (spec.md §3 "EngineConfig"): pulled from the
/// engine's configuration rather than hardcoded, so `lz-setoption` can tune
/// them without a rebuild.
#[derive(Clone, Copy, Debug)]
pub struct PuctParams {
    pub c_puct: f32,
    pub fpu_reduction: f32,
}

impl From<&ishi_utils::config::EngineConfig> for PuctParams {
    fn from(config: &ishi_utils::config::EngineConfig) -> Self {
        PuctParams { c_puct: config.c_puct, fpu_reduction: config.fpu_reduction }
    }
}

/// Runs `playout` once from `root` against `root_board`, mutating the
/// board along the descent via a cloned probe (spec.md §4.5 "Per-playout
/// descent"). Returns the black-point-of-view value backed up into `root`,
/// or `Ok(None)` when the playout hit a race and left no result to back up.
pub fn playout(
    root: &Node,
    root_board: &Board,
    predictor: &dyn Predictor,
    cache: &FingerprintCache,
    options: &dyn SearchOptions,
    budget: &TreeBudget,
    puct: PuctParams,
) -> SearchResult<Option<f64>> {
    let mut board = root_board.clone();
    descend(root, &mut board, true, predictor, cache, options, budget, puct)
}

#[allow(clippy::too_many_arguments)]
fn descend(
    node: &Node,
    board: &mut Board,
    is_root: bool,
    predictor: &dyn Predictor,
    cache: &FingerprintCache,
    options: &dyn SearchOptions,
    budget: &TreeBudget,
    puct: PuctParams,
) -> SearchResult<Option<f64>> {
    node.apply_virtual_loss();
    let result = descend_inner(node, board, is_root, predictor, cache, options, budget, puct);
    node.undo_virtual_loss();

    match &result {
        Ok(Some(value)) => node.update(*value),
        Ok(None) => {}
        Err(_) => {}
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn descend_inner(
    node: &Node,
    board: &mut Board,
    is_root: bool,
    predictor: &dyn Predictor,
    cache: &FingerprintCache,
    options: &dyn SearchOptions,
    budget: &TreeBudget,
    puct: PuctParams,
) -> SearchResult<Option<f64>> {
    let color = board.to_move;

    if node.expandable(budget.min_psa_ratio()) {
        if board.is_game_over() {
            let score = board.area_score();
            let black_value = if score > 0.0 { 1.0 } else if score < 0.0 { 0.0 } else { 0.5 };
            return Ok(Some(black_value));
        }

        let legal_moves = legal_moves_for(board, color);
        let eval = evaluate(board, color, predictor, cache, options)?;
        let ok = node.create_children(
            &legal_moves,
            &eval,
            options,
            board,
            color,
            budget.min_psa_ratio(),
        );
        if ok {
            budget.record_created(node.children_len());
            let black_value = if color == Color::Black { eval.value } else { 1.0 - eval.value };
            return Ok(Some(black_value as f64));
        }
        return Ok(None);
    }

    if node.has_children() {
        let next = node.uct_select_child(
            color,
            is_root,
            puct.c_puct,
            puct.fpu_reduction,
            options.dirichlet_noise().is_some(),
        );

        let next = match next {
            Some(next) => next,
            None => return Ok(None),
        };

        let mv = next.mv;
        if let Err(_err) = board.play(mv) {
            // Most commonly a positional superko that `kill_superkos`
            // didn't already tombstone (history grew since); mark this
            // child dead so the next selection skips it outright.
            if mv != ishi_go::PASS {
                next.set_status(crate::node::Status::Invalid);
            }
            return Ok(None);
        }

        return descend(next, board, false, predictor, cache, options, budget, puct);
    }

    Ok(None)
}

fn legal_moves_for(board: &Board, color: Color) -> Vec<Move> {
    (0..ishi_go::NUM_VERTICES as i16)
        .filter(|&mv| board.is_legal(mv, color).is_ok())
        .collect()
}

/// Looks up (or computes) the evaluation for `board`. The symmetry-cache
/// fallback only applies during the opening and when Dirichlet noise is
/// disabled (spec.md §4.1): noise makes the root-adjacent evaluations
/// position-specific, so folding in symmetric transposes would smuggle
/// noise from one symmetry into another's statistics.
fn evaluate(
    board: &Board,
    color: Color,
    predictor: &dyn Predictor,
    cache: &FingerprintCache,
    options: &dyn SearchOptions,
) -> SearchResult<Evaluation> {
    let key = board.hash;
    let symmetric_keys: Vec<(ishi_go::symmetry::Symmetry, u64)> =
        if board.move_number < 30 && options.dirichlet_noise().is_none() {
            all_symmetries().iter().map(|&s| (s, key)).collect()
        } else {
            Vec::new()
        };

    if let Some(hit) = lookup_with_symmetry(cache, key, &symmetric_keys) {
        return Ok(hit);
    }

    let planes = ishi_go::features::extract(board, color);
    let eval = predictor.forward(&planes).map_err(SearchError::from)?;
    cache.insert(key, eval.clone());
    Ok(eval)
}

/// Root preparation (spec.md §4.5 "Root preparation"): forces expansion on
/// first visit, inflates every child so racing reads never touch an
/// uninflated slot, tombstones superko repeats, then mixes in Dirichlet
/// noise if the options call for it.
pub fn prepare_root(
    root: &Node,
    board: &Board,
    predictor: &dyn Predictor,
    cache: &FingerprintCache,
    options: &dyn SearchOptions,
    budget: &TreeBudget,
    history: &[u64],
) -> SearchResult<()> {
    if root.expandable(budget.min_psa_ratio()) {
        let legal_moves = legal_moves_for(board, board.to_move);
        let eval = evaluate(board, board.to_move, predictor, cache, options)?;
        if root.create_children(
            &legal_moves,
            &eval,
            options,
            board,
            board.to_move,
            budget.min_psa_ratio(),
        ) {
            budget.record_created(root.children_len());
        }
    }

    root.inflate_all_children();

    root.kill_superkos(board, board.to_move, history);

    if let Some((epsilon, alpha)) = options.dirichlet_noise() {
        root.dirichlet_noise(epsilon, alpha);
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BestMove {
    Move(Move),
    Resign,
}

/// Best-move selection (spec.md §4.5 "Best-move selection"): sort by LCB
/// above the visit floor, then apply the pass/resign post-filters.
pub fn select_best_move(
    root: &Node,
    color: Color,
    board: &Board,
    dumbpass: bool,
    resign_pct: f32,
    lcb_visit_floor: i32,
) -> BestMove {
    root.sort_children(color, lcb_visit_floor);
    let children = root.children_snapshot();

    let best = match children.first() {
        Some(c) => *c,
        None => return BestMove::Move(ishi_go::PASS),
    };

    if best.winrate < resign_pct / 100.0 && board.move_number as usize > ishi_go::NUM_VERTICES / 10
    {
        return BestMove::Resign;
    }

    if board.passes >= 1 {
        let score = board.area_score();
        let pass_wins_or_draws = if color == Color::Black { score >= 0.0 } else { score <= 0.0 };
        if pass_wins_or_draws {
            return BestMove::Move(ishi_go::PASS);
        }
    }

    if best.mv == ishi_go::PASS && !dumbpass {
        if let Some(alternative) = children
            .iter()
            .find(|c| c.mv != ishi_go::PASS && c.winrate >= best.winrate)
        {
            return BestMove::Move(alternative.mv);
        }
    }

    BestMove::Move(best.mv)
}

/// A running tree across moves: the board at the root and the root node
/// itself, supporting tree reuse when the opponent's move is found among
/// the current root's children (spec.md §4.5 "Tree reuse on move advance").
pub struct SearchTree {
    pub root: Node,
    pub root_board: Board,
    pub history: Vec<u64>,
    pub budget: TreeBudget,
}

impl SearchTree {
    pub fn fresh(board: Board, tree_budget: usize) -> Self {
        let history = vec![board.ko_hash];
        SearchTree {
            root: Node::new_root(),
            root_board: board,
            history,
            budget: TreeBudget::new(tree_budget),
        }
    }

    /// Attempts to walk down to the child matching `mv`; on a miss (the
    /// move isn't among current root children, e.g. after `undo`) falls
    /// back to a fresh root over the advanced board.
    pub fn advance(&mut self, mv: Move, tree_budget: usize) -> SearchResult<()> {
        let mut next_board = self.root_board.clone();
        next_board.play(mv)?;

        match self.root.take_child(mv) {
            Some(child_node) => {
                self.root = child_node;
                self.root_board = next_board;
            }
            None => {
                self.root = Node::new_root();
                self.root_board = next_board;
                self.budget = TreeBudget::new(tree_budget);
            }
        }

        self.history.push(self.root_board.ko_hash);
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a search loop and whatever
/// drives it (a GTP command handler checking stdin, a pondering loop
/// checking for the opponent's move). Stopping never aborts mid-playout;
/// it only stops launching new ones (spec.md §4.7 "Pondering").
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        StopSignal(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives playouts against `tree` until `stop` fires or `deadline_cs`
/// elapses (spec.md §4.6), tracking an empirical playout rate so the
/// pruner's `est_playouts_left` has something to divide by. Time
/// management modes beyond `On` only change how aggressively inactive
/// children are pruned; this loop itself is mode-agnostic.
#[allow(clippy::too_many_arguments)]
pub fn run_search(
    tree: &SearchTree,
    predictor: &dyn Predictor,
    cache: &FingerprintCache,
    options: &dyn SearchOptions,
    stop: &StopSignal,
    time_state: &TimeState,
    config: &ishi_utils::config::EngineConfig,
    mode: TimeManagement,
) -> SearchResult<usize> {
    let deadline_cs =
        max_time_for_move(time_state, tree.root_board.move_number, config.lagbuffer_cs as i64);
    let started = Instant::now();
    let mut playouts = 0usize;
    let puct = PuctParams::from(config);

    prepare_root(
        &tree.root,
        &tree.root_board,
        predictor,
        cache,
        options,
        &tree.budget,
        &tree.history,
    )?;

    loop {
        if stop.is_stopped() {
            break;
        }

        let elapsed_cs = started.elapsed().as_millis() as i64 / 10;
        if mode != TimeManagement::NoPruning && elapsed_cs >= deadline_cs {
            break;
        }
        if playouts >= config.max_playouts {
            break;
        }

        match playout(&tree.root, &tree.root_board, predictor, cache, options, &tree.budget, puct) {
            Ok(_) => playouts += 1,
            Err(SearchError::Cancellation) => {
                debug!("search cancelled after {} playouts", playouts);
                break;
            }
            Err(err @ SearchError::Fatal(_)) => {
                warn!("evaluator reported a fatal error: {}", err);
                return Err(err);
            }
            Err(_) => {}
        }

        if should_stop_early(&tree.root, playouts, deadline_cs, elapsed_cs, mode) {
            break;
        }
    }

    Ok(playouts)
}

/// Pruning of non-contenders (spec.md §4.5): once only one active child
/// could still reach the leader's visit count within the remaining budget,
/// further search cannot change the outcome, so stop early if the time
/// saved is worth it.
fn should_stop_early(
    root: &Node,
    playouts: usize,
    deadline_cs: i64,
    elapsed_cs: i64,
    mode: TimeManagement,
) -> bool {
    if mode == TimeManagement::Off || mode == TimeManagement::NoPruning {
        return false;
    }

    let remaining_cs = (deadline_cs - elapsed_cs).max(0);
    if mode == TimeManagement::Fast && remaining_cs == 0 {
        return true;
    }
    if remaining_cs <= 0 || playouts == 0 {
        return false;
    }

    let rate_per_cs = playouts as f64 / elapsed_cs.max(1) as f64;
    let playouts_left = (rate_per_cs * remaining_cs as f64) as i64;

    let children = root.children_snapshot();
    let max_visits = children.iter().map(|c| c.visits).max().unwrap_or(0);
    let leader_lcb = children.iter().map(|c| c.lcb).fold(f32::NEG_INFINITY, f32::max);

    let mut active = 0;
    for child in &children {
        let could_overtake = (child.visits as i64 + playouts_left) as i32 >= max_visits
            || child.winrate >= leader_lcb;
        if could_overtake {
            active += 1;
        }
    }

    if active <= 1 {
        let time_saved_cs = remaining_cs;
        time_saved_cs > 50
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StandardDeterministicSearch;
    use ishi_nn::reference::ReferencePredictor;

    fn default_puct() -> PuctParams {
        PuctParams::from(&ishi_utils::config::EngineConfig::default())
    }

    #[test]
    fn min_psa_ratio_follows_the_fill_curve() {
        assert_eq!(min_psa_ratio_for_fill(0.1), 0.0);
        assert_eq!(min_psa_ratio_for_fill(0.6), 0.001);
        assert_eq!(min_psa_ratio_for_fill(0.99), 0.010);
        assert_eq!(min_psa_ratio_for_fill(1.5), 2.000);
    }

    #[test]
    fn a_single_playout_expands_the_root() {
        let board = Board::new(7.5);
        let root = Node::new_root();
        let predictor = ReferencePredictor::new();
        let cache = FingerprintCache::new(1_000);
        let options = StandardDeterministicSearch;
        let budget = TreeBudget::new(1_000);

        let result =
            playout(&root, &board, &predictor, &cache, &options, &budget, default_puct()).unwrap();
        assert!(result.is_some());
        assert!(root.has_children());
    }

    #[test]
    fn many_playouts_accumulate_visits_on_the_root() {
        let board = Board::new(7.5);
        let root = Node::new_root();
        let predictor = ReferencePredictor::new();
        let cache = FingerprintCache::new(1_000);
        let options = StandardDeterministicSearch;
        let budget = TreeBudget::new(1_000);

        for _ in 0..32 {
            let _ = playout(&root, &board, &predictor, &cache, &options, &budget, default_puct());
        }

        assert!(root.visits() > 0);
    }

    #[test]
    fn select_best_move_resigns_below_threshold() {
        let board = Board::new(7.5);
        let root = Node::new_root();
        let predictor = ReferencePredictor::new();
        let cache = FingerprintCache::new(1_000);
        let options = StandardDeterministicSearch;
        let budget = TreeBudget::new(1_000);

        for _ in 0..8 {
            let _ = playout(&root, &board, &predictor, &cache, &options, &budget, default_puct());
        }

        // With resign_pct at 100 every move is below threshold, so a
        // sufficiently late move resigns outright.
        let mut late_board = board.clone();
        late_board.move_number = (ishi_go::NUM_VERTICES / 2) as u32;
        let decision = select_best_move(&root, Color::Black, &late_board, false, 100.0, 1);
        assert_eq!(decision, BestMove::Resign);
    }

    #[test]
    fn passes_out_when_opponent_passed_and_passing_does_not_lose() {
        let mut board = Board::new(7.5);
        board.play(ishi_go::PASS).unwrap();

        let root = Node::new_root();
        let predictor = ReferencePredictor::new();
        let cache = FingerprintCache::new(1_000);
        let options = StandardDeterministicSearch;
        let budget = TreeBudget::new(1_000);

        for _ in 0..8 {
            let _ = playout(&root, &board, &predictor, &cache, &options, &budget, default_puct());
        }

        // Komi alone puts White ahead on an empty board, so passing back
        // here is a non-losing pass for White after Black's pass.
        let decision = select_best_move(&root, Color::White, &board, false, -1.0, 1);
        assert_eq!(decision, BestMove::Move(ishi_go::PASS));
    }
}
