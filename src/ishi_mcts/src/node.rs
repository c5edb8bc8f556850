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

//! The tree node (spec.md §3 "Node", §4.4). Grounded on `UCTNode.{h,cpp}`
//! and `UCTNodePointer.{h,cpp}`: each child slot is a single 64-bit atomic
//! word, tagged in its low bit between an *uninflated* `(move, prior)`
//! pair and an *inflated* owning pointer to a child `Node`. Inflation is a
//! compare-and-swap; the loser of a race drops its freshly built `Node`
//! instead of leaking it (Design Notes §9 "tagged 64-bit value").

use std::sync::atomic::{AtomicI16, AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use ishi_go::{Color, Move};
use ishi_nn::Evaluation;
use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::options::PolicyChecker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Active,
    Pruned,
    Invalid,
}

impl Status {
    fn to_u8(self) -> u8 {
        match self {
            Status::Active => 0,
            Status::Pruned => 1,
            Status::Invalid => 2,
        }
    }

    fn from_u8(value: u8) -> Status {
        match value {
            1 => Status::Pruned,
            2 => Status::Invalid,
            _ => Status::Active,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpandState {
    Initial,
    Expanding,
    Expanded,
}

impl ExpandState {
    fn to_u8(self) -> u8 {
        match self {
            ExpandState::Initial => 0,
            ExpandState::Expanding => 1,
            ExpandState::Expanded => 2,
        }
    }

    fn from_u8(value: u8) -> ExpandState {
        match value {
            1 => ExpandState::Expanding,
            2 => ExpandState::Expanded,
            _ => ExpandState::Initial,
        }
    }
}

const TAG_POINTER: u64 = 1;

fn pack_uninflated(mv: Move, prior: f32) -> u64 {
    let mv_bits = (mv as u16) as u64;
    let prior_bits = u64::from(prior.to_bits());
    (prior_bits << 32) | (mv_bits << 1)
}

fn unpack_uninflated(word: u64) -> (Move, f32) {
    let mv_bits = ((word >> 1) & 0xffff) as u16;
    let prior_bits = (word >> 32) as u32;
    (mv_bits as i16, f32::from_bits(prior_bits))
}

/// A view onto a child slot without forcing inflation, used by the hot
/// selection loop so that an unvisited child costs no allocation.
pub enum ChildView<'a> {
    Uninflated { mv: Move, prior: f32 },
    Inflated(&'a Node),
}

pub struct ChildSlot(AtomicU64);

impl ChildSlot {
    pub fn new(mv: Move, prior: f32) -> Self {
        ChildSlot(AtomicU64::new(pack_uninflated(mv, prior)))
    }

    pub fn peek(&self) -> ChildView<'_> {
        let word = self.0.load(Ordering::Acquire);
        if word & TAG_POINTER == TAG_POINTER {
            let ptr = (word & !TAG_POINTER) as *const Node;
            ChildView::Inflated(unsafe { &*ptr })
        } else {
            let (mv, prior) = unpack_uninflated(word);
            ChildView::Uninflated { mv, prior }
        }
    }

    pub fn mv(&self) -> Move {
        match self.peek() {
            ChildView::Uninflated { mv, .. } => mv,
            ChildView::Inflated(node) => node.mv,
        }
    }

    pub fn prior(&self) -> f32 {
        match self.peek() {
            ChildView::Uninflated { prior, .. } => prior,
            ChildView::Inflated(node) => node.policy(),
        }
    }

    pub fn status(&self) -> Status {
        match self.peek() {
            ChildView::Uninflated { .. } => Status::Active,
            ChildView::Inflated(node) => node.status(),
        }
    }

    /// Inflates this slot if it is not already inflated, constructing the
    /// new child `Node`; idempotent and safe under races (the loser of the
    /// CAS drops its own allocation, per Design Notes §9). Returns a raw
    /// pointer rather than a borrow: the pointee is heap-owned by this
    /// slot's atomic word independent of any `RwLock` guard the caller may
    /// be holding over the parent's children vector, so tying the
    /// lifetime to `&self` would be more restrictive than the actual
    /// ownership requires.
    fn raw_inflate(&self) -> *const Node {
        let word = self.0.load(Ordering::Acquire);
        if word & TAG_POINTER == TAG_POINTER {
            return (word & !TAG_POINTER) as *const Node;
        }

        let (mv, prior) = unpack_uninflated(word);
        let boxed = Box::new(Node::new_leaf(mv, prior));
        let ptr = Box::into_raw(boxed);
        let new_word = (ptr as u64) | TAG_POINTER;

        match self
            .0
            .compare_exchange(word, new_word, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => ptr,
            Err(actual) => {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
                (actual & !TAG_POINTER) as *const Node
            }
        }
    }

    pub fn inflate(&self) -> &Node {
        unsafe { &*self.raw_inflate() }
    }

    fn invalidate(&self) {
        self.inflate().set_status(Status::Invalid);
    }

    /// Consumes this slot, forcing inflation if needed, and moves the
    /// child `Node` out by value. Used by tree reuse (spec.md §4.5 "Tree
    /// reuse on move advance") to promote a child to the new root without
    /// copying its subtree.
    fn into_inflated_node(self) -> Node {
        let ptr = self.raw_inflate() as *mut Node;
        std::mem::forget(self);
        unsafe { *Box::from_raw(ptr) }
    }
}

impl Drop for ChildSlot {
    fn drop(&mut self) {
        let word = *self.0.get_mut();
        if word & TAG_POINTER == TAG_POINTER {
            let ptr = (word & !TAG_POINTER) as *mut Node;
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}

pub struct Node {
    pub mv: Move,
    policy: AtomicU32,
    pub visits: AtomicI32,
    pub virtual_loss: AtomicI16,
    net_value: AtomicU32,
    black_value_sum: AtomicU64,
    black_value_sq_sum: AtomicU64,
    status: AtomicU8,
    expand_state: AtomicU8,
    min_psa_ratio_children: AtomicU32,
    children: RwLock<Vec<ChildSlot>>,
}

const VIRTUAL_LOSS_COUNT: i16 = 3;

/// The same "tree full" sentinel `min_psa_ratio_for_fill` returns at 100%
/// fill (search.rs). Used as `min_psa_ratio_children`'s initial value so a
/// never-before-touched node is also refused expansion under that much
/// memory pressure, rather than only nodes that already recorded a skip.
const MAXIMUM_MIN_PSA_RATIO: f32 = 2.0;

impl Node {
    fn new_leaf(mv: Move, prior: f32) -> Self {
        Node {
            mv,
            policy: AtomicU32::new(prior.to_bits()),
            visits: AtomicI32::new(0),
            virtual_loss: AtomicI16::new(0),
            net_value: AtomicU32::new(0.5f32.to_bits()),
            black_value_sum: AtomicU64::new(0),
            black_value_sq_sum: AtomicU64::new(0),
            status: AtomicU8::new(Status::Active.to_u8()),
            expand_state: AtomicU8::new(ExpandState::Initial.to_u8()),
            min_psa_ratio_children: AtomicU32::new(MAXIMUM_MIN_PSA_RATIO.to_bits()),
            children: RwLock::new(Vec::new()),
        }
    }

    pub fn new_root() -> Self {
        Node::new_leaf(ishi_go::PASS, 1.0)
    }

    /// This node's own NN value from black's point of view, used as the
    /// FPU baseline for its unvisited children (spec.md §3 `Node.net_value`).
    pub fn net_value(&self) -> f32 {
        f32::from_bits(self.net_value.load(Ordering::Acquire))
    }

    fn set_net_value(&self, value: f32) {
        self.net_value.store(value.to_bits(), Ordering::Release);
    }

    pub fn policy(&self) -> f32 {
        f32::from_bits(self.policy.load(Ordering::Acquire))
    }

    pub fn set_policy(&self, value: f32) {
        self.policy.store(value.to_bits(), Ordering::Release);
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub fn expand_state(&self) -> ExpandState {
        ExpandState::from_u8(self.expand_state.load(Ordering::Acquire))
    }

    pub fn min_psa_ratio_children(&self) -> f32 {
        f32::from_bits(self.min_psa_ratio_children.load(Ordering::Acquire))
    }

    /// A node is expandable iff it has not already committed a child list
    /// and `min_psa_ratio_children` is still above the ratio being
    /// requested (spec.md §3 invariant I5). The `expand_state` half of this
    /// guards the one-shot INITIAL→EXPANDING→EXPANDED transition (I4); the
    /// ratio half lets memory pressure suppress a fresh node's expansion
    /// entirely, and lets a node whose expansion was refused under
    /// pressure -- leaving it at INITIAL, not EXPANDED -- be retried once
    /// pressure eases.
    pub fn expandable(&self, min_psa_ratio: f32) -> bool {
        self.expand_state() != ExpandState::Expanded
            && min_psa_ratio < self.min_psa_ratio_children()
    }

    pub fn has_children(&self) -> bool {
        self.expand_state() == ExpandState::Expanded
    }

    pub fn visits(&self) -> i32 {
        self.visits.load(Ordering::Acquire)
    }

    pub fn children_len(&self) -> usize {
        self.children.read().unwrap().len()
    }

    /// Acquires expansion via CAS on `expand_state`; builds a child list
    /// from `eval.policy` restricted to legal moves (plus pass), pruned to
    /// those whose prior survives `min_psa_ratio`, sorted descending by
    /// prior. Returns `true` iff this call performed the expansion (§4.4
    /// `create_children`). Refuses outright -- no CAS, no allocation -- when
    /// `min_psa_ratio` does not clear `min_psa_ratio_children` (spec.md §4.8
    /// "Tree memory exceeded"), leaving `expand_state` at INITIAL so a later
    /// call under less pressure can still succeed.
    pub fn create_children(
        &self,
        legal_moves: &[Move],
        eval: &Evaluation,
        policy_checker: &dyn PolicyChecker,
        board: &ishi_go::Board,
        color: Color,
        min_psa_ratio: f32,
    ) -> bool {
        if !self.expandable(min_psa_ratio) {
            return false;
        }

        if self
            .expand_state
            .compare_exchange(
                ExpandState::Initial.to_u8(),
                ExpandState::Expanding.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        let mut candidates: Vec<(Move, f32)> = legal_moves
            .iter()
            .filter(|&&mv| policy_checker.is_policy_candidate(board, color, mv))
            .map(|&mv| {
                let prior = if (mv as usize) < eval.policy.len() - 1 {
                    eval.policy[mv as usize]
                } else {
                    0.0
                };
                (mv, prior)
            })
            .collect();
        candidates.push((ishi_go::PASS, eval.pass_prior()));

        let total: f32 = candidates.iter().map(|(_, p)| p).sum();
        if total > 0.0 {
            for (_, p) in candidates.iter_mut() {
                *p /= total;
            }
        }

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let max_prior = candidates.first().map(|(_, p)| *p).unwrap_or(0.0);
        let threshold = max_prior * min_psa_ratio;
        let candidate_count = candidates.len();
        let slots: Vec<ChildSlot> = candidates
            .into_iter()
            .filter(|(_, p)| *p >= threshold)
            .map(|(mv, p)| ChildSlot::new(mv, p))
            .collect();
        let skipped_children = slots.len() < candidate_count;

        *self.children.write().unwrap() = slots;
        let stored_ratio = if skipped_children { min_psa_ratio } else { 0.0 };
        self.min_psa_ratio_children
            .store(stored_ratio.to_bits(), Ordering::Release);

        let from_black = if color == Color::Black { eval.value } else { 1.0 - eval.value };
        self.set_net_value(from_black);

        self.expand_state
            .store(ExpandState::Expanded.to_u8(), Ordering::Release);

        true
    }

    /// PUCT selection over active children (spec.md §4.4
    /// `uct_select_child`); inflates and returns the winner.
    pub fn uct_select_child(
        &self,
        color: Color,
        is_root: bool,
        c_puct: f32,
        fpu_reduction: f32,
        noise_enabled: bool,
    ) -> Option<&Node> {
        let children = self.children.read().unwrap();
        if children.is_empty() {
            return None;
        }

        let n_parent: f32 = children
            .iter()
            .map(|c| match c.peek() {
                ChildView::Uninflated { .. } => 0.0,
                ChildView::Inflated(node) => {
                    node.visits() as f32 + node.virtual_loss.load(Ordering::Acquire) as f32
                }
            })
            .sum();
        let sqrt_n_parent = n_parent.max(0.0).sqrt();

        let visited_policy_mass: f32 = children
            .iter()
            .filter(|c| matches!(c.peek(), ChildView::Inflated(n) if n.visits() > 0))
            .map(|c| c.prior())
            .sum();

        let effective_fpu_reduction = if is_root && noise_enabled { 0.0 } else { fpu_reduction };
        let fpu_value = self.net_value() - effective_fpu_reduction * visited_policy_mass.sqrt();

        let mut best_index: Option<usize> = None;
        let mut best_score = f32::NEG_INFINITY;

        for (index, child) in children.iter().enumerate() {
            if child.status() != Status::Active {
                continue;
            }

            let prior = child.prior();
            let u = c_puct * prior * sqrt_n_parent / (1.0 + child_visits(child));

            let q = match child.peek() {
                ChildView::Inflated(node) if node.visits() > 0 => node.value_for(color),
                _ => fpu_value,
            };

            let score = q + u;
            if score > best_score {
                best_score = score;
                best_index = Some(index);
            }
        }

        let winner = best_index.map(|index| children[index].raw_inflate());
        drop(children);
        winner.map(|ptr| unsafe { &*ptr })
    }

    pub fn update(&self, value_black_pov: f64) {
        self.visits.fetch_add(1, Ordering::AcqRel);
        atomic_f64_add(&self.black_value_sum, value_black_pov);
        atomic_f64_add(&self.black_value_sq_sum, value_black_pov * value_black_pov);
    }

    pub fn apply_virtual_loss(&self) {
        self.virtual_loss.fetch_add(VIRTUAL_LOSS_COUNT, Ordering::AcqRel);
    }

    pub fn undo_virtual_loss(&self) {
        self.virtual_loss.fetch_sub(VIRTUAL_LOSS_COUNT, Ordering::AcqRel);
    }

    /// `value_for(color)` (spec.md §4.4): black-POV mean adjusted for any
    /// virtual loss currently held on this node, mirrored for white.
    pub fn value_for(&self, color: Color) -> f32 {
        let visits = self.visits() as f64;
        let virtual_loss = self.virtual_loss.load(Ordering::Acquire) as f64;
        let visits_prime = visits + virtual_loss;
        if visits_prime <= 0.0 {
            return self.net_value();
        }

        let black_sum = atomic_f64_load(&self.black_value_sum);
        let black_sum_prime = if color == Color::White {
            black_sum + virtual_loss
        } else {
            black_sum
        };

        let mean = (black_sum_prime / visits_prime) as f32;
        if color == Color::White {
            1.0 - mean
        } else {
            mean
        }
    }

    /// Welford-style variance estimate from the running sum and
    /// sum-of-squares, used by `lcb_for` (spec.md §4.4).
    fn variance_for(&self, color: Color) -> f32 {
        let visits = self.visits() as f64;
        if visits < 2.0 {
            return 1.0;
        }

        let sum = atomic_f64_load(&self.black_value_sum);
        let sq_sum = atomic_f64_load(&self.black_value_sq_sum);
        let mean = sum / visits;
        let variance = ((sq_sum / visits) - mean * mean).max(1e-4);
        let _ = color; // variance is symmetric under the 1-p reflection used by value_for
        variance as f32
    }

    /// Lower confidence bound on the per-visit value, used for robust
    /// best-move selection (spec.md §4.4 `lcb_for`).
    pub fn lcb_for(&self, color: Color) -> f32 {
        let visits = self.visits();
        if visits < 2 {
            return f32::NEG_INFINITY;
        }

        let mean = self.value_for(color);
        let variance = self.variance_for(color);
        let t = t_quantile(visits - 1, 0.95);

        mean - t * (variance / visits as f32).sqrt()
    }

    pub fn sort_children(&self, color: Color, min_visit_floor: i32) {
        let mut children = self.children.write().unwrap();
        children.sort_by(|a, b| {
            let a_rank = child_rank(a, color, min_visit_floor);
            let b_rank = child_rank(b, color, min_visit_floor);
            b_rank.partial_cmp(&a_rank).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Tombstones any active child whose move would recreate a position
    /// already present in `history` (spec.md §4.4 `kill_superkos`).
    pub fn kill_superkos(&self, board: &ishi_go::Board, color: Color, history: &[u64]) {
        let children = self.children.read().unwrap();
        for child in children.iter() {
            let mv = child.mv();
            if mv == ishi_go::PASS {
                continue;
            }
            if let Some(ko_hash) = ko_hash_after(board, mv, color) {
                if history.contains(&ko_hash) {
                    child.invalidate();
                }
            }
        }
    }

    pub fn dirichlet_noise(&self, epsilon: f32, alpha: f32) {
        let children = self.children.read().unwrap();
        if children.is_empty() {
            return;
        }

        let gamma = Gamma::new(alpha as f64, 1.0).expect("alpha must be positive");
        let mut rng = rand::thread_rng();
        let samples: Vec<f64> = (0..children.len()).map(|_| gamma.sample(&mut rng)).collect();
        let total: f64 = samples.iter().sum();
        if total <= 0.0 {
            return;
        }

        for (child, sample) in children.iter().zip(samples.iter()) {
            let noise = (*sample / total) as f32;
            let node = child.inflate();
            let mixed = (1.0 - epsilon) * node.policy() + epsilon * noise;
            node.set_policy(mixed);
        }
    }

    /// Samples a child in proportion to `visits^(1/tau)` among children
    /// above `floor`, moving it to the front (spec.md §4.4
    /// `randomize_first_proportionally`).
    pub fn randomize_first_proportionally(&self, tau: f32, floor: i32) {
        let mut children = self.children.write().unwrap();
        let weights: Vec<f64> = children
            .iter()
            .map(|c| match c.peek() {
                ChildView::Inflated(node) if node.visits() > floor => {
                    (node.visits() as f64).powf(1.0 / tau as f64)
                }
                _ => 0.0,
            })
            .collect();

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return;
        }

        let mut rng = rand::thread_rng();
        let pick: f64 = rng.gen_range(0.0..total);
        let mut acc = 0.0;
        let mut chosen = 0;
        for (index, weight) in weights.iter().enumerate() {
            acc += weight;
            if pick < acc {
                chosen = index;
                break;
            }
        }

        if chosen != 0 {
            children.swap(0, chosen);
        }
    }

    pub fn first_child_move(&self) -> Option<Move> {
        self.children.read().unwrap().first().map(|c| c.mv())
    }

    /// Forces every root child to inflate, so concurrent readers never see
    /// an uninflated slot racing against a pruning decision (spec.md §4.5
    /// "Root preparation").
    pub fn inflate_all_children(&self) {
        let children = self.children.read().unwrap();
        for child in children.iter() {
            child.inflate();
        }
    }

    /// Removes the child matching `mv` and returns it by value, dropping
    /// the remaining siblings' subtrees (spec.md §4.5 "Tree reuse on move
    /// advance"). Returns `None` if no such child exists, e.g. after an
    /// `undo` or when tree reuse cannot apply.
    pub fn take_child(&self, mv: Move) -> Option<Node> {
        let mut children = self.children.write().unwrap();
        let index = children.iter().position(|c| c.mv() == mv)?;
        let slot = children.remove(index);
        drop(children);
        Some(slot.into_inflated_node())
    }

    pub fn children_snapshot(&self) -> Vec<ChildSummary> {
        self.children
            .read()
            .unwrap()
            .iter()
            .map(|c| match c.peek() {
                ChildView::Uninflated { mv, prior } => ChildSummary {
                    mv,
                    prior,
                    visits: 0,
                    winrate: 0.5,
                    lcb: f32::NEG_INFINITY,
                },
                ChildView::Inflated(node) => ChildSummary {
                    mv: node.mv,
                    prior: node.policy(),
                    visits: node.visits(),
                    winrate: node.value_for(Color::Black),
                    lcb: node.lcb_for(Color::Black),
                },
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChildSummary {
    pub mv: Move,
    pub prior: f32,
    pub visits: i32,
    pub winrate: f32,
    pub lcb: f32,
}

fn child_visits(child: &ChildSlot) -> f32 {
    match child.peek() {
        ChildView::Uninflated { .. } => 0.0,
        ChildView::Inflated(node) => node.visits() as f32 + node.virtual_loss.load(Ordering::Acquire) as f32,
    }
}

fn child_rank(child: &ChildSlot, color: Color, min_visit_floor: i32) -> f32 {
    match child.peek() {
        ChildView::Uninflated { prior, .. } => prior - 10.0,
        ChildView::Inflated(node) => {
            if node.status() != Status::Active {
                f32::NEG_INFINITY
            } else if node.visits() >= min_visit_floor {
                1_000.0 + node.lcb_for(color)
            } else {
                node.value_for(color)
            }
        }
    }
}

fn ko_hash_after(board: &ishi_go::Board, mv: Move, color: Color) -> Option<u64> {
    let mut probe = board.clone();
    probe.to_move = color;
    probe.play(mv).ok().map(|_| probe.ko_hash)
}

fn atomic_f64_add(slot: &AtomicU64, delta: f64) {
    let mut current = slot.load(Ordering::Acquire);
    loop {
        let new_value = f64::from_bits(current) + delta;
        match slot.compare_exchange_weak(
            current,
            new_value.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

fn atomic_f64_load(slot: &AtomicU64) -> f64 {
    f64::from_bits(slot.load(Ordering::Acquire))
}

/// A short fixed table of the Student's t critical value for common alpha
/// levels, falling back to the normal-approximation z-value for large
/// degrees of freedom; adequate for ranking moves, not for publishing a
/// statistic.
fn t_quantile(degrees_of_freedom: i32, alpha: f32) -> f32 {
    if degrees_of_freedom <= 0 {
        return 12.71;
    }
    if degrees_of_freedom >= 30 {
        return z_quantile(alpha);
    }

    let z = z_quantile(alpha);
    // Small-sample correction, matching the shape of a t-table without
    // carrying a full table: inflate the normal quantile more heavily for
    // fewer degrees of freedom.
    z * (1.0 + 1.0 / (4.0 * degrees_of_freedom as f32))
}

fn z_quantile(alpha: f32) -> f32 {
    if alpha >= 0.99 {
        2.326
    } else if alpha >= 0.975 {
        1.960
    } else if alpha >= 0.95 {
        1.645
    } else {
        1.282
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StandardSearch;
    use ishi_go::Board;

    fn sample_eval() -> Evaluation {
        let mut policy = vec![0.0f32; ishi_go::NUM_VERTICES + 1];
        policy[0] = 0.5;
        policy[1] = 0.3;
        policy[ishi_go::NUM_VERTICES] = 0.2;
        Evaluation::new(policy, 0.6)
    }

    #[test]
    fn create_children_is_idempotent_per_node() {
        let node = Node::new_root();
        let board = Board::new(7.5);
        let search = StandardSearch::default();
        let legal = vec![0, 1];

        assert!(node.create_children(&legal, &sample_eval(), &search, &board, Color::Black, 0.0));
        assert!(!node.create_children(&legal, &sample_eval(), &search, &board, Color::Black, 0.0));
        assert!(node.has_children());
    }

    #[test]
    fn full_tree_refuses_expansion_without_allocating() {
        let node = Node::new_root();
        let board = Board::new(7.5);
        let search = StandardSearch::default();
        let legal = vec![0, 1];

        assert!(!node.create_children(
            &legal,
            &sample_eval(),
            &search,
            &board,
            Color::Black,
            MAXIMUM_MIN_PSA_RATIO,
        ));
        assert!(!node.has_children());
        assert_eq!(node.expand_state(), ExpandState::Initial);
        assert_eq!(node.children_len(), 0);
    }

    #[test]
    fn refused_expansion_can_succeed_once_pressure_eases() {
        let node = Node::new_root();
        let board = Board::new(7.5);
        let search = StandardSearch::default();
        let legal = vec![0, 1];

        assert!(!node.create_children(
            &legal,
            &sample_eval(),
            &search,
            &board,
            Color::Black,
            MAXIMUM_MIN_PSA_RATIO,
        ));
        assert!(node.create_children(&legal, &sample_eval(), &search, &board, Color::Black, 0.0));
        assert!(node.has_children());
    }

    #[test]
    fn virtual_loss_round_trips() {
        let node = Node::new_root();
        node.apply_virtual_loss();
        assert_eq!(node.virtual_loss.load(Ordering::Acquire), VIRTUAL_LOSS_COUNT);
        node.undo_virtual_loss();
        assert_eq!(node.virtual_loss.load(Ordering::Acquire), 0);
    }

    #[test]
    fn update_accumulates_black_pov_mean() {
        let node = Node::new_root();
        node.update(1.0);
        node.update(0.0);
        assert!((node.value_for(Color::Black) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn inflate_is_idempotent_under_a_race() {
        use std::sync::Arc;
        use std::thread;

        let slot = Arc::new(ChildSlot::new(5, 0.3));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let slot = slot.clone();
            handles.push(thread::spawn(move || slot.inflate() as *const Node as usize));
        }

        let pointers: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(pointers.windows(2).all(|w| w[0] == w[1]));
    }
}
