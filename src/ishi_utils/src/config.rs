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

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Parses an environment variable, falling back to `default` if it is unset
/// or fails to parse. Mirrors `dg_utils::config`'s `lazy_static! { static
/// ref X: T = ... }` pattern for process-wide constants, but kept
/// as a plain function so it can also be used to build the mutable
/// `EngineConfig` below.
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

lazy_static! {
    /// Number of search worker threads, unless overridden by `lz-setoption`.
    pub static ref NUM_THREADS: usize = env_or("ISHI_NUM_THREADS", num_cpus_fallback());

    /// Maximum number of requests the batching scheduler folds into one
    /// forward call (spec.md §4.3).
    pub static ref BATCH_SIZE: usize = env_or("ISHI_BATCH_SIZE", 16);

    /// Softmax temperature applied to the root's visit distribution when
    /// picking a stochastic first move (spec.md §4.4 `randomize_first_proportionally`).
    pub static ref TEMPERATURE: f32 = env_or("ISHI_TEMPERATURE", 1.0);
}

/// A very small stand-in for `num_cpus::get()` so that `ishi_utils` does not
/// need to pull in an extra crate purely for thread-count autodetection; the
/// teacher crate does not ship a CPU-count dependency either and instead
/// expects `ISHI_NUM_THREADS`/equivalent to be set explicitly in production.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Time management modes, spec.md §4.5 "Pruning of non-contenders".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeManagement {
    Off,
    On,
    Fast,
    NoPruning,
}

/// The immutable configuration snapshot handed to `Search`/`Scheduler`
/// constructors (Design Notes §9, "Global mutable configuration"): rather
/// than process-wide mutable globals, `lz-setoption` builds a new
/// `EngineConfig` and atomically swaps it into a `ConfigHandle`.
/// Assumed bytes per tree node / cache entry, used only to turn the
/// `lz-setoption` memory knobs (megabytes, a cache percentage) into the
/// node/entry counts `SearchTree`/`FingerprintCache` are actually sized by.
/// Analogous to `UCTSearch::DEFAULT_MAX_MEMORY / sizeof(UCTNode)`, just
/// applied to both budgets instead of only the tree.
const BYTES_PER_NODE: usize = 256;
const BYTES_PER_CACHE_ENTRY: usize = 256;

/// Splits a total memory budget between the search tree and the NN-eval
/// cache according to `cache_pct` (spec.md §6.1 "Percentage of memory for
/// cache"), mirroring `lz-setoption`'s "Maximum Memory Use (MiB)" and
/// "Percentage of memory for cache" acting on the same underlying budget.
pub fn split_memory_budget(total_memory_mib: usize, cache_pct: u32) -> (usize, usize) {
    let total_bytes = total_memory_mib.saturating_mul(1_000_000);
    let cache_bytes = total_bytes.saturating_mul(cache_pct.min(99) as usize) / 100;
    let tree_bytes = total_bytes.saturating_sub(cache_bytes);
    (tree_bytes / BYTES_PER_NODE, cache_bytes / BYTES_PER_CACHE_ENTRY)
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub num_threads: usize,
    pub batch_size: usize,
    /// Total memory budget in MiB that `max_tree_size`/`cache_capacity` were
    /// last derived from via `split_memory_budget` (spec.md §6.1 "Maximum
    /// Memory Use (MiB)").
    pub total_memory_mib: usize,
    /// Percentage of `total_memory_mib` reserved for the NN-eval cache
    /// (spec.md §6.1 "Percentage of memory for cache"), 1..99.
    pub cache_pct: u32,
    pub max_tree_size: usize,
    pub cache_capacity: usize,
    pub max_playouts: usize,
    pub max_visits: usize,
    pub lagbuffer_cs: i32,
    pub resign_pct: i32,
    pub pondering: bool,
    pub c_puct: f32,
    pub fpu_reduction: f32,
    pub lcb_min_visit_ratio: f32,
    pub ci_alpha: f32,
    pub dumbpass: bool,
    pub noise: bool,
    pub random_move_count: usize,
    pub time_management: TimeManagement,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let total_memory_mib = 5_200; // ~ analogous to UCTSearch::DEFAULT_MAX_MEMORY
        let cache_pct = 10;
        let (max_tree_size, cache_capacity) = split_memory_budget(total_memory_mib, cache_pct);
        Self {
            num_threads: *NUM_THREADS,
            batch_size: *BATCH_SIZE,
            total_memory_mib,
            cache_pct,
            max_tree_size,
            cache_capacity,
            max_playouts: usize::MAX / 2,
            max_visits: usize::MAX / 2,
            lagbuffer_cs: 100,
            resign_pct: -1,
            pondering: false,
            c_puct: 0.8,
            fpu_reduction: 0.25,
            lcb_min_visit_ratio: 0.10,
            ci_alpha: 1.0 - 0.05,
            dumbpass: false,
            noise: false,
            random_move_count: 0,
            time_management: TimeManagement::On,
        }
    }
}

/// Reader-writer handle over an `EngineConfig` snapshot. Cloning a handle is
/// cheap (it clones the `Arc<ArcSwap<_>>`); every clone observes the latest
/// `store()`.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ArcSwap<EngineConfig>>);

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(config)))
    }

    pub fn load(&self) -> Arc<EngineConfig> {
        self.0.load_full()
    }

    pub fn store(&self, config: EngineConfig) {
        self.0.store(Arc::new(config));
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_visible_to_clones() {
        let handle = ConfigHandle::default();
        let other = handle.clone();

        let mut next = (*handle.load()).clone();
        next.resign_pct = 5;
        handle.store(next);

        assert_eq!(other.load().resign_pct, 5);
    }

    #[test]
    fn splitting_the_memory_budget_divides_by_the_cache_percentage() {
        let (tree_nodes, cache_entries) = split_memory_budget(100, 25);
        assert_eq!(tree_nodes, 75_000_000 / BYTES_PER_NODE);
        assert_eq!(cache_entries, 25_000_000 / BYTES_PER_CACHE_ENTRY);
    }

    #[test]
    fn a_cache_percentage_above_99_is_clamped() {
        let (tree_nodes, _) = split_memory_budget(100, 150);
        assert_eq!(tree_nodes, 1_000_000 / BYTES_PER_NODE);
    }
}
