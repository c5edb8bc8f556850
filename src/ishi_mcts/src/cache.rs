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

//! Fingerprint cache (spec.md §4.1): a bounded FIFO map from a position
//! fingerprint to its cached `Evaluation`, protected by a single mutex.
//! Grounded on `NNCache.h`/`.cpp` (`MAX_CACHE_COUNT`/`MIN_CACHE_COUNT`,
//! mutex + `unordered_map` + order `deque`).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use ishi_go::symmetry::{Symmetry, ALL};
use ishi_nn::Evaluation;

pub const MIN_CACHE_COUNT: usize = 6_000;
pub const MAX_CACHE_COUNT: usize = 150_000;

struct Inner {
    capacity: usize,
    map: HashMap<u64, Evaluation>,
    order: VecDeque<u64>,
}

pub struct FingerprintCache {
    inner: Mutex<Inner>,
}

impl FingerprintCache {
    pub fn new(capacity: usize) -> Self {
        FingerprintCache {
            inner: Mutex::new(Inner {
                capacity,
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn lookup(&self, key: u64) -> Option<Evaluation> {
        let inner = self.inner.lock().unwrap();
        inner.map.get(&key).cloned()
    }

    /// `insert` is idempotent: inserting a key already present is a no-op
    /// (L2: twice leaves size unchanged), otherwise pushed onto the FIFO.
    pub fn insert(&self, key: u64, eval: Evaluation) {
        let mut inner = self.inner.lock().unwrap();
        if inner.map.contains_key(&key) {
            return;
        }
        inner.map.insert(key, eval);
        inner.order.push_back(key);
        Self::evict_to_capacity(&mut inner);
    }

    pub fn resize(&self, capacity: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.capacity = capacity;
        Self::evict_to_capacity(&mut inner);
    }

    /// Heuristic capacity from an expected playout budget (spec.md §4.1).
    pub fn set_size_from_playouts(&self, playouts: usize) {
        let capacity = (3 * playouts).clamp(MIN_CACHE_COUNT, MAX_CACHE_COUNT);
        self.resize(capacity);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.order.clear();
    }

    fn evict_to_capacity(inner: &mut Inner) {
        while inner.map.len() > inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

/// Looks up `key` directly, then — during the opening, when the caller
/// passes `fallback_keys` computed under the 7 non-identity symmetries —
/// falls back to each symmetric fingerprint in turn, permuting the hit's
/// policy back through the inverse symmetry before returning it (spec.md
/// §4.1 "Symmetry reuse").
pub fn lookup_with_symmetry(
    cache: &FingerprintCache,
    key: u64,
    symmetric_keys: &[(Symmetry, u64)],
) -> Option<Evaluation> {
    if let Some(hit) = cache.lookup(key) {
        return Some(hit);
    }

    for (symmetry, symmetric_key) in symmetric_keys {
        if let Some(hit) = cache.lookup(*symmetric_key) {
            return Some(permute_policy(&hit, symmetry.inverse()));
        }
    }

    None
}

fn permute_policy(eval: &Evaluation, symmetry: Symmetry) -> Evaluation {
    let pass = eval.pass_prior();
    let mut policy = vec![0f32; eval.policy.len()];
    for (point, prior) in eval.policy.iter().enumerate().take(eval.policy.len() - 1) {
        policy[symmetry.apply(point)] = *prior;
    }
    *policy.last_mut().unwrap() = pass;

    Evaluation::new(policy, eval.value)
}

pub fn all_symmetries() -> &'static [Symmetry] {
    &ALL[1..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_eval(value: f32) -> Evaluation {
        let mut policy = vec![0f32; ishi_go::NUM_VERTICES + 1];
        policy[0] = 1.0;
        Evaluation::new(policy, value)
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let cache = FingerprintCache::new(10);
        cache.insert(1, sample_eval(0.5));
        assert_eq!(cache.lookup(1).unwrap().value, 0.5);
    }

    #[test]
    fn reinserting_same_key_is_a_no_op() {
        let cache = FingerprintCache::new(10);
        cache.insert(1, sample_eval(0.5));
        cache.insert(1, sample_eval(0.9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(1).unwrap().value, 0.5);
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache = FingerprintCache::new(2);
        cache.insert(1, sample_eval(0.1));
        cache.insert(2, sample_eval(0.2));
        cache.insert(3, sample_eval(0.3));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(1).is_none());
        assert!(cache.lookup(3).is_some());
    }

    #[test]
    fn set_size_from_playouts_clamps_to_bounds() {
        let cache = FingerprintCache::new(0);
        cache.set_size_from_playouts(1);
        assert_eq!(cache.inner.lock().unwrap().capacity, MIN_CACHE_COUNT);

        cache.set_size_from_playouts(1_000_000);
        assert_eq!(cache.inner.lock().unwrap().capacity, MAX_CACHE_COUNT);
    }
}
