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

//! The evaluator façade (spec.md §4.2): a fixed-shape `forward(planes) →
//! (policy, value)` contract that `ishi_mcts` depends on without caring
//! whether the implementation runs synchronously in the calling thread or
//! behind the batching scheduler. Grounded on dream-go's `Predictor` trait
//! (`libdg_nn`/`libdg_mcts::lib::predict`), minus the CUDA/Winograd
//! machinery that trait ultimately dispatches to.

use ishi_go::NUM_VERTICES;
use ishi_utils::types::f16;

/// `policy[N]` is the pass prior, `value` is the win probability for the
/// side to move at the evaluated position (spec.md §3 "Evaluation").
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub policy: Vec<f32>,
    pub value: f32,
}

impl Evaluation {
    pub fn new(policy: Vec<f32>, value: f32) -> Self {
        debug_assert_eq!(policy.len(), NUM_VERTICES + 1);
        Evaluation { policy, value }
    }

    pub fn pass_prior(&self) -> f32 {
        self.policy[NUM_VERTICES]
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    /// The evaluator is being drained (spec.md §4.2 `drain()`/`resume()`);
    /// callers must unwind as a cooperative cancellation, not a fatal error.
    #[error("evaluator is draining")]
    Halt,
    /// A hard evaluator failure (device lost, corrupt weights already
    /// loaded). Propagated to the top of search as fatal (spec.md §4.8).
    #[error("evaluator failed: {0}")]
    Fatal(String),
}

pub type PredictResult = Result<Evaluation, PredictError>;

/// Implemented by both the synchronous reference predictor and whatever
/// sits behind the batching scheduler; `ishi_mcts::search` only ever talks
/// to this trait.
pub trait Predictor: Send + Sync {
    fn forward(&self, planes: &[f16]) -> PredictResult;

    /// Signals in-flight and future `forward` calls to fail with
    /// `PredictError::Halt` until `resume()` is called.
    fn drain(&self) {}

    fn resume(&self) {}
}
