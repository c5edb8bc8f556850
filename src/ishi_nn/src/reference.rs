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

//! A synchronous CPU reference predictor, used as the "self-check
//! reference" `dg_mcts`'s own synchronous evaluator provides. It does not
//! run the real convolutional stack: the residual tower, Winograd
//! transforms and SGEMM kernels stay out of scope, so this produces a
//! policy/value from simple board features (material balance over the
//! empty-point plane, uniform
//! over legal-looking points) good enough to drive and test the search
//! machinery against, not to play strong Go.

use std::sync::atomic::{AtomicBool, Ordering};

use ishi_go::NUM_VERTICES;
use ishi_utils::types::f16;

use crate::predictor::{Evaluation, PredictError, PredictResult, Predictor};

pub struct ReferencePredictor {
    draining: AtomicBool,
}

impl ReferencePredictor {
    pub fn new() -> Self {
        ReferencePredictor {
            draining: AtomicBool::new(false),
        }
    }
}

impl Default for ReferencePredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for ReferencePredictor {
    fn forward(&self, planes: &[f16]) -> PredictResult {
        if self.draining.load(Ordering::Acquire) {
            return Err(PredictError::Halt);
        }
        if planes.len() < 4 * NUM_VERTICES {
            return Err(PredictError::Fatal("unexpected plane count".to_string()));
        }

        let own: f32 = (0..NUM_VERTICES).map(|i| planes[i].to_f32()).sum();
        let opp: f32 = (0..NUM_VERTICES)
            .map(|i| planes[NUM_VERTICES + i].to_f32())
            .sum();
        let empty_plane = &planes[2 * NUM_VERTICES..3 * NUM_VERTICES];

        let empty_count: f32 = empty_plane.iter().map(|v| v.to_f32()).sum();
        let mut policy = vec![0f32; NUM_VERTICES + 1];
        if empty_count > 0.0 {
            let uniform = 1.0 / empty_count;
            for (i, slot) in empty_plane.iter().enumerate() {
                if slot.to_f32() > 0.0 {
                    policy[i] = uniform;
                }
            }
        }
        // A small constant pass prior, renormalized below like the real
        // net's softmax output would be.
        policy[NUM_VERTICES] = 0.02;
        let total: f32 = policy.iter().sum();
        if total > 0.0 {
            for p in policy.iter_mut() {
                *p /= total;
            }
        }

        // Logistic of the material difference, scaled down so that a
        // handful of stones does not saturate the sigmoid immediately.
        let value = 1.0 / (1.0 + (-(own - opp) / 8.0).exp());

        Ok(Evaluation::new(policy, value))
    }

    fn drain(&self) {
        self.draining.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.draining.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_planes() -> Vec<f16> {
        let mut planes = vec![f16::from(0.0f32); 4 * NUM_VERTICES];
        for slot in planes.iter_mut().skip(2 * NUM_VERTICES).take(NUM_VERTICES) {
            *slot = f16::from(1.0f32);
        }
        planes
    }

    #[test]
    fn policy_sums_to_one_on_empty_board() {
        let predictor = ReferencePredictor::new();
        let eval = predictor.forward(&empty_planes()).unwrap();
        let sum: f32 = eval.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn value_is_half_with_no_material_difference() {
        let predictor = ReferencePredictor::new();
        let eval = predictor.forward(&empty_planes()).unwrap();
        assert!((eval.value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn drain_then_forward_is_halt() {
        let predictor = ReferencePredictor::new();
        predictor.drain();
        assert_eq!(predictor.forward(&empty_planes()), Err(PredictError::Halt));
        predictor.resume();
        assert!(predictor.forward(&empty_planes()).is_ok());
    }
}
