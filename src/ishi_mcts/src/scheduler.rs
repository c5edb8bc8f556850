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

//! Batching scheduler (spec.md §4.3), grounded on `OpenCLScheduler.cpp`'s
//! `batch_worker`/`pickup_task`: a FIFO of pending requests, an adaptive
//! wait window that favours batching under load and single evaluation
//! when a lone search thread would otherwise deadlock, and a `draining`
//! gate used for cooperative shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use ishi_nn::{Evaluation, PredictError, PredictResult, Predictor};
use ishi_utils::types::f16;

const INITIAL_WAIT_MS: u64 = 10;
const MIN_WAIT_MS: u64 = 1;

struct Request {
    planes: Vec<f16>,
    reply: Sender<PredictResult>,
}

struct Queue {
    pending: Vec<Request>,
}

pub struct Scheduler {
    batch_size: usize,
    queue: Mutex<Queue>,
    cv: Condvar,
    wait_window_ms: AtomicUsize,
    single_eval_in_progress: AtomicBool,
    draining: AtomicBool,
}

impl Scheduler {
    pub fn new(batch_size: usize) -> Arc<Self> {
        Arc::new(Scheduler {
            batch_size: batch_size.max(1),
            queue: Mutex::new(Queue { pending: Vec::new() }),
            cv: Condvar::new(),
            wait_window_ms: AtomicUsize::new(INITIAL_WAIT_MS as usize),
            single_eval_in_progress: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        })
    }

    /// Blocking client call: enqueue a request and wait for its result.
    /// Mirrors `dg_mcts`'s condition-variable-per-request design.
    pub fn forward(&self, planes: Vec<f16>) -> PredictResult {
        if self.draining.load(Ordering::Acquire) {
            return Err(PredictError::Halt);
        }

        let (reply_tx, reply_rx) = bounded(1);
        {
            let mut queue = self.queue.lock().unwrap();
            queue.pending.push(Request { planes, reply: reply_tx });
            self.cv.notify_all();
        }

        reply_rx
            .recv()
            .unwrap_or(Err(PredictError::Fatal("scheduler reply channel closed".to_string())))
    }

    pub fn drain(&self) {
        self.draining.store(true, Ordering::Release);
        let queue = self.queue.lock().unwrap();
        for request in &queue.pending {
            let _ = request.reply.send(Err(PredictError::Halt));
        }
    }

    pub fn resume(&self) {
        self.draining.store(false, Ordering::Release);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().pending.len()
    }

    /// One worker iteration of the batch-pickup algorithm (spec.md §4.3
    /// "Batch-pickup algorithm"). Returns the batch of requests taken, or
    /// an empty vector if nothing was ready within the wait window.
    fn pickup(&self) -> Vec<Request> {
        let mut queue = self.queue.lock().unwrap();

        if queue.pending.len() >= self.batch_size {
            return queue.pending.drain(..self.batch_size).collect();
        }

        let wait = Duration::from_millis(self.wait_window_ms.load(Ordering::Acquire) as u64);
        let (mut queue, timeout) = self
            .cv
            .wait_timeout_while(queue, wait, |q| q.pending.len() < self.batch_size)
            .unwrap();

        if queue.pending.len() >= self.batch_size {
            return queue.pending.drain(..self.batch_size).collect();
        }

        if queue.pending.is_empty() {
            return Vec::new();
        }

        if timeout.timed_out() {
            if self
                .single_eval_in_progress
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let request = queue.pending.remove(0);
                let prev = self.wait_window_ms.load(Ordering::Acquire);
                self.wait_window_ms
                    .store(prev.saturating_sub(1).max(MIN_WAIT_MS as usize), Ordering::Release);
                return vec![request];
            } else if !queue.pending.is_empty() {
                let prev = self.wait_window_ms.load(Ordering::Acquire);
                self.wait_window_ms.store(prev + 2, Ordering::Release);
            }
        }

        Vec::new()
    }

    /// Runs one worker's batch-serve loop until `drain()` is observed with
    /// an empty queue. Intended to run on a dedicated evaluator thread per
    /// device; `predictor` performs the actual forward pass.
    pub fn run_worker(self: &Arc<Self>, predictor: &dyn Predictor, stop: &Receiver<()>) {
        loop {
            if stop.try_recv().is_ok() {
                return;
            }

            let batch = self.pickup();
            let was_single = batch.len() == 1;
            if batch.is_empty() {
                if self.draining.load(Ordering::Acquire) && self.queue_len() == 0 {
                    return;
                }
                continue;
            }

            for request in batch {
                let result = predictor.forward(&request.planes);
                let _ = request.reply.send(result);
            }

            if was_single {
                self.single_eval_in_progress.store(false, Ordering::Release);
            }
        }
    }
}

/// A trivial in-process predictor adapter: evaluates every request
/// synchronously as soon as it is picked up, useful for tests that want
/// the scheduler's queueing behaviour without spinning a real thread.
pub fn forward_one(predictor: &dyn Predictor, planes: &[f16]) -> PredictResult {
    predictor.forward(planes)
}

/// Lets a `Scheduler` stand in anywhere a `Predictor` is expected, so
/// `ishi_mcts::search` can talk to either a synchronous reference
/// predictor or the batching scheduler through the same trait object.
impl Predictor for Scheduler {
    fn forward(&self, planes: &[f16]) -> PredictResult {
        Scheduler::forward(self, planes.to_vec())
    }

    fn drain(&self) {
        Scheduler::drain(self)
    }

    fn resume(&self) {
        Scheduler::resume(self)
    }
}

pub type Batch = Vec<Evaluation>;

#[cfg(test)]
mod tests {
    use super::*;
    use ishi_nn::reference::ReferencePredictor;
    use std::thread;

    fn sample_planes() -> Vec<f16> {
        vec![f16::from(0.0f32); 4 * ishi_go::NUM_VERTICES]
    }

    #[test]
    fn drain_fails_pending_requests() {
        let scheduler = Scheduler::new(4);
        scheduler.drain();
        let result = scheduler.forward(sample_planes());
        assert_eq!(result, Err(PredictError::Halt));
    }

    #[test]
    fn single_request_is_served_by_worker() {
        let scheduler = Scheduler::new(4);
        let predictor = ReferencePredictor::new();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker_scheduler = scheduler.clone();
        let handle = thread::spawn(move || {
            worker_scheduler.run_worker(&predictor, &stop_rx);
        });

        let result = scheduler.forward(sample_planes());
        assert!(result.is_ok());

        scheduler.drain();
        let _ = stop_tx.send(());
        handle.join().unwrap();
    }
}
