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

//! Error kinds (spec.md §7). Propagation policy: the search loop never
//! aborts on a per-playout error, only on `Fatal`; pondering treats any
//! error as "stop pondering", not "stop the process".

use ishi_go::IllegalMove;
use ishi_nn::PredictError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("malformed GTP command: {0}")]
    Protocol(String),

    #[error("illegal move: {0}")]
    IllegalMove(#[from] IllegalMove),

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    #[error("search was cancelled")]
    Cancellation,

    #[error("fatal engine error: {0}")]
    Fatal(String),
}

impl From<PredictError> for SearchError {
    fn from(value: PredictError) -> Self {
        match value {
            PredictError::Halt => SearchError::Cancellation,
            PredictError::Fatal(message) => SearchError::Fatal(message),
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
