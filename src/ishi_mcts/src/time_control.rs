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

//! Time manager (spec.md §4.6), grounded directly on `TimeControl.cpp`'s
//! `max_time_for_move`/`can_accumulate_time`/`get_moves_expected` formulas.

use ishi_go::NUM_VERTICES;

/// One month in centiseconds, used as the practical "unlimited" time
/// budget when there is neither overtime nor a main-time clock running
/// (spec.md §4.6 "If no overtime and no stones").
const EFFECTIVELY_UNLIMITED_CS: i64 = 30 * 24 * 60 * 60 * 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Overtime {
    None,
    Byoyomi { period_cs: i64, periods_left: u32 },
    Canadian { stones_left: u32, period_cs: i64 },
}

#[derive(Clone, Copy, Debug)]
pub struct TimeState {
    pub remaining_main_cs: i64,
    pub overtime: Overtime,
}

impl TimeState {
    pub fn unlimited() -> Self {
        TimeState {
            remaining_main_cs: EFFECTIVELY_UNLIMITED_CS,
            overtime: Overtime::None,
        }
    }

    pub fn absolute(main_time_cs: i64) -> Self {
        TimeState {
            remaining_main_cs: main_time_cs,
            overtime: Overtime::None,
        }
    }

    pub fn byoyomi(main_time_cs: i64, period_cs: i64, periods: u32) -> Self {
        TimeState {
            remaining_main_cs: main_time_cs,
            overtime: Overtime::Byoyomi { period_cs, periods_left: periods.max(1) },
        }
    }

    pub fn canadian(main_time_cs: i64, stones: u32, period_cs: i64) -> Self {
        TimeState {
            remaining_main_cs: main_time_cs,
            overtime: Overtime::Canadian { stones_left: stones, period_cs },
        }
    }

    fn in_overtime(&self) -> bool {
        self.remaining_main_cs <= 0 && self.overtime != Overtime::None
    }

    /// `can_accumulate_time` (spec.md §4.6): false in byo-yomi and in
    /// Canadian overtime with exactly one stone left.
    pub fn can_accumulate_time(&self) -> bool {
        if !self.in_overtime() {
            return true;
        }
        match self.overtime {
            Overtime::Byoyomi { .. } => false,
            Overtime::Canadian { stones_left, .. } => stones_left > 1,
            Overtime::None => true,
        }
    }
}

/// `moves_expected(board, movenum)`: a slowly shrinking estimate with an
/// opening boost for the first `area/6` moves (spec.md §4.6).
pub fn moves_expected(move_number: u32) -> f64 {
    let area = NUM_VERTICES as f64;
    let opening_boost_moves = area / 6.0;

    let base = (area * 0.6 - move_number as f64).max(area * 0.1);
    if (move_number as f64) < opening_boost_moves {
        base * 1.5
    } else {
        base
    }
}

/// `max_time_for_move` (spec.md §4.6): the wall-clock budget, in
/// centiseconds, allotted to the move about to be searched.
pub fn max_time_for_move(state: &TimeState, move_number: u32, lag_buffer_cs: i64) -> i64 {
    if !state.in_overtime() {
        let remaining = (state.remaining_main_cs - lag_buffer_cs).max(0);
        let expected = moves_expected(move_number).max(1.0);
        return (remaining as f64 / expected) as i64;
    }

    match state.overtime {
        Overtime::Byoyomi { period_cs, .. } => (period_cs - lag_buffer_cs).max(0),
        Overtime::Canadian { stones_left, period_cs } => {
            let expected = (stones_left.max(1)) as f64;
            let base = 0.0;
            let increment = (period_cs as f64 / expected) as i64;
            base as i64 + (increment - lag_buffer_cs).max(0)
        }
        Overtime::None => EFFECTIVELY_UNLIMITED_CS,
    }
}

impl PartialEq for Overtime {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Overtime::None, Overtime::None)
                | (Overtime::Byoyomi { .. }, Overtime::Byoyomi { .. })
                | (Overtime::Canadian { .. }, Overtime::Canadian { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_time_yields_a_large_budget() {
        let state = TimeState::unlimited();
        let budget = max_time_for_move(&state, 1, 100);
        assert!(budget > 1_000_000);
    }

    #[test]
    fn byoyomi_uses_period_minus_lag_buffer() {
        let state = TimeState::byoyomi(0, 3_000, 1);
        let budget = max_time_for_move(&state, 100, 100);
        assert_eq!(budget, 2_900);
    }

    #[test]
    fn canadian_with_one_stone_cannot_accumulate() {
        let state = TimeState::canadian(0, 1, 6_000);
        assert!(!state.can_accumulate_time());

        let state = TimeState::canadian(0, 5, 6_000);
        assert!(state.can_accumulate_time());
    }

    #[test]
    fn absolute_time_can_always_accumulate() {
        let state = TimeState::absolute(6_000);
        assert!(state.can_accumulate_time());
    }
}
