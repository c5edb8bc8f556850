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

/// Board edge length. The core is written against a fixed compile-time size,
/// matching `BOARD_SIZE` in `dg_go`/`FastBoard`; GTP's `boardsize` command
/// only accepts this value.
pub const BOARD_SIZE: usize = 19;
pub const NUM_VERTICES: usize = BOARD_SIZE * BOARD_SIZE;

/// `Move` as spec.md §3 describes it: an intersection index, or one of the
/// two sentinels below. `policy[N]` (spec.md §3 `Evaluation`) is the pass
/// prior, so `PASS == NUM_VERTICES`.
pub type Move = i16;

pub const PASS: Move = NUM_VERTICES as Move;
pub const RESIGN: Move = -1;

pub fn is_on_board(m: Move) -> bool {
    m >= 0 && (m as usize) < NUM_VERTICES
}

pub fn to_xy(point: usize) -> (usize, usize) {
    (point % BOARD_SIZE, point / BOARD_SIZE)
}

pub fn from_xy(x: usize, y: usize) -> usize {
    y * BOARD_SIZE + x
}

/// Column letters skip `I`, matching GTP vertex notation (spec.md §6.1
/// "Output contract for move vertices").
const COLUMNS: &str = "ABCDEFGHJKLMNOPQRST";

pub fn move_to_text(m: Move) -> String {
    if m == PASS {
        "pass".to_string()
    } else if m == RESIGN {
        "resign".to_string()
    } else {
        let (x, y) = to_xy(m as usize);
        format!("{}{}", COLUMNS.as_bytes()[x] as char, y + 1)
    }
}

pub fn text_to_move(text: &str) -> Option<Move> {
    let lower = text.to_ascii_lowercase();
    if lower == "pass" {
        return Some(PASS);
    }
    if lower == "resign" {
        return Some(RESIGN);
    }

    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let col_char = bytes[0].to_ascii_uppercase();
    let x = COLUMNS.bytes().position(|c| c == col_char)?;
    let y: usize = text[1..].parse().ok()?;
    if y == 0 || x >= BOARD_SIZE || y > BOARD_SIZE {
        return None;
    }

    Some(from_xy(x, y - 1) as Move)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_round_trip() {
        for x in 0..BOARD_SIZE {
            for y in 0..BOARD_SIZE {
                let point = from_xy(x, y) as Move;
                let text = move_to_text(point);
                assert_eq!(text_to_move(&text), Some(point));
            }
        }
    }

    #[test]
    fn skips_letter_i() {
        assert!(!COLUMNS.contains('I'));
    }

    #[test]
    fn pass_and_resign_are_literal_words() {
        assert_eq!(move_to_text(PASS), "pass");
        assert_eq!(move_to_text(RESIGN), "resign");
        assert_eq!(text_to_move("pass"), Some(PASS));
        assert_eq!(text_to_move("resign"), Some(RESIGN));
    }
}
