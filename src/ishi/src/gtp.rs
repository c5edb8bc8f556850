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

//! The GTP command loop (spec.md §6.1), grounded on `GTP.cpp`'s dispatch
//! table and `gtp_printf`/`gtp_fail_printf` response framing: a success
//! response is `=[id] text\n\n`, a failure is `?[id] text\n\n`.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Sender};
use cpu_time::ProcessTime;
use ishi_go::{Color, Move};
use ishi_mcts::{
    run_search, select_best_move, search, BestMove, FingerprintCache, Overtime, PuctParams,
    Scheduler, StandardDeterministicSearch, StandardSearch, StopSignal, TimeState,
};
use ishi_nn::reference::ReferencePredictor;
use log::{debug, error, info};
use regex::Regex;

use crate::engine::Engine;

const PROTOCOL_VERSION: &str = "2";
const PROGRAM_NAME: &str = "ishi";
const PROGRAM_VERSION: &str = "0.1.0";

const COMMANDS: &[&str] = &[
    "protocol_version",
    "name",
    "version",
    "known_command",
    "list_commands",
    "quit",
    "boardsize",
    "clear_board",
    "komi",
    "play",
    "genmove",
    "undo",
    "final_score",
    "showboard",
    "time_settings",
    "kgs-time_settings",
    "loadsgf",
    "lz-setoption",
    "lz-analyze",
    "lz-genmove_analyze",
];

pub struct GtpLoop {
    engine: Engine,
    scheduler: Arc<Scheduler>,
    cache: FingerprintCache,
    id_re: Regex,
    // Kept only so the evaluator threads are torn down (rather than leaked
    // mid-test) when a `GtpLoop` is dropped; never actually sent to in a
    // long-running process, which exits the same way leela-zero's own GTP
    // daemon does.
    _worker_stops: Vec<Sender<()>>,
}

/// Scheduler worker-thread count (spec.md §4.3 "Worker count"):
/// `ceil(num_search_threads / batch_size / (num_devices + 1)) + 1` per
/// device. One worker alone would serialize every forward pass behind
/// whichever batch it is currently assembling, starving the other search
/// threads; this formula always leaves at least one extra worker free to
/// pick up the next batch while another is in flight. This engine has no
/// GPU device enumeration -- `ReferencePredictor` runs on the calling
/// thread regardless -- so `num_devices` is fixed at 1.
fn scheduler_worker_count(num_threads: usize, batch_size: usize) -> usize {
    const NUM_DEVICES: usize = 1;
    let batch_size = batch_size.max(1);
    let per_device = div_ceil(num_threads, batch_size * (NUM_DEVICES + 1)) + 1;
    per_device * NUM_DEVICES
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b.max(1) - 1) / b.max(1)
}

impl GtpLoop {
    pub fn new(engine: Engine) -> Self {
        let config = engine.config();
        let scheduler = Scheduler::new(config.batch_size);
        let cache = FingerprintCache::new(config.cache_capacity);

        let worker_count = scheduler_worker_count(config.num_threads, config.batch_size);
        let mut worker_stops = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (worker_stop, worker_stop_rx) = bounded::<()>(1);
            let worker_scheduler = scheduler.clone();
            thread::spawn(move || {
                let predictor = ReferencePredictor::new();
                worker_scheduler.run_worker(&predictor, &worker_stop_rx);
            });
            worker_stops.push(worker_stop);
        }

        GtpLoop {
            engine,
            scheduler,
            cache,
            id_re: Regex::new(r"^(\d+)\s+(.*)$").unwrap(),
            _worker_stops: worker_stops,
        }
    }

    /// Consumes one line of GTP input and returns the fully formatted
    /// response (including its blank-line terminator), or `None` if the
    /// command was `quit` and the loop should stop after replying.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Some(String::new());
        }

        let (id, rest) = self.split_id(line);
        let mut parts = rest.split_whitespace();
        let command = parts.next().unwrap_or("").to_lowercase();
        let args: Vec<&str> = parts.collect();

        let outcome = self.dispatch(&command, &args);
        match outcome {
            Dispatch::Ok(text) => Some(format_response(true, id, &text)),
            Dispatch::Err(text) => Some(format_response(false, id, &text)),
            Dispatch::Quit(text) => {
                print!("{}", format_response(true, id, &text));
                None
            }
        }
    }

    fn split_id<'a>(&self, line: &'a str) -> (Option<u32>, &'a str) {
        if let Some(caps) = self.id_re.captures(line) {
            let id: u32 = caps[1].parse().unwrap_or(0);
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            (Some(id), rest)
        } else {
            (None, line)
        }
    }

    fn dispatch(&mut self, command: &str, args: &[&str]) -> Dispatch {
        match command {
            "protocol_version" => Dispatch::Ok(PROTOCOL_VERSION.to_string()),
            "name" => Dispatch::Ok(PROGRAM_NAME.to_string()),
            "version" => Dispatch::Ok(PROGRAM_VERSION.to_string()),
            "list_commands" => Dispatch::Ok(COMMANDS.join("\n")),
            "known_command" => {
                let known = args.first().map(|c| COMMANDS.contains(c)).unwrap_or(false);
                Dispatch::Ok(known.to_string())
            }
            "quit" => Dispatch::Quit(String::new()),
            "boardsize" => self.cmd_boardsize(args),
            "clear_board" => {
                self.engine.clear_board();
                Dispatch::Ok(String::new())
            }
            "komi" => self.cmd_komi(args),
            "play" => self.cmd_play(args),
            "genmove" => self.cmd_genmove(args),
            "undo" => self.cmd_undo(),
            "final_score" => Dispatch::Ok(format_score(self.engine.board().area_score())),
            "showboard" => Dispatch::Ok(self.format_showboard()),
            "time_settings" => self.cmd_time_settings(args),
            "kgs-time_settings" => self.cmd_kgs_time_settings(args),
            "loadsgf" => self.cmd_loadsgf(args),
            "lz-setoption" => self.cmd_setoption(args),
            "lz-analyze" | "lz-genmove_analyze" => self.cmd_analyze(command, args),
            _ => Dispatch::Err("unknown command".to_string()),
        }
    }

    /// Board grid followed by each side's clock, grounded on
    /// `TimeControl::display_times`'s "Black time: HH:MM:SS, ..." lines.
    fn format_showboard(&self) -> String {
        format!(
            "\n{}\n{}\n{}\n",
            self.engine.board(),
            format_time("Black", &self.engine.time_state(Color::Black)),
            format_time("White", &self.engine.time_state(Color::White)),
        )
    }

    fn cmd_boardsize(&mut self, args: &[&str]) -> Dispatch {
        match args.first().and_then(|a| a.parse::<usize>().ok()) {
            Some(n) if n == ishi_go::BOARD_SIZE => {
                self.engine.clear_board();
                Dispatch::Ok(String::new())
            }
            _ => Dispatch::Err("unacceptable size".to_string()),
        }
    }

    fn cmd_komi(&mut self, args: &[&str]) -> Dispatch {
        match args.first().and_then(|a| a.parse::<f32>().ok()) {
            Some(komi) => {
                self.engine.set_komi(komi);
                Dispatch::Ok(String::new())
            }
            None => Dispatch::Err("syntax not understood".to_string()),
        }
    }

    fn cmd_play(&mut self, args: &[&str]) -> Dispatch {
        if args.len() < 2 {
            return Dispatch::Err("syntax not understood".to_string());
        }
        let color = match parse_color(args[0]) {
            Some(c) => c,
            None => return Dispatch::Err("syntax not understood".to_string()),
        };
        let mv = match ishi_go::point::text_to_move(args[1]) {
            Some(mv) => mv,
            None => return Dispatch::Err("syntax not understood".to_string()),
        };

        match self.engine.play(color, mv) {
            Ok(()) => Dispatch::Ok(String::new()),
            Err(_) => Dispatch::Err("illegal move".to_string()),
        }
    }

    fn cmd_genmove(&mut self, args: &[&str]) -> Dispatch {
        let color = match args.first().and_then(|a| parse_color(a)) {
            Some(c) => c,
            None => return Dispatch::Err("syntax not understood".to_string()),
        };

        match self.run_genmove(color, false) {
            Ok((text, _)) => Dispatch::Ok(text),
            Err(message) => Dispatch::Err(message),
        }
    }

    fn cmd_undo(&mut self) -> Dispatch {
        match self.engine.undo() {
            Ok(()) => Dispatch::Ok(String::new()),
            Err(_) => Dispatch::Err("cannot undo".to_string()),
        }
    }

    fn cmd_time_settings(&mut self, args: &[&str]) -> Dispatch {
        if args.len() < 3 {
            return Dispatch::Err("syntax not understood".to_string());
        }
        let main: i64 = match args[0].parse() {
            Ok(v) => v,
            Err(_) => return Dispatch::Err("syntax not understood".to_string()),
        };
        let byo: i64 = match args[1].parse() {
            Ok(v) => v,
            Err(_) => return Dispatch::Err("syntax not understood".to_string()),
        };
        let stones: u32 = match args[2].parse() {
            Ok(v) => v,
            Err(_) => return Dispatch::Err("syntax not understood".to_string()),
        };

        self.engine.set_time(main * 100, byo * 100, stones);
        Dispatch::Ok(String::new())
    }

    fn cmd_kgs_time_settings(&mut self, args: &[&str]) -> Dispatch {
        match args.first() {
            Some(&"none") => {
                self.engine.set_time_unlimited();
                Dispatch::Ok(String::new())
            }
            Some(&"absolute") if args.len() >= 2 => {
                let main: i64 = args[1].parse().unwrap_or(0);
                self.engine.set_time(main * 100, 0, 0);
                Dispatch::Ok(String::new())
            }
            Some(&"byoyomi") if args.len() >= 4 => {
                let main: i64 = args[1].parse().unwrap_or(0);
                let period: i64 = args[2].parse().unwrap_or(0);
                self.engine.set_time(main * 100, period * 100, 1);
                Dispatch::Ok(String::new())
            }
            Some(&"canadian") if args.len() >= 4 => {
                let main: i64 = args[1].parse().unwrap_or(0);
                let period: i64 = args[2].parse().unwrap_or(0);
                let stones: u32 = args[3].parse().unwrap_or(1);
                self.engine.set_time(main * 100, period * 100, stones);
                Dispatch::Ok(String::new())
            }
            _ => Dispatch::Err("syntax not understood".to_string()),
        }
    }

    /// Loads a main-line SGF file as the current game (spec.md §6.3). The
    /// optional trailing move number is accepted but ignored -- this
    /// implementation always replays to the end of the main line, the same
    /// simplification `lz-analyze`'s single-shot search already makes.
    fn cmd_loadsgf(&mut self, args: &[&str]) -> Dispatch {
        let path = match args.first() {
            Some(path) => path,
            None => return Dispatch::Err("syntax not understood".to_string()),
        };

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Dispatch::Err("cannot load file".to_string()),
        };

        let record = match ishi_go::sgf::parse(&text) {
            Ok(record) => record,
            Err(_) => return Dispatch::Err("cannot load file".to_string()),
        };

        match self.engine.load_game_record(&record) {
            Ok(()) => Dispatch::Ok(String::new()),
            Err(_) => Dispatch::Err("illegal move in file".to_string()),
        }
    }

    fn cmd_setoption(&mut self, args: &[&str]) -> Dispatch {
        let joined = args.join(" ");
        let re = Regex::new(r#"name\s+(.+?)\s+value\s+(.+)"#).unwrap();
        let caps = match re.captures(&joined) {
            Some(c) => c,
            None => return Dispatch::Err("syntax not understood".to_string()),
        };
        let name = caps[1].trim();
        let value = caps[2].trim();

        let applied = self.engine.set_option(name, value);
        if applied {
            if name == "Maximum Memory Use" || name == "Percentage of memory for cache" {
                self.cache.resize(self.engine.config().cache_capacity);
            }
            Dispatch::Ok(String::new())
        } else {
            Dispatch::Err(format!("unknown option {}", name))
        }
    }

    /// A non-streaming stand-in for leela-zero's periodic `info` lines:
    /// runs the search once and reports the final root distribution as a
    /// single batch of `info` lines, then (for `lz-genmove_analyze`) the
    /// chosen move.
    fn cmd_analyze(&mut self, command: &str, args: &[&str]) -> Dispatch {
        let color = match args.first().and_then(|a| parse_color(a)) {
            Some(c) => c,
            None => self.engine.board().to_move,
        };

        let avoid = parse_avoid_clause(args);
        if !avoid.is_empty() {
            debug!("{}: {} avoid-move(s) parsed (not yet enforced)", command, avoid.len());
        }

        match self.run_genmove(color, true) {
            Ok((text, info_lines)) => {
                let mut out = info_lines;
                if command == "lz-genmove_analyze" {
                    out.push_str(&format!("play {}\n", text));
                }
                Dispatch::Ok(out)
            }
            Err(message) => Dispatch::Err(message),
        }
    }

    /// Runs the search for the move about to be generated. The principal
    /// thread drives `run_search`'s authoritative deadline/stop bookkeeping
    /// (spec.md §4.6/§4.5); `num_threads - 1` helper threads pump extra
    /// playouts into the same tree through the batching scheduler, the way
    /// `UCTSearch::think` spreads `play_simulation` calls across a thread
    /// pool feeding one `OpenCLScheduler`.
    fn run_genmove(&mut self, color: Color, with_info: bool) -> Result<(String, String), String> {
        let config = self.engine.config();
        let options: Box<dyn ishi_mcts::SearchOptions> = if config.noise {
            Box::new(StandardSearch { noise: true })
        } else {
            Box::new(StandardDeterministicSearch)
        };

        let stop = StopSignal::new();
        let time_state = self.engine.time_state(color);
        let tree = self.engine.tree();
        let scheduler = self.scheduler.as_ref();
        let cache = &self.cache;
        let options_ref = options.as_ref();
        let puct = PuctParams::from(config.as_ref());
        let helper_threads = config.num_threads.saturating_sub(1);
        let helpers_stopped = AtomicBool::new(false);

        let started = ProcessTime::now();
        let playouts = thread::scope(|scope| {
            for _ in 0..helper_threads {
                scope.spawn(|| {
                    while !helpers_stopped.load(Ordering::Acquire) {
                        let _ = search::playout(
                            &tree.root,
                            &tree.root_board,
                            scheduler,
                            cache,
                            options_ref,
                            &tree.budget,
                            puct,
                        );
                    }
                });
            }

            let result = run_search(
                tree,
                scheduler,
                cache,
                options_ref,
                &stop,
                &time_state,
                config.as_ref(),
                config.time_management,
            );
            helpers_stopped.store(true, Ordering::Release);
            result
        })
        .map_err(|err| {
            error!("search failed: {}", err);
            err.to_string()
        })?;

        info!("genmove: {} playouts in {:?} cpu time", playouts, started.elapsed());

        let board = self.engine.board().clone();
        let decision = select_best_move(
            self.engine.root(),
            color,
            &board,
            config.dumbpass,
            config.resign_pct as f32,
            (config.max_visits as f32 * config.lcb_min_visit_ratio) as i32,
        );

        let mv = match decision {
            BestMove::Resign => ishi_go::RESIGN,
            BestMove::Move(mv) => mv,
        };

        self.engine.play(color, mv).map_err(|e| e.to_string())?;

        let text = if mv == ishi_go::RESIGN {
            "resign".to_string()
        } else {
            ishi_go::point::move_to_text(mv)
        };

        let info_lines = if with_info { self.format_info_lines(color) } else { String::new() };
        Ok((text, info_lines))
    }

    fn format_info_lines(&self, color: Color) -> String {
        let mut out = String::new();
        for child in self.engine.root().children_snapshot() {
            out.push_str(&format!(
                "info move {} visits {} winrate {:.0} prior {:.0} lcb {:.0}\n",
                ishi_go::point::move_to_text(child.mv),
                child.visits,
                child.winrate * 10_000.0,
                child.prior * 10_000.0,
                child.lcb.max(0.0) * 10_000.0,
            ));
        }
        let _ = color;
        out
    }
}

enum Dispatch {
    Ok(String),
    Err(String),
    Quit(String),
}

fn format_response(ok: bool, id: Option<u32>, text: &str) -> String {
    let marker = if ok { "=" } else { "?" };
    match id {
        Some(id) => format!("{}{} {}\n\n", marker, id, text),
        None => format!("{} {}\n\n", marker, text),
    }
}

fn format_score(score: f32) -> String {
    if score > 0.0 {
        format!("B+{:.1}", score)
    } else if score < 0.0 {
        format!("W+{:.1}", -score)
    } else {
        "0".to_string()
    }
}

/// "Black time: 00:01:40, 1 period(s) of 100 seconds left", grounded on
/// `TimeControl::display_color_time`. While the main clock is still
/// running, only the `HH:MM:SS` prefix is emitted; once `remaining_main_cs`
/// has been exhausted the active overtime's counter is appended.
fn format_time(name: &str, state: &TimeState) -> String {
    let in_overtime = state.remaining_main_cs <= 0 && state.overtime != Overtime::None;
    let shown_cs = if in_overtime {
        match state.overtime {
            Overtime::Byoyomi { period_cs, .. } => period_cs,
            Overtime::Canadian { period_cs, .. } => period_cs,
            Overtime::None => state.remaining_main_cs,
        }
    } else {
        state.remaining_main_cs.max(0)
    };

    let total_seconds = shown_cs / 100;
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    let mut out = format!("{} time: {:02}:{:02}:{:02}", name, hours, minutes, seconds);

    if in_overtime {
        match state.overtime {
            Overtime::Byoyomi { period_cs, periods_left } => {
                out.push_str(&format!(", {} period(s) of {} seconds left", periods_left, period_cs / 100));
            }
            Overtime::Canadian { stones_left, .. } => {
                out.push_str(&format!(", {} stones left", stones_left));
            }
            Overtime::None => {}
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvoidMove {
    pub color: Color,
    pub vertex: Move,
    pub until_move: u32,
}

/// Parses a trailing `avoid <color> <vertex>[,<vertex>...] <until-move>`
/// clause off an `lz-analyze`/`lz-genmove_analyze` argument list. This only
/// recognises the clause so the command does not fail to parse; actually
/// excluding these vertices from the search is not wired up (see
/// DESIGN.md).
pub fn parse_avoid_clause(args: &[&str]) -> Vec<AvoidMove> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(&token) = iter.next() {
        if !token.eq_ignore_ascii_case("avoid") {
            continue;
        }
        let color = match iter.next().and_then(|c| parse_color(c)) {
            Some(c) => c,
            None => break,
        };
        let vertices = match iter.next() {
            Some(v) => *v,
            None => break,
        };
        let until_move = match iter.next().and_then(|m| m.parse::<u32>().ok()) {
            Some(m) => m,
            None => break,
        };
        for vertex_text in vertices.split(',') {
            if let Some(vertex) = ishi_go::point::text_to_move(vertex_text) {
                out.push(AvoidMove { color, vertex, until_move });
            }
        }
    }
    out
}

fn parse_color(text: &str) -> Option<Color> {
    match text.to_lowercase().as_str() {
        "b" | "black" => Some(Color::Black),
        "w" | "white" => Some(Color::White),
        _ => None,
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn protocol_version_replies_with_two() {
        let mut gtp = GtpLoop::new(Engine::new());
        let reply = gtp.handle_line("protocol_version").unwrap();
        assert_eq!(reply, "= 2\n\n");
    }

    #[test]
    fn unknown_command_fails() {
        let mut gtp = GtpLoop::new(Engine::new());
        let reply = gtp.handle_line("frobnicate").unwrap();
        assert!(reply.starts_with('?'));
    }

    #[test]
    fn ids_are_echoed_back() {
        let mut gtp = GtpLoop::new(Engine::new());
        let reply = gtp.handle_line("7 name").unwrap();
        assert_eq!(reply, "=7 ishi\n\n");
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut gtp = GtpLoop::new(Engine::new());
        assert!(gtp.handle_line("quit").is_none());
    }

    #[test]
    fn worker_count_leaves_a_spare_per_device() {
        // One device: ceil(8 / 2 / 2) + 1 = 3 workers.
        assert_eq!(scheduler_worker_count(8, 2), 3);
        // A single search thread still gets at least 2 workers so a batch
        // in flight never blocks the only other one assembling.
        assert_eq!(scheduler_worker_count(1, 16), 2);
    }

    #[test]
    fn play_then_undo_round_trips_the_board() {
        let mut gtp = GtpLoop::new(Engine::new());
        assert_eq!(gtp.handle_line("play b Q16").unwrap(), "= \n\n");
        assert_eq!(gtp.handle_line("undo").unwrap(), "= \n\n");
    }

    #[test]
    fn cache_percentage_option_resizes_the_live_cache() {
        let mut gtp = GtpLoop::new(Engine::new());
        let before = gtp.cache.len();
        assert_eq!(
            gtp.handle_line("lz-setoption name Percentage of memory for cache value 50").unwrap(),
            "= \n\n"
        );
        assert_eq!(gtp.cache.len(), before);
    }

    #[test]
    fn loadsgf_replays_a_file_onto_the_board() {
        let path = std::env::temp_dir().join("ishi_gtp_loadsgf_test.sgf");
        std::fs::write(&path, "(;GM[1]SZ[19]KM[6.5];B[pd];W[dp])").unwrap();

        let mut gtp = GtpLoop::new(Engine::new());
        let reply = gtp.handle_line(&format!("loadsgf {}", path.display())).unwrap();
        assert_eq!(reply, "= \n\n");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn loadsgf_reports_a_missing_file() {
        let mut gtp = GtpLoop::new(Engine::new());
        let reply = gtp.handle_line("loadsgf /nonexistent/ishi-test.sgf").unwrap();
        assert!(reply.starts_with('?'));
    }
}
