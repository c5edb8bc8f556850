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

//! Process entry point: parses the handful of CLI flags this engine
//! accepts, loads and validates a weight file if one was given, then
//! drives the GTP loop over stdin/stdout until `quit` or end-of-input.

use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use log::{error, info};

use ishi::engine::Engine;
use ishi::gtp::GtpLoop;

struct Args {
    weights_path: Option<String>,
}

fn parse_args() -> Args {
    let mut weights_path = None;
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--weights" | "-w" => weights_path = iter.next(),
            _ => {}
        }
    }
    Args { weights_path }
}

/// Loads and validates a weight file up front so a malformed network fails
/// fast at startup rather than mid-search (spec.md §6.4 "exits non-zero on
/// a fatal evaluator or weight-file error").
fn load_weights(path: &str) -> Result<ishi_nn::weights::Weights, String> {
    let bytes = fs::read(path).map_err(|err| format!("could not read {}: {}", path, err))?;
    ishi_nn::weights::parse(&bytes).map_err(|err| format!("could not parse {}: {}", path, err))
}

fn main() -> ExitCode {
    env_logger::init();
    let args = parse_args();

    if let Some(path) = &args.weights_path {
        match load_weights(path) {
            Ok(weights) => info!("loaded weight file {} (version {})", path, weights.version),
            Err(message) => {
                error!("{}", message);
                return ExitCode::FAILURE;
            }
        }
    }

    let mut gtp = GtpLoop::new(Engine::new());
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!("error reading stdin: {}", err);
                break;
            }
        };

        match gtp.handle_line(&line) {
            Some(response) => {
                let _ = write!(out, "{}", response);
                let _ = out.flush();
            }
            None => {
                let _ = out.flush();
                return ExitCode::SUCCESS;
            }
        }
    }

    ExitCode::SUCCESS
}
