//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::collections::BTreeMap;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use chess_core::fen::side_to_move;
use shakmaty::Color;

use crate::engine::{EngineError, EngineFactory, EngineHandle, EngineLine, Score};

/// Maximum number of lines to read before giving up on a handshake response.
pub const MAX_UCI_LINES: usize = 1000;

/// Maximum number of lines a single search may produce before it is
/// considered runaway output.
pub const MAX_SEARCH_LINES: usize = 200_000;

/// Parsed `info` line carrying a score.
#[derive(Debug, Clone, PartialEq)]
struct InfoLine {
    multipv: u32,
    depth: u32,
    cp: Option<i32>,
    mate: Option<i32>,
    bound: bool,
    pv: Vec<String>,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    name: String,
    multi_pv: u32,
    searching: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, hash_mb: u32, threads: u32) -> Result<Self, EngineError> {
        // Bare names are resolved through PATH by the OS
        if path.contains(std::path::MAIN_SEPARATOR) && !Path::new(path).exists() {
            return Err(EngineError::NotFound(path.to_string()));
        }

        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = process.stdin.take().ok_or(EngineError::InitFailed)?;
        let stdout = process.stdout.take().ok_or(EngineError::InitFailed)?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            name: String::new(),
            multi_pv: 1,
            searching: false,
        };

        engine.send("uci").await?;
        let mut name = String::new();
        let mut lines_read = 0;
        loop {
            if lines_read > MAX_UCI_LINES {
                return Err(EngineError::InitFailed);
            }
            lines_read += 1;
            let line = engine.read_line().await?;
            if let Some(n) = line.strip_prefix("id name ") {
                name = n.to_string();
            } else if line == "uciok" {
                break;
            }
        }
        engine.name = if name.is_empty() { "Unknown Engine".to_string() } else { name };

        // Configure for analysis
        engine.send(&format!("setoption name Threads value {threads}")).await?;
        engine.send(&format!("setoption name Hash value {hash_mb}")).await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("ucinewgame").await?;
        engine.sync().await?;

        debug!(name = %engine.name, "Engine ready");
        Ok(engine)
    }

    /// Engine name as reported via `id name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read one trimmed line. `next_line` is cancel safe, so a search that is
    /// abandoned mid-read loses nothing.
    async fn read_line(&mut self) -> Result<String, EngineError> {
        match self.stdout.next_line().await? {
            Some(line) => {
                let trimmed = line.trim().to_string();
                debug!(line = %trimmed, "SF >");
                Ok(trimmed)
            }
            None => Err(EngineError::Closed),
        }
    }

    /// `isready` / `readyok` round trip
    async fn sync(&mut self) -> Result<(), EngineError> {
        self.send("isready").await?;
        self.wait_for("readyok", MAX_UCI_LINES).await
    }

    /// Wait for a specific response line (or a line starting with it)
    async fn wait_for(&mut self, expected: &str, budget: usize) -> Result<(), EngineError> {
        for _ in 0..budget {
            let line = self.read_line().await?;
            if line == expected || line.starts_with(&format!("{expected} ")) {
                return Ok(());
            }
        }
        Err(EngineError::InvalidResponse(format!(
            "No {expected} within {budget} lines"
        )))
    }

    /// Evaluate a position with `multi_pv` lines to a fixed depth.
    pub async fn evaluate_multipv(
        &mut self,
        fen: &str,
        depth: u32,
        multi_pv: u32,
    ) -> Result<Vec<EngineLine>, EngineError> {
        if self.searching {
            // A previous search was abandoned without cancel(); flush it first
            self.stop().await?;
        }

        if multi_pv != self.multi_pv {
            self.send(&format!("setoption name MultiPV value {multi_pv}")).await?;
            self.multi_pv = multi_pv;
        }
        self.send(&format!("position fen {fen}")).await?;
        // Set first: if this future is dropped mid-write, stop() must still drain
        self.searching = true;
        self.send(&format!("go depth {depth}")).await?;

        let white_to_move = side_to_move(fen) == Color::White;
        let mut lines: BTreeMap<u32, EngineLine> = BTreeMap::new();

        for _ in 0..MAX_SEARCH_LINES {
            let line = self.read_line().await?;

            if line.starts_with("bestmove") {
                self.searching = false;
                if lines.is_empty() {
                    return Err(EngineError::InvalidResponse(format!(
                        "No scored line for {fen}"
                    )));
                }
                return Ok(lines.into_values().collect());
            }

            let Some(info) = parse_info_line(&line) else {
                continue;
            };
            if info.bound || info.multipv == 0 || info.multipv > multi_pv {
                continue;
            }
            let Some(score) = Score::from_uci(info.cp, info.mate, white_to_move) else {
                continue;
            };

            lines.insert(
                info.multipv,
                EngineLine {
                    rank: info.multipv,
                    score,
                    depth: info.depth,
                    moves: info.pv,
                },
            );
        }

        Err(EngineError::InvalidResponse(
            "Too many lines without bestmove".to_string(),
        ))
    }

    /// Stop the current search and drain output until `bestmove`.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        if !self.searching {
            return Ok(());
        }
        self.send("stop").await?;
        self.wait_for("bestmove", MAX_SEARCH_LINES).await?;
        self.searching = false;
        Ok(())
    }

    /// Send quit command and wait for process to exit
    pub async fn shutdown(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

impl EngineHandle for StockfishEngine {
    async fn evaluate(
        &mut self,
        fen: &str,
        depth: u32,
        multi_pv: u32,
    ) -> Result<Vec<EngineLine>, EngineError> {
        self.evaluate_multipv(fen, depth, multi_pv).await
    }

    async fn cancel(&mut self) -> Result<(), EngineError> {
        self.stop().await
    }

    async fn quit(mut self) {
        self.shutdown().await;
    }
}

/// Spawns Stockfish processes with a fixed configuration.
#[derive(Debug, Clone)]
pub struct StockfishFactory {
    pub path: String,
    pub hash_mb: u32,
    pub threads: u32,
}

impl EngineFactory for StockfishFactory {
    type Handle = StockfishEngine;

    async fn spawn(&self) -> Result<StockfishEngine, EngineError> {
        StockfishEngine::new(&self.path, self.hash_mb, self.threads).await
    }
}

/// Parse a UCI info line carrying a score.
///
/// Format: "info depth X seldepth Y multipv K score cp|mate N [lowerbound|upperbound] ... pv m1 m2 ..."
/// Returns None for lines without depth or score (currmove updates, `info string`).
fn parse_info_line(line: &str) -> Option<InfoLine> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.first() != Some(&"info") || parts.get(1) == Some(&"string") {
        return None;
    }

    let mut depth: Option<u32> = None;
    let mut multipv = 1;
    let mut cp = None;
    let mut mate = None;
    let mut bound = false;
    let mut pv = Vec::new();

    let mut i = 1;
    while i < parts.len() {
        match parts[i] {
            "depth" => {
                depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "multipv" => {
                multipv = parts.get(i + 1).and_then(|v| v.parse().ok()).unwrap_or(1);
                i += 1;
            }
            "score" => {
                match parts.get(i + 1) {
                    Some(&"cp") => cp = parts.get(i + 2).and_then(|v| v.parse().ok()),
                    Some(&"mate") => mate = parts.get(i + 2).and_then(|v| v.parse().ok()),
                    _ => {}
                }
                i += 2;
            }
            "lowerbound" | "upperbound" => bound = true,
            "pv" => {
                // PV runs to the end of the line
                pv = parts[i + 1..].iter().map(|m| m.to_string()).collect();
                break;
            }
            _ => {}
        }
        i += 1;
    }

    let depth = depth?;
    if cp.is_none() && mate.is_none() {
        return None;
    }

    Some(InfoLine {
        multipv,
        depth,
        cp,
        mate,
        bound,
        pv,
    })
}
