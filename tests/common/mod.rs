//! Scripted engine for driving the review pipeline without Stockfish.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use game_review::chess_core::{build_positions, Position};
use game_review::{EngineError, EngineFactory, EngineHandle, EngineLine, ReviewConfig, Score};

/// What the engine answers, keyed by full FEN.
#[derive(Default)]
pub struct Script {
    pub lines: HashMap<String, Vec<EngineLine>>,
    pub failing: HashSet<String>,
    pub hanging: HashSet<String>,
    /// Extra delay for every search
    pub delay: Duration,
}

impl Script {
    pub fn set(&mut self, fen: &str, lines: Vec<EngineLine>) {
        self.lines.insert(fen.to_string(), lines);
    }

    pub fn fail(&mut self, fen: &str) {
        self.failing.insert(fen.to_string());
    }

    pub fn hang(&mut self, fen: &str) {
        self.hanging.insert(fen.to_string());
    }

    /// Scripted lines, or one pseudo-random line derived from the FEN so that
    /// unscripted positions still score deterministically.
    fn answer(&self, fen: &str, depth: u32, multi_pv: u32) -> Vec<EngineLine> {
        match self.lines.get(fen) {
            Some(lines) => lines.iter().take(multi_pv as usize).cloned().collect(),
            None => vec![EngineLine {
                rank: 1,
                score: Score::Centipawns(fen_hash(fen) as i32 % 300 - 150),
                depth,
                moves: Vec::new(),
            }],
        }
    }
}

/// Counters shared by every engine a factory spawned.
#[derive(Default)]
pub struct EngineStats {
    pub spawned: AtomicUsize,
    pub evaluations: AtomicUsize,
    pub busy: AtomicUsize,
    pub cancels: AtomicUsize,
    pub quits: AtomicUsize,
    /// FEN of every evaluation request, in arrival order
    pub requested: Mutex<Vec<String>>,
}

impl EngineStats {
    pub fn evaluations_of(&self, fen: &str) -> usize {
        self.requested
            .lock()
            .map(|r| r.iter().filter(|f| f.as_str() == fen).count())
            .unwrap_or(0)
    }
}

pub struct ScriptedEngine {
    script: Arc<Script>,
    stats: Arc<EngineStats>,
}

struct BusyGuard(Arc<EngineStats>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EngineHandle for ScriptedEngine {
    async fn evaluate(&mut self, fen: &str, depth: u32, multi_pv: u32) -> Result<Vec<EngineLine>, EngineError> {
        self.stats.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.stats.requested.lock() {
            requested.push(fen.to_string());
        }
        self.stats.busy.fetch_add(1, Ordering::SeqCst);
        let _guard = BusyGuard(Arc::clone(&self.stats));

        // Vary completion order between positions
        let jitter = Duration::from_millis(fen_hash(fen) % 4);
        tokio::time::sleep(self.script.delay + jitter).await;

        if self.script.hanging.contains(fen) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.script.failing.contains(fen) {
            return Err(EngineError::InvalidResponse("scripted failure".into()));
        }
        Ok(self.script.answer(fen, depth, multi_pv))
    }

    async fn cancel(&mut self) -> Result<(), EngineError> {
        self.stats.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn quit(self) {
        self.stats.quits.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
    pub stats: Arc<EngineStats>,
    pub broken: bool,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            stats: Arc::new(EngineStats::default()),
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::new(Script::default())
        }
    }
}

impl EngineFactory for ScriptedFactory {
    type Handle = ScriptedEngine;

    async fn spawn(&self) -> Result<ScriptedEngine, EngineError> {
        if self.broken {
            return Err(EngineError::NotFound("scripted".into()));
        }
        self.stats.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEngine {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
        })
    }
}

fn fen_hash(fen: &str) -> u64 {
    fen.bytes()
        .fold(1469598103934665603u64, |h, b| (h ^ b as u64).wrapping_mul(1099511628211))
}

pub fn line(rank: u32, cp: i32, moves: &str) -> EngineLine {
    EngineLine {
        rank,
        score: Score::Centipawns(cp),
        depth: 12,
        moves: moves.split_whitespace().map(String::from).collect(),
    }
}

pub fn positions(moves: &str) -> Vec<Position> {
    let moves: Vec<String> = moves.split_whitespace().map(String::from).collect();
    build_positions(None, &moves).expect("legal game")
}

pub fn config(workers_nb: usize) -> ReviewConfig {
    ReviewConfig {
        depth: 10,
        multi_pv: 2,
        workers_nb,
        eval_timeout: Duration::from_secs(10),
        ..ReviewConfig::default()
    }
}

/// Morphy vs. Duke Karl / Count Isouard, Paris 1858.
pub const OPERA_GAME: &str = "e4 e5 Nf3 d6 d4 Bg4 dxe5 Bxf3 Qxf3 dxe5 Bc4 Nf6 Qb3 Qe7 Nc3 c6 Bg5 b5 \
Nxb5 cxb5 Bxb5+ Nbd7 O-O-O Rd8 Rxd7 Rxd7 Rd1 Qe6 Bxd7+ Nxd7 Qb8+ Nxb8 Rd8#";
