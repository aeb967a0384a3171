//! Build the binary opening book from PGN files.
//!
//! Usage: build-book <pgn_dir> [--min-games 100] [--max-ply 30] [--min-elo 2200] [--out data/opening_book.bin]
//!
//! Point `BOOK_PATH` at the output to let reviews label book moves beyond the
//! built-in named openings.

use std::fs::{self, File};
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use pgn_reader::{RawTag, Reader, SanPlus, Visitor};
use shakmaty::{Chess, Position};
use tracing::{info, warn};

use game_review::book_cache::{save_book, BookMoves};
use game_review::chess_core::fen::{position_key, to_fen};

#[derive(Debug)]
struct BookOptions {
    pgn_dir: String,
    min_games: i32,
    max_ply: usize,
    min_elo: u16,
    out: PathBuf,
}

impl BookOptions {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let Some(pgn_dir) = args.first().filter(|a| !a.starts_with("--")) else {
            bail!("usage: build-book <pgn_dir> [--min-games N] [--max-ply N] [--min-elo N] [--out FILE]");
        };
        let mut options = Self {
            pgn_dir: pgn_dir.clone(),
            min_games: 100,
            max_ply: 30,
            min_elo: 2200,
            out: PathBuf::from("data/opening_book.bin"),
        };

        for pair in args[1..].chunks(2) {
            let [flag, value] = pair else {
                bail!("{} needs a value", pair[0]);
            };
            let bad = || format!("{flag} expects a number, got {value:?}");
            match flag.as_str() {
                "--min-games" => options.min_games = value.parse().with_context(bad)?,
                "--max-ply" => options.max_ply = value.parse().with_context(bad)?,
                "--min-elo" => options.min_elo = value.parse().with_context(bad)?,
                "--out" => options.out = PathBuf::from(value),
                other => bail!("unknown argument {other}"),
            }
        }
        Ok(options)
    }
}

#[derive(Clone, Copy)]
enum Outcome {
    White,
    Draw,
    Black,
}

/// Header fields a game needs to qualify.
#[derive(Default)]
struct Header {
    ratings: [Option<u16>; 2],
    outcome: Option<Outcome>,
}

/// Replay of one qualifying game.
struct Replay {
    board: Chess,
    outcome: Outcome,
    ply: usize,
}

/// Accumulates per-position move statistics over every qualifying game.
struct BookBuilder {
    moves: BookMoves,
    max_ply: usize,
    min_elo: u16,
    accepted: u64,
}

impl BookBuilder {
    fn new(max_ply: usize, min_elo: u16) -> Self {
        Self {
            moves: BookMoves::new(),
            max_ply,
            min_elo,
            accepted: 0,
        }
    }

    fn qualifies(&self, header: &Header) -> bool {
        header
            .ratings
            .iter()
            .all(|r| r.is_some_and(|elo| elo >= self.min_elo))
    }

    fn record(&mut self, replay: &Replay, san: String) {
        let stats = self
            .moves
            .entry(position_key(&to_fen(&replay.board)))
            .or_default()
            .entry(san)
            .or_default();
        stats.games += 1;
        match replay.outcome {
            Outcome::White => stats.white_wins += 1,
            Outcome::Draw => stats.draws += 1,
            Outcome::Black => stats.black_wins += 1,
        }
    }

    /// Keep moves seen in at least `min_games` games and the positions that
    /// still have one.
    fn finish(mut self, min_games: i32) -> BookMoves {
        self.moves.retain(|_, moves| {
            moves.retain(|_, stats| stats.games >= min_games);
            !moves.is_empty()
        });
        self.moves
    }
}

impl Visitor for BookBuilder {
    type Tags = Header;
    type Movetext = Replay;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<(), Header> {
        ControlFlow::Continue(Header::default())
    }

    fn tag(&mut self, header: &mut Header, name: &[u8], value: RawTag<'_>) -> ControlFlow<()> {
        let value = value.decode_utf8_lossy();
        match name {
            b"WhiteElo" => header.ratings[0] = value.parse().ok(),
            b"BlackElo" => header.ratings[1] = value.parse().ok(),
            b"Result" => {
                header.outcome = match value.as_ref() {
                    "1-0" => Some(Outcome::White),
                    "1/2-1/2" => Some(Outcome::Draw),
                    "0-1" => Some(Outcome::Black),
                    _ => None,
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, header: Header) -> ControlFlow<(), Replay> {
        // Unfinished or under-rated games are skipped entirely
        match header.outcome {
            Some(outcome) if self.qualifies(&header) => {
                self.accepted += 1;
                ControlFlow::Continue(Replay {
                    board: Chess::default(),
                    outcome,
                    ply: 0,
                })
            }
            _ => ControlFlow::Break(()),
        }
    }

    fn san(&mut self, replay: &mut Replay, san_plus: SanPlus) -> ControlFlow<()> {
        if replay.ply >= self.max_ply {
            return ControlFlow::Continue(());
        }
        match san_plus.san.to_move(&replay.board) {
            Ok(mv) => {
                self.record(replay, san_plus.san.to_string());
                replay.board.play_unchecked(mv);
                replay.ply += 1;
            }
            // Illegal move: nothing after it can be trusted
            Err(_) => replay.ply = self.max_ply,
        }
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _replay: Replay) {}
}

fn read_file(builder: &mut BookBuilder, path: &Path) -> anyhow::Result<u64> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = Reader::new(BufReader::new(file));
    let mut games = 0u64;
    while reader.read_game(builder)?.is_some() {
        games += 1;
        if games % 50_000 == 0 {
            info!(
                games,
                accepted = builder.accepted,
                positions = builder.moves.len(),
                "Scanning {}",
                path.display()
            );
        }
    }
    Ok(games)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = BookOptions::parse(&args)?;
    info!(?options, "Building opening book");

    let pattern = format!("{}/*.pgn", options.pgn_dir);
    let files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
    if files.is_empty() {
        bail!("no PGN files found in {}", options.pgn_dir);
    }

    let mut builder = BookBuilder::new(options.max_ply, options.min_elo);
    let start = Instant::now();
    let mut scanned = 0u64;
    for path in &files {
        match read_file(&mut builder, path) {
            Ok(games) => {
                scanned += games;
                info!(file = %path.display(), games, "File done");
            }
            Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable file"),
        }
    }
    info!(
        scanned,
        accepted = builder.accepted,
        positions = builder.moves.len(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "Parsing complete"
    );

    let book = builder.finish(options.min_games);
    let kept_moves: usize = book.values().map(|m| m.len()).sum();

    if let Some(parent) = options.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    save_book(&options.out, &book)?;

    let size_kb = fs::metadata(&options.out)?.len() / 1024;
    info!(
        positions = book.len(),
        moves = kept_moves,
        size_kb,
        out = %options.out.display(),
        "Opening book written"
    );
    Ok(())
}
