//! Game Review CLI
//!
//! Reviews one game with a pool of local Stockfish processes and prints the
//! resulting `GameEvaluation` as JSON.
//!
//! Usage: game-review (--pgn FILE | --moves "e4 e5 Nf3" [--fen FEN])
//!        [--depth N] [--multi-pv N] [--workers N]
//!        [--white-elo N] [--black-elo N] [--out FILE]

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{bail, Context};
use tracing::{info, warn};

use game_review::chess_core::{build_positions, parse_pgn, Position};
use game_review::{
    CancelToken, EvaluationRequest, GameReviewer, PlayersRatings, ReviewConfig, ReviewOutcome,
};

#[derive(Debug, Default)]
struct CliArgs {
    pgn: Option<String>,
    moves: Option<String>,
    fen: Option<String>,
    depth: Option<u32>,
    multi_pv: Option<u32>,
    workers: Option<usize>,
    white_elo: Option<u32>,
    black_elo: Option<u32>,
    out: Option<String>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1).cloned();
        let number = |name: &str| -> anyhow::Result<u32> {
            value
                .as_deref()
                .with_context(|| format!("{name} needs a value"))?
                .parse()
                .with_context(|| format!("{name} expects a number"))
        };
        match flag {
            "--pgn" => cli.pgn = value.clone(),
            "--moves" => cli.moves = value.clone(),
            "--fen" => cli.fen = value.clone(),
            "--out" => cli.out = value.clone(),
            "--depth" => cli.depth = Some(number(flag)?),
            "--multi-pv" => cli.multi_pv = Some(number(flag)?),
            "--workers" => cli.workers = Some(number(flag)? as usize),
            "--white-elo" => cli.white_elo = Some(number(flag)?),
            "--black-elo" => cli.black_elo = Some(number(flag)?),
            other => bail!("unknown argument {other}"),
        }
        i += 2;
    }

    if cli.pgn.is_none() == cli.moves.is_none() {
        bail!("exactly one of --pgn or --moves is required");
    }
    Ok(cli)
}

/// Positions of the game to review plus any ratings found in its headers.
fn load_game(cli: &CliArgs) -> anyhow::Result<(Vec<Position>, PlayersRatings)> {
    if let Some(path) = &cli.pgn {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let game = parse_pgn(&text).with_context(|| format!("no moves found in {path}"))?;
        info!(
            white = game.player("White"),
            black = game.player("Black"),
            result = game.result(),
            moves = game.moves.len(),
            "Game loaded"
        );
        let positions = build_positions(game.initial_fen(), &game.moves)?;
        let ratings = PlayersRatings::new(game.rating("WhiteElo"), game.rating("BlackElo"));
        return Ok((positions, ratings));
    }

    let moves: Vec<String> = cli
        .moves
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect();
    let positions = build_positions(cli.fen.as_deref(), &moves)?;
    Ok((positions, PlayersRatings::default()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let cli = parse_args()?;

    let mut config = ReviewConfig::load()?;
    if let Some(depth) = cli.depth {
        config.depth = depth;
    }
    if let Some(multi_pv) = cli.multi_pv {
        config.multi_pv = multi_pv;
    }
    if let Some(workers) = cli.workers {
        config.workers_nb = workers;
    }
    config.validate()?;
    info!(
        stockfish_path = %config.stockfish_path,
        depth = config.depth,
        multi_pv = config.multi_pv,
        workers = config.workers_nb,
        "Review config loaded"
    );

    let (positions, mut ratings) = load_game(&cli)?;
    if cli.white_elo.is_some() {
        ratings.white = cli.white_elo;
    }
    if cli.black_elo.is_some() {
        ratings.black = cli.black_elo;
    }

    let mut reviewer = GameReviewer::new(config.stockfish_factory(), &config).await?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling review");
                cancel.cancel();
            }
        });
    }

    // Log every 10%
    let last_decile = AtomicU32::new(0);
    let progress = move |percent: f64| {
        let decile = (percent / 10.0).floor() as u32;
        if last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            info!(progress = percent.round() as u32, "Evaluation progress");
        }
    };

    let request = EvaluationRequest::new(positions, &config).with_ratings(ratings);
    let outcome = reviewer.evaluate_game(request, &progress, &cancel).await;

    info!("Shutting down Stockfish engines");
    reviewer.shutdown().await;

    let evaluation = match outcome? {
        ReviewOutcome::Completed(evaluation) => evaluation,
        ReviewOutcome::Cancelled => {
            warn!("Review cancelled, no output written");
            std::process::exit(130);
        }
    };

    let counts = evaluation.classification_counts();
    info!(
        white_accuracy = evaluation.accuracy.white,
        black_accuracy = evaluation.accuracy.black,
        white_blunders = counts.white.blunder,
        black_blunders = counts.black.blunder,
        opening = evaluation.opening.as_deref().unwrap_or("unknown"),
        "Review complete"
    );
    if let Some(elo) = &evaluation.estimated_ratings {
        info!(white = elo.white.round() as u32, black = elo.black.round() as u32, "Estimated ratings");
    }

    let json = serde_json::to_string_pretty(&evaluation)?;
    match &cli.out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {path}"))?;
            info!(path = %path, "Evaluation written");
        }
        None => println!("{json}"),
    }

    Ok(())
}
