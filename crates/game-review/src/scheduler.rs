//! Game-level evaluation: fan positions out to the pool, gather results in
//! index order, report progress, honor cancellation, then classify.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use chess_core::fen::parse_position;
use chess_core::{check_follows, Position};

use crate::accuracy;
use crate::book_cache::OpeningBook;
use crate::classify::classify_positions;
use crate::config::ReviewConfig;
use crate::engine::{EngineFactory, EngineLine};
use crate::error::ReviewError;
use crate::evaluation::{
    EvaluationSettings, GameEvaluation, PlayersRatings, PositionEvaluation, ReviewOutcome,
};
use crate::pool::{WorkItem, WorkOutcome, WorkerPool};

/// Receives completion percentages in [0, 100].
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, progress: f64) {
        self(progress)
    }
}

/// Progress sink publishing into a watch channel, for observers polling from
/// another task.
pub fn progress_channel() -> (impl ProgressSink, watch::Receiver<f64>) {
    let (tx, rx) = watch::channel(0.0);
    let sink = move |progress: f64| {
        tx.send_replace(progress);
    };
    (sink, rx)
}

/// Cooperative cancellation shared between a run and whoever may abort it.
/// Once cancelled it stays cancelled; use a fresh token per run.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|c| *c).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a review run needs besides the engines.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Game order; `positions[0]` has no move, every later one does
    pub positions: Vec<Position>,
    pub depth: u32,
    pub multi_pv: u32,
    pub workers_nb: usize,
    pub players_ratings: PlayersRatings,
}

impl EvaluationRequest {
    /// Request with search settings taken from `config`.
    pub fn new(positions: Vec<Position>, config: &ReviewConfig) -> Self {
        Self {
            positions,
            depth: config.depth,
            multi_pv: config.multi_pv,
            workers_nb: config.workers_nb,
            players_ratings: PlayersRatings::default(),
        }
    }

    pub fn with_ratings(mut self, ratings: PlayersRatings) -> Self {
        self.players_ratings = ratings;
        self
    }

    fn settings(&self) -> EvaluationSettings {
        EvaluationSettings {
            depth: self.depth,
            multi_pv: self.multi_pv,
            workers_nb: self.workers_nb,
        }
    }

    /// Reject requests the pipeline cannot make sense of.
    pub fn validate(&self) -> Result<(), ReviewError> {
        if self.positions.is_empty() {
            return Err(ReviewError::MalformedInput("no positions".into()));
        }
        if self.depth == 0 || self.multi_pv == 0 || self.workers_nb == 0 {
            return Err(ReviewError::MalformedInput(
                "depth, multi_pv and workers_nb must be at least 1".into(),
            ));
        }
        for (i, position) in self.positions.iter().enumerate() {
            if position.index != i {
                return Err(ReviewError::MalformedInput(format!(
                    "position {i} carries index {}",
                    position.index
                )));
            }
            match (i, &position.played_move) {
                (0, Some(_)) => {
                    return Err(ReviewError::MalformedInput(
                        "initial position cannot have a move".into(),
                    ))
                }
                (i, None) if i > 0 => {
                    return Err(ReviewError::MalformedInput(format!("position {i} has no move")))
                }
                _ => {}
            }
            parse_position(&position.fen)
                .map_err(|e| ReviewError::MalformedInput(format!("position {i}: {e}")))?;
        }
        for pair in self.positions.windows(2) {
            check_follows(&pair[0], &pair[1]).map_err(|e| ReviewError::MalformedInput(e.to_string()))?;
        }
        Ok(())
    }
}

/// Drives reviews over a reusable pool of engines.
pub struct GameReviewer<F: EngineFactory> {
    pool: WorkerPool<F>,
    book: OpeningBook,
    max_retries: u32,
}

impl<F: EngineFactory> GameReviewer<F> {
    /// Spawn the engines and load the opening book named in `config`.
    pub async fn new(factory: F, config: &ReviewConfig) -> Result<Self, ReviewError> {
        let book = match &config.book_path {
            Some(path) => OpeningBook::load(path)?,
            None => OpeningBook::builtin(),
        };
        let pool = WorkerPool::new(factory, config.workers_nb, config.eval_timeout).await?;
        Ok(Self {
            pool,
            book,
            max_retries: config.max_retries,
        })
    }

    pub fn with_book(mut self, book: OpeningBook) -> Self {
        self.book = book;
        self
    }

    pub fn pool(&self) -> &WorkerPool<F> {
        &self.pool
    }

    /// Evaluate every position, classify the moves and summarize the game.
    ///
    /// Progress is reported as 0 first, then after every settled position.
    /// A cancelled run returns [`ReviewOutcome::Cancelled`] and leaves every
    /// engine idle. Positions whose evaluation keeps failing end up with no
    /// lines and their moves unclassified.
    pub async fn evaluate_game(
        &mut self,
        request: EvaluationRequest,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ReviewOutcome, ReviewError> {
        request.validate()?;
        progress.report(0.0);

        let settings = request.settings();
        let total = request.positions.len();

        if total == 1 {
            progress.report(100.0);
            let initial = request
                .positions
                .into_iter()
                .next()
                .ok_or_else(|| ReviewError::MalformedInput("no positions".into()))?;
            return Ok(ReviewOutcome::Completed(GameEvaluation::empty(initial, settings)));
        }
        if cancel.is_cancelled() {
            return Ok(ReviewOutcome::Cancelled);
        }

        // Also refills engines lost during an earlier run
        if self.pool.target_size() != request.workers_nb || self.pool.size() < request.workers_nb {
            self.pool.resize(request.workers_nb).await?;
        }

        let make_item = |index: usize| WorkItem {
            index,
            fen: request.positions[index].fen.clone(),
            depth: request.depth,
            multi_pv: request.multi_pv,
        };

        let mut results: Vec<Option<Vec<EngineLine>>> = vec![None; total];
        let mut settled = vec![false; total];
        let mut attempts = vec![0u32; total];
        let mut settled_count = 0usize;
        let max_retries = self.max_retries;

        info!(
            positions = total,
            depth = request.depth,
            multi_pv = request.multi_pv,
            workers = request.workers_nb,
            "Evaluating game"
        );

        let mut run = self.pool.dispatch((0..total).map(make_item).collect());

        while settled_count < total {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                outcome = run.next_outcome() => match outcome {
                    Some(outcome) => Step::Outcome(outcome),
                    None => Step::Exhausted,
                },
            };

            let outcome = match next {
                Step::Outcome(outcome) => outcome,
                Step::Cancelled => {
                    info!(settled = settled_count, total, "Review cancelled");
                    run.cancel();
                    let discarded = run.shutdown().await;
                    debug!(discarded = discarded.len(), "Cancelled run drained");
                    return Ok(ReviewOutcome::Cancelled);
                }
                Step::Exhausted => {
                    warn!(
                        remaining = total - settled_count,
                        "Engine workers exited early, leaving positions unevaluated"
                    );
                    break;
                }
            };

            let index = outcome.index();
            if index >= total || settled[index] {
                warn!(index, "Ignoring unexpected evaluation outcome");
                continue;
            }

            match outcome {
                WorkOutcome::Completed { lines, .. } => results[index] = Some(lines),
                WorkOutcome::Failed { reason, .. } => {
                    attempts[index] += 1;
                    if attempts[index] <= max_retries && run.submit(make_item(index)) {
                        warn!(index, attempt = attempts[index], reason = %reason, "Retrying position");
                        continue;
                    }
                    let err = ReviewError::PositionEvaluationFailed { index, reason };
                    warn!(error = %err, "Giving up on position");
                }
                WorkOutcome::Cancelled { .. } => {
                    warn!(index, "Position evaluation aborted");
                }
            }

            settled[index] = true;
            settled_count += 1;
            progress.report(100.0 * settled_count as f64 / total as f64);
        }

        let leftovers = run.shutdown().await;
        if !leftovers.is_empty() {
            debug!(count = leftovers.len(), "Discarded outcomes after run");
        }

        let mut evaluations: Vec<PositionEvaluation> = request
            .positions
            .into_iter()
            .zip(results)
            .map(|(position, lines)| PositionEvaluation::new(position, lines.unwrap_or_default()))
            .collect();

        classify_positions(&mut evaluations, &self.book);
        let (accuracy, estimated_ratings) = accuracy::summarize(&evaluations, &request.players_ratings);
        let opening = self.book.identify(&evaluations).map(String::from);

        info!(
            white_accuracy = accuracy.white,
            black_accuracy = accuracy.black,
            opening = opening.as_deref().unwrap_or("unknown"),
            "Game evaluated"
        );

        Ok(ReviewOutcome::Completed(GameEvaluation {
            positions: evaluations,
            accuracy,
            estimated_ratings,
            opening,
            settings,
        }))
    }

    /// Quit every engine.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

enum Step {
    Outcome(WorkOutcome),
    Cancelled,
    Exhausted,
}
