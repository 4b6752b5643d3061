//! Stream reconciliation engine.
//!
//! Folds the typed event stream of one turn into the message store:
//! thinking snapshots are revealed sentence-by-sentence under the pacing
//! policy, content deltas are appended exactly as delivered, and finish,
//! error, transport fault and stream exhaustion all funnel into a single
//! terminal state.

use crate::error::ChatError;
use crate::models::{ChatMessage, Role, StreamEvent};
use crate::settings::ChatSettings;
use crate::store::{MessageStore, MessageUpdate};
use crate::stream::classify;
use futures_util::{Stream, StreamExt};
use log::{debug, error, info};
use std::future::Future;
use std::time::Duration;

/// Default delay between revealed thinking segments
pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(40);

/// Engine state over the life of one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingFirstEvent,
    StreamingThinking,
    StreamingContent,
    Finished,
}

/// Terminal result of one reconciled turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream finished, explicitly or by exhaustion
    Completed { reason: Option<String> },
    /// The stream terminated with a backend or transport error; partial
    /// output stays in the store
    Failed { message: String },
    /// The store was cleared mid-turn and every later event was discarded
    Abandoned,
}

/// Receives store writes and terminal errors during a turn.
///
/// This is the seam the CLI uses for incremental printing and what tests
/// use to observe the reveal chain.
pub trait TurnObserver {
    /// Called after each store write with the current assistant message.
    fn on_update(&mut self, _message: &ChatMessage) {}
    /// Called at most once, when the turn terminates with an error.
    fn on_error(&mut self, _error: &ChatError) {}
}

/// Pacing policy turning a full thinking snapshot into timed prefix writes.
///
/// Prefix boundaries sit after runs of sentence-ending punctuation; text
/// without any terminal punctuation is a single segment. The last
/// boundary always equals the full length, so the final write is
/// byte-identical to the snapshot no matter how segmentation went.
#[derive(Debug, Clone)]
pub struct SentencePacing {
    pub delay: Duration,
}

impl Default for SentencePacing {
    fn default() -> Self {
        Self {
            delay: DEFAULT_REVEAL_DELAY,
        }
    }
}

impl SentencePacing {
    /// Zero-delay pacing for tests and non-interactive callers
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    /// Byte lengths of the successive prefixes to reveal, strictly increasing.
    pub fn prefix_lengths(&self, text: &str) -> Vec<usize> {
        let mut lengths = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !is_terminal(c) {
                continue;
            }
            // Fold a run like "?!" or "..." into one boundary
            if let Some(&(_, next)) = chars.peek() {
                if is_terminal(next) {
                    continue;
                }
            }
            lengths.push(i + c.len_utf8());
        }
        if lengths.last() != Some(&text.len()) {
            lengths.push(text.len());
        }
        lengths
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Per-turn scratch state; dropped when the turn ends
#[derive(Debug, Default)]
struct TurnAccumulator {
    thinking: String,
    content: String,
}

enum WriteOutcome {
    Written,
    /// The store epoch moved or the target message vanished; the turn is stale
    Stale,
}

/// Orchestrates one turn: placeholder creation, event consumption,
/// pacing, and termination.
///
/// At most one turn may be active per engine. The engine is the only
/// writer of the store while a turn runs; consumers read snapshots.
pub struct ReconcileEngine {
    store: MessageStore,
    pacing: SentencePacing,
    phase: TurnPhase,
}

impl ReconcileEngine {
    pub fn new(store: MessageStore) -> Self {
        Self::with_pacing(store, SentencePacing::default())
    }

    pub fn with_pacing(store: MessageStore, pacing: SentencePacing) -> Self {
        Self {
            store,
            pacing,
            phase: TurnPhase::Idle,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// True between turn start and the terminal state
    pub fn turn_active(&self) -> bool {
        matches!(
            self.phase,
            TurnPhase::AwaitingFirstEvent | TurnPhase::StreamingThinking | TurnPhase::StreamingContent
        )
    }

    /// True while the thinking channel is being revealed
    pub fn thinking_active(&self) -> bool {
        self.phase == TurnPhase::StreamingThinking
    }

    /// True while content deltas are being applied
    pub fn content_active(&self) -> bool {
        self.phase == TurnPhase::StreamingContent
    }

    /// Resets an engine whose previous `run_turn` future was dropped mid-turn.
    ///
    /// Cancellation already stopped all writes and pacing; this only
    /// clears the turn-in-progress flag so a new turn can start.
    pub fn abort_turn(&mut self) {
        if self.turn_active() {
            info!("Abandoning cancelled turn");
            self.phase = TurnPhase::Finished;
        }
    }

    /// Runs one full turn.
    ///
    /// Appends the user message and the assistant placeholder, snapshots
    /// the settings, opens the stream through `open`, and reconciles
    /// events until a terminal state. Returns `ChatError::Logic` if a
    /// turn is already in progress.
    pub async fn run_turn<S, F, Fut, O>(
        &mut self,
        user_text: &str,
        settings: &ChatSettings,
        open: F,
        observer: &mut O,
    ) -> Result<TurnOutcome, ChatError>
    where
        S: Stream<Item = Result<String, ChatError>> + Unpin,
        F: FnOnce(ChatSettings) -> Fut,
        Fut: Future<Output = Result<S, ChatError>>,
        O: TurnObserver,
    {
        if self.turn_active() {
            return Err(ChatError::Logic("a turn is already in progress".to_string()));
        }
        settings.validate()?;

        // Later settings edits must not affect this turn
        let snapshot = settings.clone();

        self.phase = TurnPhase::AwaitingFirstEvent;
        let epoch = self.store.epoch();
        self.store.append(ChatMessage::new(Role::User, user_text));
        self.store.append(ChatMessage::new(Role::Assistant, ""));

        let mut acc = TurnAccumulator::default();

        let outcome = match open(snapshot).await {
            Ok(lines) => self.consume(lines, epoch, &mut acc, observer).await,
            Err(e) => {
                // Transport fault before any frame arrived
                error!("{}", e);
                observer.on_error(&e);
                TurnOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        // One final write of both accumulators so the stored record always
        // reflects the last known values; idempotent if nothing changed.
        if outcome != TurnOutcome::Abandoned {
            self.write(
                epoch,
                MessageUpdate {
                    content: Some(acc.content.clone()),
                    thinking: Some(acc.thinking.clone()),
                },
                observer,
            );
        }

        self.phase = TurnPhase::Finished;
        debug!("Turn finished: {:?}", outcome);
        Ok(outcome)
    }

    async fn consume<S, O>(
        &mut self,
        mut lines: S,
        epoch: u64,
        acc: &mut TurnAccumulator,
        observer: &mut O,
    ) -> TurnOutcome
    where
        S: Stream<Item = Result<String, ChatError>> + Unpin,
        O: TurnObserver,
    {
        while let Some(item) = lines.next().await {
            let line = match item {
                Ok(line) => line,
                Err(e) => {
                    // Transport fault mid-stream; keep partial output
                    error!("{}", e);
                    observer.on_error(&e);
                    return TurnOutcome::Failed {
                        message: e.to_string(),
                    };
                }
            };

            let event = match classify(&line) {
                Some(event) => event,
                None => continue,
            };

            match event {
                StreamEvent::Thinking(full) => {
                    self.phase = TurnPhase::StreamingThinking;
                    if !self.reveal_thinking(&full, epoch, acc, observer).await {
                        return TurnOutcome::Abandoned;
                    }
                }
                StreamEvent::ContentDelta(fragment) => {
                    self.phase = TurnPhase::StreamingContent;
                    if fragment.is_empty() {
                        continue;
                    }
                    acc.content.push_str(&fragment);
                    let update = MessageUpdate {
                        content: Some(acc.content.clone()),
                        ..MessageUpdate::default()
                    };
                    if let WriteOutcome::Stale = self.write(epoch, update, observer) {
                        return TurnOutcome::Abandoned;
                    }
                }
                StreamEvent::Finish { reason } => {
                    return TurnOutcome::Completed { reason };
                }
                StreamEvent::Error(message) => {
                    let err = ChatError::Backend(message.clone());
                    error!("{}", err);
                    observer.on_error(&err);
                    return TurnOutcome::Failed { message };
                }
            }
        }

        // Stream exhausted without an explicit finish frame; treated as an
        // implicit finish, not an error
        TurnOutcome::Completed { reason: None }
    }

    /// Reveals a full thinking snapshot prefix by prefix.
    ///
    /// Returns false when the turn went stale and must be abandoned.
    async fn reveal_thinking<O: TurnObserver>(
        &self,
        full: &str,
        epoch: u64,
        acc: &mut TurnAccumulator,
        observer: &mut O,
    ) -> bool {
        for len in self.pacing.prefix_lengths(full) {
            // A re-emitted snapshot only reveals text beyond what is visible
            if len <= acc.thinking.len() {
                continue;
            }
            acc.thinking.clear();
            acc.thinking.push_str(&full[..len]);
            let update = MessageUpdate {
                thinking: Some(acc.thinking.clone()),
                ..MessageUpdate::default()
            };
            if let WriteOutcome::Stale = self.write(epoch, update, observer) {
                return false;
            }
            if !self.pacing.delay.is_zero() && len < full.len() {
                tokio::time::sleep(self.pacing.delay).await;
            }
        }

        // Guard against truncation from segmentation edge cases: the final
        // value must be byte-identical to the received snapshot
        if acc.thinking != full && full.len() >= acc.thinking.len() {
            acc.thinking.clear();
            acc.thinking.push_str(full);
            let update = MessageUpdate {
                thinking: Some(acc.thinking.clone()),
                ..MessageUpdate::default()
            };
            if let WriteOutcome::Stale = self.write(epoch, update, observer) {
                return false;
            }
        }
        true
    }

    /// Writes through to the store unless the turn has gone stale.
    ///
    /// A cleared store is not an error: the turn's events are discarded
    /// silently per the store contract.
    fn write<O: TurnObserver>(
        &self,
        epoch: u64,
        update: MessageUpdate,
        observer: &mut O,
    ) -> WriteOutcome {
        if self.store.epoch() != epoch {
            debug!("Store cleared mid-turn; discarding write");
            return WriteOutcome::Stale;
        }
        match self.store.update_last(update) {
            Ok(()) => {
                if let Some(last) = self.store.last() {
                    observer.on_update(&last);
                }
                WriteOutcome::Written
            }
            Err(e) => {
                // The target message vanished without an epoch bump; treat
                // the turn as stale rather than crash the stream loop
                error!("{}", e);
                WriteOutcome::Stale
            }
        }
    }
}
