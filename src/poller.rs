//! 收敛轮询引擎：执行、分类、判定，然后返回、休眠或中止。
//!
//! The convergence poller.
//!
//! One loop serves every resource kind:
//!
//! 1. check the cancel signal, invoke the operation (transport errors return at once);
//! 2. classify the response: fatal returns, transient consumes budget;
//! 3. on success decode the typed snapshot and ask the predicate: converged
//!    returns that snapshot, a business failure or an unexpected state
//!    returns, pending consumes budget;
//! 4. if the budget is exhausted return [`Error::TimeoutExceeded`], otherwise
//!    sleep (racing the cancel signal), check the budget again and go to 1.
//!
//! Calls within a session are strictly sequential and the session owns all of
//! its state, so concurrent sessions need no coordination.

mod cancel;
mod session;

pub use cancel::CancelSignal;
pub use session::PollStats;

use crate::budget::{AttemptKind, Budget};
use crate::classify::{Classification, Classifier};
use crate::operation::Operation;
use crate::predicate::{ConvergencePredicate, Observed, Verdict};
use crate::recipes::Recipe;
use crate::transport::TransportError;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use session::PollSession;
use tracing::{debug, info, warn};

/// Runs poll sessions. Cheap to clone; holds only the cancel signal.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    cancel: CancelSignal,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an external cancellation token and/or deadline to every session run by this poller.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Poll `op` until `predicate` converges, a terminal failure occurs, or `budget` runs out.
    pub async fn poll_until_converged<S, O, C, P, B>(
        &self,
        op: &O,
        classifier: &C,
        predicate: &P,
        budget: B,
    ) -> Result<S>
    where
        S: DeserializeOwned,
        O: Operation + ?Sized,
        C: Classifier + ?Sized,
        P: ConvergencePredicate<S> + ?Sized,
        B: Budget,
    {
        self.poll_with_stats(op, classifier, predicate, budget)
            .await
            .map(|(state, _)| state)
    }

    /// Like [`Poller::poll_until_converged`], also returning session stats.
    pub async fn poll_with_stats<S, O, C, P, B>(
        &self,
        op: &O,
        classifier: &C,
        predicate: &P,
        mut budget: B,
    ) -> Result<(S, PollStats)>
    where
        S: DeserializeOwned,
        O: Operation + ?Sized,
        C: Classifier + ?Sized,
        P: ConvergencePredicate<S> + ?Sized,
        B: Budget,
    {
        let mut session = PollSession::new(op.describe());
        let state = self
            .drive(op, classifier, predicate, &mut budget, &mut session)
            .await?;
        Ok((state, session.stats()))
    }

    /// Issue the triggering call, then poll `observe` until converged.
    ///
    /// The trigger goes through the same classifier and budget: a transient
    /// failure retries the trigger, and a fatal one (e.g. a 400 carrying a
    /// registered business code) returns without any polling.
    pub async fn trigger_then_poll<S, T, O, C, P, B>(
        &self,
        trigger: &T,
        observe: &O,
        classifier: &C,
        predicate: &P,
        mut budget: B,
    ) -> Result<S>
    where
        S: DeserializeOwned,
        T: Operation + ?Sized,
        O: Operation + ?Sized,
        C: Classifier + ?Sized,
        P: ConvergencePredicate<S> + ?Sized,
        B: Budget,
    {
        let mut session = PollSession::new(observe.describe());
        self.trigger_phase(trigger, classifier, &mut budget, &mut session)
            .await?;
        self.drive(observe, classifier, predicate, &mut budget, &mut session)
            .await
    }

    /// Run a preconfigured recipe against `op`.
    pub async fn run<S, P, O>(&self, recipe: &Recipe<S, P>, op: &O) -> Result<S>
    where
        S: DeserializeOwned,
        P: ConvergencePredicate<S>,
        O: Operation + ?Sized,
    {
        self.run_with_stats(recipe, op).await.map(|(state, _)| state)
    }

    pub async fn run_with_stats<S, P, O>(
        &self,
        recipe: &Recipe<S, P>,
        op: &O,
    ) -> Result<(S, PollStats)>
    where
        S: DeserializeOwned,
        P: ConvergencePredicate<S>,
        O: Operation + ?Sized,
    {
        let mut budget = recipe.start_budget()?;
        let mut session = PollSession::new(recipe.name());
        let state = self
            .drive(
                op,
                recipe.classifier(),
                recipe.predicate(),
                &mut budget,
                &mut session,
            )
            .await?;
        Ok((state, session.stats()))
    }

    /// Trigger a change and wait for it using a recipe.
    pub async fn trigger_and_run<S, P, T, O>(
        &self,
        recipe: &Recipe<S, P>,
        trigger: &T,
        observe: &O,
    ) -> Result<S>
    where
        S: DeserializeOwned,
        P: ConvergencePredicate<S>,
        T: Operation + ?Sized,
        O: Operation + ?Sized,
    {
        let mut budget = recipe.start_budget()?;
        let mut session = PollSession::new(recipe.name());
        self.trigger_phase(trigger, recipe.classifier(), &mut budget, &mut session)
            .await?;
        self.drive(
            observe,
            recipe.classifier(),
            recipe.predicate(),
            &mut budget,
            &mut session,
        )
        .await
    }

    async fn trigger_phase<T, C, B>(
        &self,
        trigger: &T,
        classifier: &C,
        budget: &mut B,
        session: &mut PollSession,
    ) -> Result<()>
    where
        T: Operation + ?Sized,
        C: Classifier + ?Sized,
        B: Budget + ?Sized,
    {
        let accepted: Value = self
            .drive(trigger, classifier, &Observed, budget, session)
            .await?;
        debug!(
            session = session.id(),
            trigger = trigger.describe().as_str(),
            has_body = !accepted.is_null(),
            "change accepted"
        );
        Ok(())
    }

    async fn drive<S, O, C, P, B>(
        &self,
        op: &O,
        classifier: &C,
        predicate: &P,
        budget: &mut B,
        session: &mut PollSession,
    ) -> Result<S>
    where
        S: DeserializeOwned,
        O: Operation + ?Sized,
        C: Classifier + ?Sized,
        P: ConvergencePredicate<S> + ?Sized,
        B: Budget + ?Sized,
    {
        loop {
            self.cancel.check().map_err(|e| session.fail(e))?;

            let attempt = session.begin_attempt();
            let response = op
                .invoke()
                .await
                .map_err(|e| session.fail(Error::Transport(e)))?;
            debug!(
                session = session.id(),
                resource = session.resource(),
                attempt,
                http_status = response.status,
                "poll attempt"
            );

            let snapshot = match classifier.classify(&response) {
                Classification::FatalFailure {
                    status,
                    code,
                    message,
                } => return Err(session.fail(Error::fatal(status, code, message))),
                Classification::TransientFailure(reason) => {
                    session.record_transient(&reason);
                    None
                }
                Classification::Absent => match predicate.absent_state() {
                    Some(state) => Some(state),
                    None => {
                        return Err(session.fail(Error::fatal(response.status, None, "not found")))
                    }
                },
                Classification::Success(body) => {
                    Some(decode(body).map_err(|e| session.fail(e))?)
                }
            };

            let kind = match snapshot {
                None => AttemptKind::Transient,
                Some(state) => match predicate.evaluate(&state) {
                    Verdict::Converged => {
                        info!(
                            session = session.id(),
                            resource = session.resource(),
                            attempts = attempt,
                            duration_ms = session.elapsed().as_millis(),
                            "converged"
                        );
                        return Ok(state);
                    }
                    Verdict::BusinessFailure(message) => {
                        return Err(session.fail(Error::BusinessFailure { message }))
                    }
                    Verdict::Unexpected(message) => {
                        return Err(session.fail(Error::fatal(response.status, None, message)))
                    }
                    Verdict::Pending => {
                        session.record_pending();
                        AttemptKind::Pending
                    }
                },
            };

            budget.record_attempt(kind);
            if !budget.remaining() {
                return Err(session.timeout());
            }

            let delay = budget.next_delay();
            match kind {
                AttemptKind::Transient => warn!(
                    session = session.id(),
                    resource = session.resource(),
                    attempt,
                    attempts_left = ?budget.attempts_left(),
                    retry_in_secs = delay.as_secs_f64(),
                    "backend timeout, retrying"
                ),
                AttemptKind::Pending => debug!(
                    session = session.id(),
                    resource = session.resource(),
                    attempt,
                    retry_in_secs = delay.as_secs_f64(),
                    "not converged yet"
                ),
            }

            self.cancel
                .sleep(delay)
                .await
                .map_err(|e| session.fail(e))?;
            session.record_sleep(delay);

            // a deadline can pass during the sleep
            if !budget.remaining() {
                return Err(session.timeout());
            }
        }
    }
}

fn decode<S: DeserializeOwned>(body: Option<Value>) -> Result<S> {
    serde_json::from_value(body.unwrap_or(Value::Null))
        .map_err(|e| Error::Transport(TransportError::Decode(e)))
}

/// Poll with a default [`Poller`] (no external cancellation).
pub async fn poll_until_converged<S, O, C, P, B>(
    op: &O,
    classifier: &C,
    predicate: &P,
    budget: B,
) -> Result<S>
where
    S: DeserializeOwned,
    O: Operation + ?Sized,
    C: Classifier + ?Sized,
    P: ConvergencePredicate<S> + ?Sized,
    B: Budget,
{
    Poller::new()
        .poll_until_converged(op, classifier, predicate, budget)
        .await
}
