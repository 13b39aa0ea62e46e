//! Convergence predicates.
//!
//! A predicate is a pure function over the latest typed snapshot. It never
//! performs I/O; the poller owns the loop, the predicate only judges.

use std::marker::PhantomData;

/// Outcome of evaluating a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Converged,
    /// The entity reports a terminal failure; carries its own message.
    BusinessFailure(String),
    /// The snapshot is in a state the predicate does not recognise.
    /// Surfaces as [`crate::Error::FatalRemote`] with the response status.
    Unexpected(String),
}

impl Verdict {
    pub fn from_bool(converged: bool) -> Self {
        if converged {
            Verdict::Converged
        } else {
            Verdict::Pending
        }
    }
}

pub trait ConvergencePredicate<S>: Send + Sync {
    fn evaluate(&self, snapshot: &S) -> Verdict;

    /// Snapshot that a 404 stands for, when absence is a valid observation.
    ///
    /// Returning `None` (the default) makes a 404 a fatal "not found".
    fn absent_state(&self) -> Option<S> {
        None
    }
}

impl<S, P: ConvergencePredicate<S> + ?Sized> ConvergencePredicate<S> for &P {
    fn evaluate(&self, snapshot: &S) -> Verdict {
        (**self).evaluate(snapshot)
    }

    fn absent_state(&self) -> Option<S> {
        (**self).absent_state()
    }
}

/// Closure-backed predicate, see [`predicate_fn`].
pub struct FnPredicate<S, F> {
    f: F,
    _snapshot: PhantomData<fn(&S)>,
}

/// Wrap a closure as a predicate.
///
/// ```rust
/// use control_plane_converge::predicate::{predicate_fn, ConvergencePredicate, Verdict};
///
/// let p = predicate_fn(|n: &u32| Verdict::from_bool(*n >= 3));
/// assert_eq!(p.evaluate(&1), Verdict::Pending);
/// assert_eq!(p.evaluate(&3), Verdict::Converged);
/// ```
pub fn predicate_fn<S, F>(f: F) -> FnPredicate<S, F>
where
    F: Fn(&S) -> Verdict + Send + Sync,
{
    FnPredicate {
        f,
        _snapshot: PhantomData,
    }
}

impl<S, F> ConvergencePredicate<S> for FnPredicate<S, F>
where
    F: Fn(&S) -> Verdict + Send + Sync,
{
    fn evaluate(&self, snapshot: &S) -> Verdict {
        (self.f)(snapshot)
    }
}

/// Accepts any successful observation. Used for plain reads that only need
/// transient-failure retry, and for the trigger phase of a change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observed;

impl<S> ConvergencePredicate<S> for Observed {
    fn evaluate(&self, _snapshot: &S) -> Verdict {
        Verdict::Converged
    }
}

/// Makes a 404 count as the given snapshot.
///
/// ```rust
/// use control_plane_converge::predicate::{predicate_fn, AbsentAs, ConvergencePredicate, Verdict};
///
/// let removed = AbsentAs::new(predicate_fn(|v: &Vec<u8>| Verdict::from_bool(v.is_empty())), Vec::new());
/// assert_eq!(removed.absent_state(), Some(Vec::new()));
/// ```
pub struct AbsentAs<P, S> {
    inner: P,
    absent: S,
}

impl<P, S> AbsentAs<P, S> {
    pub fn new(inner: P, absent: S) -> Self {
        Self { inner, absent }
    }
}

impl<P, S> ConvergencePredicate<S> for AbsentAs<P, S>
where
    P: ConvergencePredicate<S>,
    S: Clone + Send + Sync,
{
    fn evaluate(&self, snapshot: &S) -> Verdict {
        self.inner.evaluate(snapshot)
    }

    fn absent_state(&self) -> Option<S> {
        Some(self.absent.clone())
    }
}
