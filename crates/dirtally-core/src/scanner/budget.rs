/// Work budgets — how much a single `do_some_work` call may do.
///
/// The scheduler polls [`WorkBudget::is_exhausted`] before every unit of
/// child recursion and calls [`WorkBudget::yield_now`] at every suspension
/// point (between enumerated entries and before each recursion step), which
/// is where a host can service its own event loop.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait WorkBudget {
    /// `true` once no further recursion should start in this call.
    fn is_exhausted(&mut self) -> bool;

    /// Suspension point. The default does nothing.
    fn yield_now(&mut self) {}
}

impl<B: WorkBudget + ?Sized> WorkBudget for &mut B {
    fn is_exhausted(&mut self) -> bool {
        (**self).is_exhausted()
    }

    fn yield_now(&mut self) {
        (**self).yield_now()
    }
}

/// Never exhausted. Used for refresh, which runs to completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl WorkBudget for Unbounded {
    fn is_exhausted(&mut self) -> bool {
        false
    }
}

/// Wall-clock slice with an optional shared cancel flag.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    deadline: Instant,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl TimeBudget {
    pub fn new(slice: Duration) -> Self {
        Self {
            deadline: Instant::now() + slice,
            cancel_flag: None,
        }
    }

    /// A set flag exhausts the budget immediately.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl WorkBudget for TimeBudget {
    fn is_exhausted(&mut self) -> bool {
        if let Some(flag) = &self.cancel_flag {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        Instant::now() >= self.deadline
    }
}

/// Allows a fixed number of `is_exhausted` checks to pass.
///
/// Deterministic slicing for tests and reproducible partial scans.
#[derive(Debug, Clone, Copy)]
pub struct StepBudget {
    remaining: u64,
}

impl StepBudget {
    pub fn new(steps: u64) -> Self {
        Self { remaining: steps }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl WorkBudget for StepBudget {
    fn is_exhausted(&mut self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        false
    }
}

/// Wraps a budget and runs a host callback at every yield point.
pub struct Pumped<B, F> {
    inner: B,
    pump: F,
}

impl<B, F> Pumped<B, F>
where
    B: WorkBudget,
    F: FnMut(),
{
    pub fn new(inner: B, pump: F) -> Self {
        Self { inner, pump }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B, F> WorkBudget for Pumped<B, F>
where
    B: WorkBudget,
    F: FnMut(),
{
    fn is_exhausted(&mut self) -> bool {
        self.inner.is_exhausted()
    }

    fn yield_now(&mut self) {
        (self.pump)();
        self.inner.yield_now();
    }
}
