//! Cancellation tokens and the source factory used for linked cancellation.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque cancellation token. Two tokens are equal only if they are the
/// same token.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("token#{_0}")]
pub struct CancellationToken(u64);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A source whose token is cancelled when either of two tokens is.
pub trait LinkedTokenSource: fmt::Debug {
    fn token(&self) -> CancellationToken;

    /// Release the link. Calling it again is harmless.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

pub trait CancellationSourceFactory {
    fn link(
        &self,
        first: CancellationToken,
        second: CancellationToken,
    ) -> Box<dyn LinkedTokenSource>;
}

/// Factory that counts the sources it creates and how many were released.
/// Clones share their counters.
#[derive(Clone, Debug, Default)]
pub struct CountingSourceFactory {
    created: Rc<Cell<usize>>,
    disposed: Rc<Cell<usize>>,
}

impl CountingSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn disposed(&self) -> usize {
        self.disposed.get()
    }
}

impl CancellationSourceFactory for CountingSourceFactory {
    fn link(
        &self,
        first: CancellationToken,
        second: CancellationToken,
    ) -> Box<dyn LinkedTokenSource> {
        self.created.set(self.created.get() + 1);
        tracing::trace!(%first, %second, "linking cancellation tokens");
        Box::new(CountedSource {
            token: CancellationToken::new(),
            disposed: false,
            counter: self.disposed.clone(),
        })
    }
}

#[derive(Debug)]
struct CountedSource {
    token: CancellationToken,
    disposed: bool,
    counter: Rc<Cell<usize>>,
}

impl LinkedTokenSource for CountedSource {
    fn token(&self) -> CancellationToken {
        self.token
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.counter.set(self.counter.get() + 1);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
