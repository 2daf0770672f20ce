//! Reaction Implementation
//!
//! A Reaction is a side-effecting computation that runs whenever something
//! it read changes.
//!
//! # How Reactions Work
//!
//! 1. When created, the reaction runs immediately to establish its edges.
//!
//! 2. When an input changes, the reaction is queued, not run. The queue is
//!    drained at the end of the write (or of the enclosing batch), so a
//!    reaction runs at most once per flush and only ever sees settled values.
//!
//! 3. Each run relinks what it reads; inputs it stopped reading are unlinked.
//!
//! # Differences from Derived
//!
//! - Derived nodes return a value; reactions do not.
//! - Derived nodes are lazy; reactions are eager.
//! - A derived failure is cached for readers; a reaction failure is logged
//!   and reported to the observer, and the flush carries on.
//!
//! # Cleanup
//!
//! A reaction can register callbacks with
//! [`Runtime::on_cleanup`](crate::Runtime::on_cleanup). They run before the
//! reaction re-runs and when it is disposed.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::runtime::{Computation, Outcome, Reactive, Runtime, RuntimeId};
use crate::error::Result;
use crate::graph::walker;
use crate::graph::{NodeId, NodeKind};

struct ReactionState {
    effect: Box<dyn Fn(&Runtime) -> Result<()>>,
    runs: Cell<usize>,
}

impl Computation for ReactionState {
    fn run(&self, rt: &Runtime) -> Outcome {
        self.runs.set(self.runs.get() + 1);
        Outcome {
            changed: false,
            error: (self.effect)(rt).err(),
        }
    }
}

/// A side-effecting computation that re-runs when its inputs change.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use trellis_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.cell(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (source, sink) = (count.clone(), log.clone());
/// let _reaction = rt.reaction(move |rt| {
///     sink.borrow_mut().push(source.read(rt)?);
///     Ok(())
/// })?;
///
/// count.write(&rt, 5)?;
/// assert_eq!(*log.borrow(), vec![0, 5]);
/// # Ok::<(), trellis_core::ReactiveError>(())
/// ```
pub struct Reaction {
    id: NodeId,
    runtime: RuntimeId,
    state: Rc<ReactionState>,
}

impl Reaction {
    /// Get the number of times the reaction has run.
    pub fn run_count(&self) -> usize {
        self.state.runs.get()
    }

    /// Stop the reaction: unlink its inputs and run its cleanups.
    /// Disposing twice is a no-op.
    pub fn dispose(&self, rt: &Runtime) -> Result<()> {
        rt.dispose(self)
    }
}

impl Reactive for Reaction {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn runtime_id(&self) -> RuntimeId {
        self.runtime
    }
}

impl Clone for Reaction {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runtime: self.runtime,
            state: Rc::clone(&self.state),
        }
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .finish()
    }
}

impl Runtime {
    /// Create a reaction and run it once.
    ///
    /// The first run happens inside a batch, so writes it makes are
    /// flushed together when it returns. A failure in the first run is
    /// reported like any other reaction failure; the returned error is only
    /// for the flush itself.
    pub fn reaction(&self, effect: impl Fn(&Runtime) -> Result<()> + 'static) -> Result<Reaction> {
        let state = Rc::new(ReactionState {
            effect: Box::new(effect),
            runs: Cell::new(0),
        });
        let id = self.register(NodeKind::Reaction, Some(state.clone() as Rc<dyn Computation>));

        self.batch(|rt| walker::refresh(rt, id))?;

        Ok(Reaction {
            id,
            runtime: self.id(),
            state,
        })
    }
}
