//! Derived Implementation
//!
//! A Derived node is a cached value computed from other nodes. It
//! re-evaluates only when one of the inputs it read on its last run actually
//! changed.
//!
//! # How Derived Nodes Work
//!
//! 1. On first read, the derivation runs and its result is cached.
//!
//! 2. When an input changes, the node is marked `STALE`. Nothing runs yet.
//!
//! 3. On next read, the walker checks whether any input's version moved past
//!    the version recorded on its edge, settling derived inputs first.
//!
//! 4. If so, the derivation re-runs. The node's own version only advances if
//!    the new result differs from the cached one, so consumers of an
//!    unchanged result are not re-run.
//!
//! Errors are results too: a failing derivation caches its error and hands a
//! copy to every reader until a later run succeeds.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::{Computation, Outcome, Reactive, Runtime, RuntimeId};
use crate::error::{ReactiveError, Result};
use crate::graph::walker;
use crate::graph::{NodeId, NodeKind};

type Derivation<T> = Box<dyn Fn(&Runtime) -> Result<T>>;

struct DerivedState<T> {
    compute: Derivation<T>,
    eq: Box<dyn Fn(&T, &T) -> bool>,
    /// `None` until the first run.
    value: RefCell<Option<Result<T>>>,
}

impl<T> DerivedState<T>
where
    T: Clone,
{
    fn cached(&self) -> Result<T> {
        self.value
            .borrow()
            .clone()
            .unwrap_or(Err(ReactiveError::Disposed))
    }
}

impl<T> Computation for DerivedState<T>
where
    T: Clone + 'static,
{
    fn run(&self, rt: &Runtime) -> Outcome {
        let next = (self.compute)(rt);

        let changed = match (&*self.value.borrow(), &next) {
            (Some(Ok(old)), Ok(new)) => !(self.eq)(old, new),
            (Some(Err(old)), Err(new)) => old != new,
            _ => true,
        };
        let error = next.as_ref().err().cloned();
        if changed {
            let _previous = self.value.borrow_mut().replace(next);
        }

        Outcome { changed, error }
    }
}

/// A cached value derived from other nodes.
///
/// # Example
///
/// ```
/// use trellis_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.cell(2);
///
/// let source = count.clone();
/// let doubled = rt.derived(move |rt| Ok(source.read(rt)? * 2));
/// assert_eq!(doubled.read(&rt)?, 4);
///
/// count.write(&rt, 5)?;
/// assert_eq!(doubled.read(&rt)?, 10);
/// # Ok::<(), trellis_core::ReactiveError>(())
/// ```
pub struct Derived<T> {
    id: NodeId,
    runtime: RuntimeId,
    state: Rc<DerivedState<T>>,
}

impl<T> Derived<T>
where
    T: Clone + 'static,
{
    /// Get the current value, recomputing it if an input changed, and link
    /// this node to the running consumer.
    ///
    /// Returns the cached error if the last run failed.
    pub fn read(&self, rt: &Runtime) -> Result<T> {
        rt.check_owner(self.runtime)?;
        walker::refresh(rt, self.id)?;
        rt.track(self.id);
        self.state.cached()
    }

    /// Like [`read`](Self::read), without linking.
    pub fn peek(&self, rt: &Runtime) -> Result<T> {
        rt.check_owner(self.runtime)?;
        walker::refresh(rt, self.id)?;
        self.state.cached()
    }

    pub fn dispose(&self, rt: &Runtime) -> Result<()> {
        rt.dispose(self)
    }
}

impl<T> Reactive for Derived<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn runtime_id(&self) -> RuntimeId {
        self.runtime
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runtime: self.runtime,
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("id", &self.id).finish()
    }
}

impl Runtime {
    /// Create a derived node compared with `PartialEq`.
    ///
    /// The derivation does not run until the node is first read.
    pub fn derived<T>(&self, compute: impl Fn(&Runtime) -> Result<T> + 'static) -> Derived<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.derived_with_eq(compute, <T as PartialEq>::eq)
    }

    /// Create a derived node with a custom equality. A run whose result is
    /// equal to the cached one leaves the node's version alone.
    pub fn derived_with_eq<T>(
        &self,
        compute: impl Fn(&Runtime) -> Result<T> + 'static,
        eq: impl Fn(&T, &T) -> bool + 'static,
    ) -> Derived<T>
    where
        T: Clone + 'static,
    {
        let state = Rc::new(DerivedState {
            compute: Box::new(compute),
            eq: Box::new(eq),
            value: RefCell::new(None),
        });
        let id = self.register(NodeKind::Derived, Some(state.clone() as Rc<dyn Computation>));
        Derived {
            id,
            runtime: self.id(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Status;
    use std::cell::Cell;

    fn counted<T: Clone + PartialEq + 'static>(
        rt: &Runtime,
        compute: impl Fn(&Runtime) -> Result<T> + 'static,
    ) -> (Derived<T>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let derived = rt.derived(move |rt| {
            counter.set(counter.get() + 1);
            compute(rt)
        });
        (derived, runs)
    }

    #[test]
    fn derived_is_lazy() {
        let rt = Runtime::new();
        let (derived, runs) = counted(&rt, |_| Ok(42));

        assert_eq!(runs.get(), 0);
        assert_eq!(derived.read(&rt), Ok(42));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn derived_caches_until_input_changes() {
        let rt = Runtime::new();
        let a = rt.cell(1);
        let source = a.clone();
        let (derived, runs) = counted(&rt, move |rt| Ok(source.read(rt)? + 1));

        assert_eq!(derived.read(&rt), Ok(2));
        assert_eq!(derived.read(&rt), Ok(2));
        assert_eq!(runs.get(), 1);

        a.write(&rt, 5).unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(derived.read(&rt), Ok(6));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unchanged_result_keeps_version() {
        let rt = Runtime::new();
        let a = rt.cell(4);
        let source = a.clone();
        let parity = rt.derived(move |rt| Ok(source.read(rt)? % 2));

        parity.read(&rt).unwrap();
        let version = rt.version(&parity).unwrap();

        a.write(&rt, 6).unwrap();
        parity.read(&rt).unwrap();
        assert_eq!(rt.version(&parity).unwrap(), version);

        a.write(&rt, 7).unwrap();
        assert_eq!(parity.read(&rt), Ok(1));
        assert!(rt.version(&parity).unwrap() > version);
    }

    #[test]
    fn errors_are_cached() {
        let rt = Runtime::new();
        let a = rt.cell(0);
        let source = a.clone();
        let (checked, runs) = counted(&rt, move |rt| match source.read(rt)? {
            0 => Err(ReactiveError::derivation("division by zero")),
            n => Ok(100 / n),
        });

        let failure: Result<i32> = Err(ReactiveError::derivation("division by zero"));
        assert_eq!(checked.read(&rt), failure);
        assert_eq!(checked.read(&rt), failure);
        assert_eq!(runs.get(), 1);
        assert!(rt.status(&checked).unwrap().contains(Status::HAS_ERROR));

        a.write(&rt, 4).unwrap();
        assert_eq!(checked.read(&rt), Ok(25));
        assert!(!rt.status(&checked).unwrap().contains(Status::HAS_ERROR));
    }

    #[test]
    fn peek_refreshes_without_linking() {
        let rt = Runtime::new();
        let a = rt.cell(1);
        let source = a.clone();
        let inner = rt.derived(move |rt| Ok(source.read(rt)? * 10));

        let peeked = inner.clone();
        let outer = rt.derived(move |rt| peeked.peek(rt));

        assert_eq!(outer.read(&rt), Ok(10));
        assert_eq!(rt.dependency_count(&outer), Ok(0));
        assert_eq!(rt.subscriber_count(&inner), Ok(0));
    }

    #[test]
    fn self_read_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
        let inner = slot.clone();
        let looped = rt.derived(move |rt| {
            let me = inner.borrow().clone();
            match me {
                Some(me) => me.read(rt),
                None => Ok(0),
            }
        });
        *slot.borrow_mut() = Some(looped.clone());

        assert_eq!(looped.read(&rt), Err(ReactiveError::Cycle));
        // Break the Rc loop
        slot.borrow_mut().take();
    }

    #[test]
    fn derivations_cannot_write() {
        let rt = Runtime::new();
        let a = rt.cell(1);
        let target = a.clone();
        let writer = rt.derived(move |rt| {
            target.write(rt, 2)?;
            Ok(())
        });

        assert_eq!(writer.read(&rt), Err(ReactiveError::WriteDuringDerivation));
        assert_eq!(a.peek(&rt), Ok(1));
    }

    #[test]
    fn disposed_derived_rejects_reads() {
        let rt = Runtime::new();
        let derived = rt.derived(|_| Ok(1));
        derived.read(&rt).unwrap();

        derived.dispose(&rt).unwrap();
        derived.dispose(&rt).unwrap();
        assert_eq!(derived.read(&rt), Err(ReactiveError::Disposed));
        assert_eq!(derived.peek(&rt), Err(ReactiveError::Disposed));
    }
}
