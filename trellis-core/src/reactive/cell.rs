//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and is the
//! root of every path through the graph.
//!
//! # How Cells Work
//!
//! 1. When a cell is read while a derived node or reaction runs, the runtime
//!    links the cell to that consumer.
//!
//! 2. When a cell is written with a value that differs from the current one
//!    (per the cell's equality), the clock advances, the cell's version is
//!    stamped, and its direct consumers are invalidated.
//!
//! 3. Outside a batch, the write ends with a flush, so reactions have settled
//!    by the time `write` returns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::{Reactive, Runtime, RuntimeId};
use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

struct CellState<T> {
    value: RefCell<T>,
    eq: Box<dyn Fn(&T, &T) -> bool>,
}

/// A mutable reactive value.
///
/// # Example
///
/// ```
/// use trellis_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.cell(0);
///
/// count.write(&rt, 5)?;
/// assert_eq!(count.read(&rt)?, 5);
///
/// count.update(&rt, |n| n + 1)?;
/// assert_eq!(count.peek(&rt)?, 6);
/// # Ok::<(), trellis_core::ReactiveError>(())
/// ```
pub struct Cell<T> {
    id: NodeId,
    runtime: RuntimeId,
    state: Rc<CellState<T>>,
}

impl<T> Cell<T>
where
    T: Clone + 'static,
{
    /// Get the current value, linking the cell to the running consumer.
    pub fn read(&self, rt: &Runtime) -> Result<T> {
        rt.check_owner(self.runtime)?;
        rt.check_alive(self.id)?;
        rt.track(self.id);
        Ok(self.state.value.borrow().clone())
    }

    /// Get the current value without linking.
    pub fn peek(&self, rt: &Runtime) -> Result<T> {
        rt.check_owner(self.runtime)?;
        rt.check_alive(self.id)?;
        Ok(self.state.value.borrow().clone())
    }

    /// Set a new value and propagate it.
    ///
    /// Writing a value equal to the current one does nothing. Fails with
    /// [`WriteDuringDerivation`](crate::ReactiveError::WriteDuringDerivation)
    /// while a derived node is computing.
    pub fn write(&self, rt: &Runtime, value: T) -> Result<()> {
        rt.check_owner(self.runtime)?;
        rt.check_alive(self.id)?;
        rt.check_writable()?;

        if (self.state.eq)(&self.state.value.borrow(), &value) {
            return Ok(());
        }
        let _previous = std::mem::replace(&mut *self.state.value.borrow_mut(), value);
        rt.commit_write(self.id)
    }

    /// Write `f(&current)`.
    pub fn update(&self, rt: &Runtime, f: impl FnOnce(&T) -> T) -> Result<()> {
        rt.check_owner(self.runtime)?;
        rt.check_alive(self.id)?;
        let next = f(&self.state.value.borrow());
        self.write(rt, next)
    }

    /// Dispose the cell. Consumers reading it will see
    /// [`Disposed`](crate::ReactiveError::Disposed).
    pub fn dispose(&self, rt: &Runtime) -> Result<()> {
        rt.dispose(self)
    }
}

impl<T> Reactive for Cell<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn runtime_id(&self) -> RuntimeId {
        self.runtime
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runtime: self.runtime,
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell").field("id", &self.id).finish()
    }
}

impl Runtime {
    /// Create a cell compared with `PartialEq`.
    pub fn cell<T>(&self, value: T) -> Cell<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.cell_with_eq(value, <T as PartialEq>::eq)
    }

    /// Create a cell with a custom equality. Writes for which `eq(old, new)`
    /// holds are ignored.
    pub fn cell_with_eq<T>(&self, value: T, eq: impl Fn(&T, &T) -> bool + 'static) -> Cell<T>
    where
        T: Clone + 'static,
    {
        let id = self.register(NodeKind::Cell, None);
        Cell {
            id,
            runtime: self.id(),
            state: Rc::new(CellState {
                value: RefCell::new(value),
                eq: Box::new(eq),
            }),
        }
    }
}
