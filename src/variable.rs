use parking_lot::Mutex;
use std::any::Any;
use std::cmp;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::lock::VersionLock;
use crate::result::StmResult;
use crate::transaction::Transaction;

type ErasedValue = Arc<dyn Any + Send + Sync>;

/// The shared, type-erased half of a [`Variable`]: the version lock and the
/// value slot it guards.
///
/// Identity (for read/write-set membership and lock ordering) is the address
/// of this block, mirroring the donor crate's `VarControlBlock`.
pub(crate) struct VariableControlBlock {
    pub(crate) lock: VersionLock,
    /// The value slot. Exclusivity while writing is established by `lock`,
    /// not by this mutex — the mutex only stands in for an atomic pointer
    /// swap on a value whose size isn't known to be pointer-width. It is
    /// held only for the instant of a clone or a replace, never across a
    /// whole transaction.
    value: Mutex<ErasedValue>,
}

impl VariableControlBlock {
    fn new(value: ErasedValue) -> Arc<VariableControlBlock> {
        Arc::new(VariableControlBlock {
            lock: VersionLock::new(),
            value: Mutex::new(value),
        })
    }

    fn address(&self) -> usize {
        std::ptr::from_ref::<VariableControlBlock>(self) as usize
    }

    pub(crate) fn read_value(&self) -> ErasedValue {
        self.value.lock().clone()
    }

    pub(crate) fn write_value(&self, value: ErasedValue) {
        *self.value.lock() = value;
    }
}

impl PartialEq for VariableControlBlock {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}
impl Eq for VariableControlBlock {}

impl Ord for VariableControlBlock {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.address().cmp(&other.address())
    }
}
impl PartialOrd for VariableControlBlock {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A shared variable participating in TL2 transactions.
///
/// `Variable` is the typesafe, cloneable handle; [`VariableControlBlock`] is
/// the shared inner state. Cloning a `Variable` gives another handle to the
/// same underlying storage (compare with `Variable::ref_eq`), the same way
/// an `Arc` clone does.
#[derive(Clone)]
pub struct Variable<T> {
    control_block: Arc<VariableControlBlock>,
    _marker: PhantomData<T>,
}

impl<T> Variable<T>
where
    T: Any + Send + Sync + Clone,
{
    /// Create a new variable holding `value`.
    pub fn new(value: T) -> Variable<T> {
        Variable {
            control_block: VariableControlBlock::new(Arc::new(value)),
            _marker: PhantomData,
        }
    }

    /// Read the variable's value without starting a transaction.
    ///
    /// Semantically equivalent to `atomically(|tx| var.load(tx))` but avoids
    /// the overhead of going through a full attempt.
    pub fn load_atomic(&self) -> T {
        (&*self.control_block.read_value() as &dyn Any)
            .downcast_ref::<T>()
            .expect("Variable<T> held a value of the wrong type")
            .clone()
    }

    /// The normal way to read a variable from inside an atomic block.
    /// Equivalent to `transaction.load(&var)`.
    pub fn load(&self, transaction: &mut Transaction) -> StmResult<T> {
        transaction.load(self)
    }

    /// The normal way to write a variable from inside an atomic block.
    /// Equivalent to `transaction.store(&var, value)`.
    pub fn store(&self, transaction: &mut Transaction, value: T) -> StmResult<()> {
        transaction.store(self, value)
    }

    /// Check whether two handles refer to the same underlying variable.
    pub fn ref_eq(this: &Variable<T>, other: &Variable<T>) -> bool {
        Arc::ptr_eq(&this.control_block, &other.control_block)
    }

    pub(crate) fn control_block(&self) -> &Arc<VariableControlBlock> {
        &self.control_block
    }

    pub(crate) fn downcast(value: ErasedValue) -> T {
        match value.downcast_ref::<T>() {
            Some(v) => v.clone(),
            None => unreachable!("Variable<T> held a value of the wrong type"),
        }
    }
}

impl<T> Default for Variable<T>
where
    T: Any + Send + Sync + Clone + Default,
{
    /// A default-constructed variable starts unlocked at version 0 holding
    /// `T::default()` as its unset sentinel (§9: "Reading an unset variable").
    fn default() -> Variable<T> {
        Variable::new(T::default())
    }
}

impl<T> Debug for Variable<T>
where
    T: Any + Send + Sync + Clone + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("Variable")
            .field("value", &self.load_atomic())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_holds_initial_value() {
        let var = Variable::new(42);
        assert_eq!(var.load_atomic(), 42);
    }

    #[test]
    fn default_starts_at_type_default() {
        let var: Variable<i32> = Variable::default();
        assert_eq!(var.load_atomic(), 0);
    }

    #[test]
    fn ref_eq_distinguishes_distinct_variables() {
        let a = Variable::new(1);
        let b = Variable::new(1);
        let c = a.clone();
        assert!(!Variable::ref_eq(&a, &b));
        assert!(Variable::ref_eq(&a, &c));
    }
}
