//! The typed seam between user callables and nodes.
//!
//! Three traits cooperate so that the node factory can capture a callable's
//! signature without the user spelling it out:
//! - [`TaskArgs`] turns an argument tuple into per-slot optional storage
//!   that parents fill one slot at a time.
//! - [`SlotAt`] projects a single compile-known slot out of the tuple, so a
//!   data edge targets an exact argument position with an exact type.
//! - [`TaskFn`] is implemented for every closure or function of matching
//!   arity and erases it into the node.
//!
//! All three are implemented for arities 0 through 8.

/// Heterogeneous argument tuple of a task.
///
/// Implemented for tuples `()` through `(A0, …, A7)`. The `Partial`
/// associated type is the same tuple with every element wrapped in
/// `Option`, which is what a node stores while its parents are still
/// running.
pub trait TaskArgs: Send + Sized + 'static {
    /// Number of argument slots.
    const ARITY: usize;
    /// Per-slot optional storage, filled as parents deliver.
    type Partial: Default + Send;
    /// Assemble the full tuple once every slot is filled.
    ///
    /// Returns `None` if any slot is still empty.
    fn assemble(partial: Self::Partial) -> Option<Self>;
}

/// Compile-known projection of argument slot `SLOT` out of a tuple.
///
/// The bound `A: SlotAt<2, Value = T>` reads "the third argument of `A`
/// has type `T`"; wiring a parent whose result type differs is rejected by
/// the compiler.
pub trait SlotAt<const SLOT: usize>: TaskArgs {
    /// The type stored at this slot.
    type Value: Send + 'static;
    /// Deposit a value into the slot's storage.
    fn store(partial: &mut Self::Partial, value: Self::Value);
}

/// A callable usable as a node task.
///
/// Blanket-implemented for every `FnMut` whose parameters form the tuple
/// `A` and whose result is `R`, so `make_node(|x: i32| x + 2)` deduces
/// `A = (i32,)`, `R = i32` on its own. Closure parameters may need explicit
/// type annotations for the deduction to have something to work with.
pub trait TaskFn<A: TaskArgs, R>: Send + 'static {
    /// Apply the callable to an assembled argument tuple.
    fn invoke(&mut self, args: A) -> R;
}

impl TaskArgs for () {
    const ARITY: usize = 0;
    type Partial = ();

    fn assemble((): Self::Partial) -> Option<Self> {
        Some(())
    }
}

impl<F, R> TaskFn<(), R> for F
where
    F: FnMut() -> R + Send + 'static,
{
    fn invoke(&mut self, (): ()) -> R {
        self()
    }
}

macro_rules! impl_task_args {
    ($arity:expr => $($ty:ident @ $idx:tt),+) => {
        impl<$($ty: Send + 'static),+> TaskArgs for ($($ty,)+) {
            const ARITY: usize = $arity;
            type Partial = ($(Option<$ty>,)+);

            fn assemble(partial: Self::Partial) -> Option<Self> {
                Some(($(partial.$idx?,)+))
            }
        }

        impl<F, R, $($ty: Send + 'static),+> TaskFn<($($ty,)+), R> for F
        where
            F: FnMut($($ty),+) -> R + Send + 'static,
        {
            fn invoke(&mut self, args: ($($ty,)+)) -> R {
                self($(args.$idx),+)
            }
        }
    };
}

impl_task_args!(1 => A0 @ 0);
impl_task_args!(2 => A0 @ 0, A1 @ 1);
impl_task_args!(3 => A0 @ 0, A1 @ 1, A2 @ 2);
impl_task_args!(4 => A0 @ 0, A1 @ 1, A2 @ 2, A3 @ 3);
impl_task_args!(5 => A0 @ 0, A1 @ 1, A2 @ 2, A3 @ 3, A4 @ 4);
impl_task_args!(6 => A0 @ 0, A1 @ 1, A2 @ 2, A3 @ 3, A4 @ 4, A5 @ 5);
impl_task_args!(7 => A0 @ 0, A1 @ 1, A2 @ 2, A3 @ 3, A4 @ 4, A5 @ 5, A6 @ 6);
impl_task_args!(8 => A0 @ 0, A1 @ 1, A2 @ 2, A3 @ 3, A4 @ 4, A5 @ 5, A6 @ 6, A7 @ 7);

macro_rules! impl_slot_at {
    ($slot:tt, $value:ident => $($ty:ident),+) => {
        impl<$($ty: Send + 'static),+> SlotAt<$slot> for ($($ty,)+) {
            type Value = $value;

            fn store(partial: &mut Self::Partial, value: Self::Value) {
                partial.$slot = Some(value);
            }
        }
    };
}

impl_slot_at!(0, A0 => A0);

impl_slot_at!(0, A0 => A0, A1);
impl_slot_at!(1, A1 => A0, A1);

impl_slot_at!(0, A0 => A0, A1, A2);
impl_slot_at!(1, A1 => A0, A1, A2);
impl_slot_at!(2, A2 => A0, A1, A2);

impl_slot_at!(0, A0 => A0, A1, A2, A3);
impl_slot_at!(1, A1 => A0, A1, A2, A3);
impl_slot_at!(2, A2 => A0, A1, A2, A3);
impl_slot_at!(3, A3 => A0, A1, A2, A3);

impl_slot_at!(0, A0 => A0, A1, A2, A3, A4);
impl_slot_at!(1, A1 => A0, A1, A2, A3, A4);
impl_slot_at!(2, A2 => A0, A1, A2, A3, A4);
impl_slot_at!(3, A3 => A0, A1, A2, A3, A4);
impl_slot_at!(4, A4 => A0, A1, A2, A3, A4);

impl_slot_at!(0, A0 => A0, A1, A2, A3, A4, A5);
impl_slot_at!(1, A1 => A0, A1, A2, A3, A4, A5);
impl_slot_at!(2, A2 => A0, A1, A2, A3, A4, A5);
impl_slot_at!(3, A3 => A0, A1, A2, A3, A4, A5);
impl_slot_at!(4, A4 => A0, A1, A2, A3, A4, A5);
impl_slot_at!(5, A5 => A0, A1, A2, A3, A4, A5);

impl_slot_at!(0, A0 => A0, A1, A2, A3, A4, A5, A6);
impl_slot_at!(1, A1 => A0, A1, A2, A3, A4, A5, A6);
impl_slot_at!(2, A2 => A0, A1, A2, A3, A4, A5, A6);
impl_slot_at!(3, A3 => A0, A1, A2, A3, A4, A5, A6);
impl_slot_at!(4, A4 => A0, A1, A2, A3, A4, A5, A6);
impl_slot_at!(5, A5 => A0, A1, A2, A3, A4, A5, A6);
impl_slot_at!(6, A6 => A0, A1, A2, A3, A4, A5, A6);

impl_slot_at!(0, A0 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(1, A1 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(2, A2 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(3, A3 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(4, A4 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(5, A5 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(6, A6 => A0, A1, A2, A3, A4, A5, A6, A7);
impl_slot_at!(7, A7 => A0, A1, A2, A3, A4, A5, A6, A7);
