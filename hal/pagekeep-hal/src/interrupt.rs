//! Interrupt masking

/// Suspend and resume interrupt delivery
///
/// `suspend` returns the mask state that was active before the call so
/// `resume` can restore it exactly. A caller that already runs with
/// interrupts masked stays masked after the flash operation returns.
pub trait InterruptControl {
    /// Saved interrupt state
    type State: Copy;

    /// Mask all interrupts and return the previous state
    fn suspend(&mut self) -> Self::State;

    /// Restore the state returned by [`InterruptControl::suspend`]
    fn resume(&mut self, state: Self::State);
}

impl<T: InterruptControl + ?Sized> InterruptControl for &mut T {
    type State = T::State;

    fn suspend(&mut self) -> Self::State {
        T::suspend(self)
    }

    fn resume(&mut self, state: Self::State) {
        T::resume(self, state)
    }
}
