//! Bounded wait primitive

/// Blocking wait with an upper bound
///
/// The driver only relies on this returning after roughly `bound`
/// time units; it always re-reads the hardware condition afterwards.
pub trait BusyWait {
    /// Block for approximately `bound` time units (milliseconds on hardware)
    fn wait_with_timeout(&mut self, bound: u32);
}

impl<T: BusyWait + ?Sized> BusyWait for &mut T {
    fn wait_with_timeout(&mut self, bound: u32) {
        T::wait_with_timeout(self, bound)
    }
}
