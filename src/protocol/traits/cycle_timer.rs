//! Asynchronous timer abstraction providing the periodic tick that drives
//! the supervisor's main-function cycle.

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait CycleTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(
        &'a mut self,
        millis: u32,
    ) -> impl core::future::Future<Output = ()> + 'a;
}
