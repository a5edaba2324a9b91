/// Runs a closure when dropped.
///
/// The spawned loader tasks hold one of these so that an entry's in-flight
/// slot is settled even if the loader future panics; waiters then fail fast
/// instead of hanging until their timeout.
pub(crate) struct CallOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> CallOnDrop<F> {
    pub(crate) fn new(f: F) -> Self {
        CallOnDrop(Some(f))
    }
}

impl<F: FnOnce()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f()
        }
    }
}
