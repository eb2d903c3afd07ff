//! Scoped access to the host's package-context slot.
//!
//! # Responsibility
//! - Tell a legacy init function which name it is being initialized under.
//!
//! # Invariants
//! - The slot holds a non-default value only while exactly one init call runs.
//! - The prior value is restored on every exit path, including unwinding.

/// Process-wide slot read by legacy extension init functions.
///
/// Implementations swap the slot's value and hand back whatever is needed to
/// put the previous value back. `Saved` may also own the storage backing the
/// new value, so it must outlive the call it brackets.
pub trait PackageContextSlot {
    type Saved;

    /// Stores `name` in the slot and returns the previous state.
    fn swap_in(&self, name: &str) -> Self::Saved;

    /// Puts a previously saved state back into the slot.
    fn restore(&self, saved: Self::Saved);
}

/// Runs `call` with the slot set to `name`, restoring the prior value after.
pub fn with_package_context<S, T>(slot: &S, name: &str, call: impl FnOnce() -> T) -> T
where
    S: PackageContextSlot + ?Sized,
{
    let _guard = PackageContextGuard::enter(slot, name);
    call()
}

/// Restores the saved slot value when dropped.
pub(crate) struct PackageContextGuard<'a, S: PackageContextSlot + ?Sized> {
    slot: &'a S,
    saved: Option<S::Saved>,
}

impl<'a, S: PackageContextSlot + ?Sized> PackageContextGuard<'a, S> {
    fn enter(slot: &'a S, name: &str) -> Self {
        let saved = slot.swap_in(name);
        Self {
            slot,
            saved: Some(saved),
        }
    }
}

impl<S: PackageContextSlot + ?Sized> Drop for PackageContextGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.slot.restore(saved);
        }
    }
}
