use std::future::Future;

use parking_lot::Mutex;

/// Result of an optimistic update.
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// `apply` decided there was nothing to change.
    Skipped,
    Committed(T),
    /// Persistence failed and the local change was undone.
    Reverted(E),
}

/// Apply a tentative change to local state, persist it, and undo it if the
/// write fails.
///
/// `apply` runs under the lock and returns a description of the change (or
/// `None` to skip). The lock is released before `persist` is awaited, so other
/// readers see the tentative state in the meantime. `revert` receives the same
/// change description when the write is rejected.
pub async fn commit_or_revert<S, C, T, E, P, Fut>(
    state: &Mutex<S>,
    apply: impl FnOnce(&mut S) -> Option<C>,
    persist: P,
    revert: impl FnOnce(&mut S, C),
) -> Outcome<T, E>
where
    C: Clone,
    P: FnOnce(C) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let Some(change) = apply(&mut state.lock()) else {
        return Outcome::Skipped;
    };

    match persist(change.clone()).await {
        Ok(value) => Outcome::Committed(value),
        Err(e) => {
            revert(&mut state.lock(), change);
            Outcome::Reverted(e)
        }
    }
}
