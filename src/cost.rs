//! Cost evaluation — assigns a cost to a value when the caller didn't.
//!
//! `insert` accepts an explicit cost.  Passing `cost = 0` defers the
//! decision: the write pipeline invokes the configured [`Coster`] on the
//! value before asking the policy to admit it.  Costs are in whatever
//! units the caller chose for `max_cost` (entry counts, bytes, ...).

/// Computes the cost of a value.
pub trait Coster<V>: Send + Sync + 'static {
    fn cost(&self, value: &V) -> i64;
}

/// A [`Coster`] backed by a closure.
///
/// Created via [`CacheBuilder::coster_fn`](crate::CacheBuilder::coster_fn).
pub struct FnCoster<F>(pub F);

impl<V, F> Coster<V> for FnCoster<F>
where
    F: Fn(&V) -> i64 + Send + Sync + 'static,
{
    #[inline]
    fn cost(&self, value: &V) -> i64 {
        (self.0)(value)
    }
}
