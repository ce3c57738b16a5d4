use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use crate::error::LoadError;

/// Produces a unit's heavy content once the unit is eligible to render.
///
/// Implemented for any `Fn() -> impl Future<Output = Result<C, LoadError>>`,
/// so a closure wrapping a lazy module fetch is enough.
pub trait ContentLoader<C>: Send + Sync {
    fn load(&self) -> BoxFuture<'static, Result<C, LoadError>>;
}

impl<C, F, Fut> ContentLoader<C> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<C, LoadError>> + Send + 'static,
{
    fn load(&self) -> BoxFuture<'static, Result<C, LoadError>> {
        self().boxed()
    }
}
