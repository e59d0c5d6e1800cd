//! The capability a server loop dispatches into.

use std::future::Future;

use cortex_sdk::Result;

/// Turns one request into one response.
///
/// An `Err` is not fatal: the connection writes it back as `error: ...`
/// and the accept loop carries on.
pub trait Handler: Send + Sync + 'static {
    fn dispatch(&self, request: String) -> impl Future<Output = Result<String>> + Send;
}

impl<F, Fut> Handler for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send,
{
    fn dispatch(&self, request: String) -> impl Future<Output = Result<String>> + Send {
        (self)(request)
    }
}
