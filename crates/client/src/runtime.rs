//! Thin cross-platform layer over task spawning and timers.
//!
//! Native targets run on tokio; the browser build runs on the JS event loop
//! through `wasm-bindgen-futures` and `gloo-timers`. Everything above this
//! module is written once against these helpers.

use std::future::Future;
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(fut);
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn sleep(duration: Duration) {
    gloo_timers::future::TimeoutFuture::new(duration.as_millis() as u32).await;
}

/// Run `fut` to completion or give up after `duration`.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn timeout<F, T>(duration: Duration, fut: F) -> Result<T, ()>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await.map_err(|_| ())
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn timeout<F, T>(duration: Duration, fut: F) -> Result<T, ()>
where
    F: Future<Output = T>,
{
    use futures_util::future::{select, Either};
    let fut = std::pin::pin!(fut);
    let limit = std::pin::pin!(sleep(duration));
    match select(fut, limit).await {
        Either::Left((value, _)) => Ok(value),
        Either::Right(((), _)) => Err(()),
    }
}
