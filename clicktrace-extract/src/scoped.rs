use std::ops::Deref;

use tracing::{debug, warn};

use crate::handle::Closable;

/// Owns a page or browser for one scope.
///
/// [`Scoped::close`] releases it and reports the outcome. If the guard is
/// dropped instead (an early return, or the owning request future being
/// cancelled), the close is spawned onto the current runtime.
#[derive(Debug)]
pub struct Scoped<T: Closable> {
    inner: T,
    armed: bool,
}

impl<T: Closable> Scoped<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, armed: true }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.armed = false;
        self.inner.close().await
    }
}

impl<T: Closable> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Closable> Drop for Scoped<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = self.inner.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(target: "extract.scoped", "releasing dropped browser resource");
                runtime.spawn(async move {
                    if let Err(err) = inner.close().await {
                        warn!(target: "extract.scoped", error = %err, "deferred close failed");
                    }
                });
            }
            Err(_) => warn!(target: "extract.scoped", "dropped outside a runtime; resource left open"),
        }
    }
}
