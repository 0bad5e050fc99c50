//! Cancellable on-demand queries.
//!
//! Interactive callers start a lookup in the background and keep a
//! [`QueryHandle`]. Dropping or cancelling the handle aborts the fetch, so a
//! view that is closed or replaced does not leave work running.

use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a query started with [`spawn_query`].
#[derive(Debug)]
pub struct QueryHandle<T> {
	result: oneshot::Receiver<T>,
	cancel: CancellationToken,
}

/// Run `query` on the runtime and return a handle to its result.
pub fn spawn_query<F>(query: F) -> QueryHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let (sender, result) = oneshot::channel();
	let cancel = CancellationToken::new();
	let token = cancel.clone();

	tokio::spawn(async move {
		tokio::select! {
			_ = token.cancelled() => debug!("Query cancelled"),
			output = query => {
				// the handle may be gone already
				let _ = sender.send(output);
			}
		}
	});

	QueryHandle { result, cancel }
}

impl<T> QueryHandle<T> {
	/// Abort the query. A pending [`QueryHandle::wait`] resolves to `None`.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Wait for the query, `None` if it was cancelled.
	pub async fn wait(mut self) -> Option<T> {
		(&mut self.result).await.ok()
	}
}

impl<T> Drop for QueryHandle<T> {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
