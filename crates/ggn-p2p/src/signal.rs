use tokio::sync::watch;

/// Resolves once the flag behind `rx` is `true`, or once its sender is gone.
pub(crate) async fn wait_until_set(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
