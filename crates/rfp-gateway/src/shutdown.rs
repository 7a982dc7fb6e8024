use tokio::sync::watch;

/// Resolves once `true` has been published on the channel, or once every
/// sender is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Synchronous check for blocking threads.
pub fn is_shutdown(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resolves_on_signal_and_on_sender_drop() {
        let (tx, mut rx) = watch::channel(false);
        assert!(!is_shutdown(&rx));
        let waiter = tokio::spawn(async move {
            wait_for_shutdown(&mut rx).await;
            rx
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        tx.send(true).unwrap();
        let rx = waiter.await.unwrap();
        assert!(is_shutdown(&rx));

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        wait_for_shutdown(&mut rx).await;
        assert!(is_shutdown(&rx));
    }
}
