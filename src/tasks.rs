//! Periodic task runner.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use common::Result;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Run `unit` every `period` until `stop` flips to true.
///
/// The first unit runs immediately. Errors and panics are logged and the
/// loop carries on; a stop request lets the running unit finish.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    mut unit: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("{} task started (every {:?})", name, period);

    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        match AssertUnwindSafe(unit()).catch_unwind().await {
            Ok(Ok(())) => debug!("{} unit finished", name),
            Ok(Err(e)) => warn!("{} unit failed: {}", name, e),
            Err(panic) => error!("{} unit panicked: {}", name, panic_message(&*panic)),
        }
    }
    info!("{} task stopped", name);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn survives_errors_and_panics_until_stopped() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let handle = tokio::spawn(run_periodic("test", Duration::from_millis(5), rx, move || {
            let counter = counter.clone();
            async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(Error::Other("first".into())),
                    1 => panic!("second"),
                    _ => Ok(()),
                }
            }
        }));

        while calls.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn stops_without_running_when_already_stopped() {
        let (_tx, rx) = watch::channel(true);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        run_periodic("idle", Duration::from_millis(1), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
