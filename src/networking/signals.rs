use tokio::signal;
use tracing::warn;

#[cfg(unix)]
pub async fn signal_for_shutdown() {
    let mut terminate_signal = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(terminate_signal) => terminate_signal,
        Err(err) => {
            warn!("error setting up terminate signal: {}", err);
            signal::ctrl_c().await.ok();
            return;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => (),
        _ = terminate_signal.recv() => (),
    }
}

#[cfg(not(unix))]
pub async fn signal_for_shutdown() {
    signal::ctrl_c().await.ok();
}
