//! Progress UI (spinner) for the fetch phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    fetched: Arc<AtomicUsize>,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(fetched, total, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    fetched: Arc<AtomicUsize>,
    total: usize,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let done = fetched.load(Ordering::Relaxed);
            spinner.set_message(format!("[{}/{}] Fetching articles...", done.min(total), total));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::spawn_progress_ui;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn spawn_progress_ui_when_disabled_returns_none_handle_and_stop_already_true() {
        let (handle, stop) = spawn_progress_ui(false, Arc::new(AtomicUsize::new(0)), 1);

        assert!(handle.is_none());
        assert!(stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawn_progress_ui_when_enabled_stops_on_signal() {
        let fetched = Arc::new(AtomicUsize::new(0));
        let (handle, stop) = spawn_progress_ui(true, Arc::clone(&fetched), 2);

        assert!(handle.is_some());
        assert!(!stop.load(Ordering::SeqCst));

        fetched.store(2, Ordering::Relaxed);
        stop.store(true, Ordering::SeqCst);
        handle.unwrap().await.unwrap();
    }
}
