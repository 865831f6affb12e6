//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bundle_downloader::RequestQueue;
use indicatif::{ProgressBar, ProgressStyle};

use super::host::ProbeBoard;

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    queue: Arc<RequestQueue>,
    board: ProbeBoard,
    finished: Arc<AtomicUsize>,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = tokio::spawn(spinner_loop(
        queue,
        board,
        finished,
        total,
        Arc::clone(&stop),
    ));
    (Some(handle), stop)
}

async fn spinner_loop(
    queue: Arc<RequestQueue>,
    board: ProbeBoard,
    finished: Arc<AtomicUsize>,
    total: usize,
    stop: Arc<AtomicBool>,
) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    while !stop.load(Ordering::SeqCst) {
        spinner.set_message(status_line(
            finished.load(Ordering::SeqCst),
            total,
            queue.active_count(),
            queue.pending_count(),
            &board,
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
    }

    spinner.finish_and_clear();
}

fn status_line(
    done: usize,
    total: usize,
    active: usize,
    pending: usize,
    board: &ProbeBoard,
) -> String {
    let bytes = board.totals();
    let mut line = format!("[{}/{}] {active} active, {pending} queued", done.min(total), total);
    if bytes.total_bytes > 0 {
        line.push_str(&format!(
            " ({:.0}% of {} bytes)",
            bytes.fraction() * 100.0,
            bytes.total_bytes
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle_downloader::download::{TransferHandle, TransferRequest, Transport};

    #[derive(Debug)]
    struct IdleTransport;

    impl Transport for IdleTransport {
        fn start(&self, request: &TransferRequest) -> TransferHandle {
            TransferHandle::new(request.url.clone())
        }
    }

    #[test]
    fn test_status_line_without_known_sizes() {
        let line = status_line(1, 3, 2, 0, &ProbeBoard::default());
        assert_eq!(line, "[1/3] 2 active, 0 queued");
    }

    #[tokio::test]
    async fn test_spawn_progress_ui_when_disabled_returns_none_handle_and_stop_already_true() {
        let queue = RequestQueue::new(Arc::new(IdleTransport));
        let (handle, stop) = spawn_progress_ui(
            false,
            queue,
            ProbeBoard::default(),
            Arc::new(AtomicUsize::new(0)),
            1,
        );
        assert!(handle.is_none());
        assert!(stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_progress_ui_stops_on_signal() {
        let queue = RequestQueue::new(Arc::new(IdleTransport));
        let (handle, stop) = spawn_progress_ui(
            true,
            queue,
            ProbeBoard::default(),
            Arc::new(AtomicUsize::new(0)),
            1,
        );
        assert!(handle.is_some());
        stop.store(true, Ordering::SeqCst);
        let _ = handle.unwrap().await;
    }
}
