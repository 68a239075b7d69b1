//! Exit sequencing: notify the backend, then terminate it, before the
//! host process goes away.

use crate::supervisor::Supervisor;

#[cfg(unix)]
use std::sync::Arc;

/// Best-effort teardown run once the shell decides to exit: the courtesy
/// logout call first, then the termination signal. The shell defers its
/// actual exit until this settles.
pub async fn run_shutdown(supervisor: &Supervisor) {
    supervisor.notify_logout().await;
    supervisor.stop().await;
}

/// Translate SIGINT/SIGTERM into the shutdown sequence, then exit.
///
/// Must be called from within the tokio runtime; the handler thread
/// blocks on the runtime handle captured here.
#[cfg(unix)]
pub fn install_signal_handlers(supervisor: Arc<Supervisor>) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::info;

    let runtime = tokio::runtime::Handle::current();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("received signal {sig}, shutting down");
            runtime.block_on(run_shutdown(&supervisor));
            std::process::exit(0);
        }
    });

    Ok(())
}
