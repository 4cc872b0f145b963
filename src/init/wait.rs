// SPDX-License-Identifier: Apache-2.0

use std::io;

use tokio::select;
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Resolves on the first SIGTERM or SIGINT.
pub async fn signal_wait() -> io::Result<()> {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}

/// Stream of SIGUSR1 deliveries, used to request a status dump.
pub fn status_signal() -> io::Result<Signal> {
    signal(SignalKind::user_defined1())
}
