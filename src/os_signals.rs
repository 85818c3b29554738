//! OS signal handling for binaries embedding the supervisor.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a
//! termination signal; cancel the token passed to
//! [`Supervisor::run`](crate::Supervisor::run) when it does.
//!
//! ## Unix
//! - **SIGINT** (Ctrl-C in terminal)
//! - **SIGTERM** (systemd, Kubernetes)
//! - **SIGQUIT**
//!
//! The child process shares the terminal's process group unless it runs
//! through `sh -c`, so an interactive Ctrl-C may reach it as well.
//!
//! ## Other platforms
//! Only [`tokio::signal::ctrl_c`] is awaited.

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
