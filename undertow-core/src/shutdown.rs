//! Signal driven shutdown.
//!
//! The process terminates only through this module: the first termination
//! signal closes the engine once and broadcasts shutdown to every task that
//! observes a [`ShutdownSignal`].

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::{CloseOutcome, EngineHandle};

/// Process termination signals that trigger shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    Interrupt,
    Hangup,
    Terminate,
    Quit,
}

impl TerminationSignal {
    /// Every signal that triggers shutdown.
    pub const ALL: [TerminationSignal; 4] = [
        TerminationSignal::Interrupt,
        TerminationSignal::Hangup,
        TerminationSignal::Terminate,
        TerminationSignal::Quit,
    ];

    #[cfg(unix)]
    fn signal_kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            Self::Interrupt => SignalKind::interrupt(),
            Self::Hangup => SignalKind::hangup(),
            Self::Terminate => SignalKind::terminate(),
            Self::Quit => SignalKind::quit(),
        }
    }
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Hangup => write!(f, "SIGHUP"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Quit => write!(f, "SIGQUIT"),
        }
    }
}

/// Creates a connected shutdown trigger and signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, ShutdownSignal { receiver })
}

/// Broadcasts shutdown to every subscribed task.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Marks the process as shutting down. Repeated calls are harmless.
    pub fn fire(&self) {
        self.sender.send_replace(true);
    }

    /// Returns a new observer of this trigger.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn is_fired(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Observer side of the shutdown broadcast.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered.
    ///
    /// Returns immediately if it already was. Never resolves if the trigger is
    /// dropped without firing.
    pub async fn recv(&mut self) {
        let fired = self.receiver.wait_for(|fired| *fired).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Forwards OS termination signals into a channel.
///
/// # Errors
/// - `std::io::Error` - A signal handler could not be registered
#[cfg(unix)]
pub fn listen_for_signals() -> std::io::Result<mpsc::Receiver<TerminationSignal>> {
    let (sender, receiver) = mpsc::channel(TerminationSignal::ALL.len());

    for kind in TerminationSignal::ALL {
        let mut stream = tokio::signal::unix::signal(kind.signal_kind())?;
        let sender = sender.clone();

        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if sender.send(kind).await.is_err() {
                    break;
                }
            }
        });
    }

    Ok(receiver)
}

/// Forwards Ctrl+C into a channel on platforms without Unix signals.
///
/// # Errors
/// Infallible on this platform; registration failures surface in the task.
#[cfg(not(unix))]
pub fn listen_for_signals() -> std::io::Result<mpsc::Receiver<TerminationSignal>> {
    let (sender, receiver) = mpsc::channel(1);

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if sender.send(TerminationSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    Ok(receiver)
}

/// Closes the engine on the first termination signal.
///
/// Single-fire: later signals are left unread because the process exits
/// right after [`ShutdownCoordinator::run`] returns.
pub struct ShutdownCoordinator {
    engine: EngineHandle,
    trigger: ShutdownTrigger,
}

impl ShutdownCoordinator {
    pub fn new(engine: EngineHandle, trigger: ShutdownTrigger) -> Self {
        Self { engine, trigger }
    }

    /// Waits for a termination signal, then closes the engine and broadcasts
    /// shutdown.
    ///
    /// Pends forever if the signal source goes away without delivering one.
    pub async fn run(self, mut signals: mpsc::Receiver<TerminationSignal>) -> TerminationSignal {
        let Some(signal) = signals.recv().await else {
            warn!("Signal source closed; shutdown only possible by killing the process");
            return std::future::pending().await;
        };

        info!(%signal, "Exiting...");

        match self.engine.close().await {
            Ok(CloseOutcome::Closed) => debug!("Engine closed"),
            Ok(CloseOutcome::AlreadyClosed) => debug!("Engine was already closed"),
            Err(e) => error!("Failed to close engine cleanly: {e}"),
        }

        self.trigger.fire();
        signal
    }
}
