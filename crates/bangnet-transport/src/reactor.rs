//! The I/O thread: a current-thread tokio runtime that drives every socket.

use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::TransportError;

/// Name of the reactor thread, as shown in debuggers and log output.
pub const REACTOR_THREAD_NAME: &str = "bangnet-io";

/// Owns the I/O thread. Connections and servers get a [`Handle`] to it.
///
/// Dropping the reactor stops the runtime and joins the thread; every task
/// still running on it is cancelled, which closes its socket.
#[derive(Debug)]
pub struct Reactor {
    handle: Handle,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    pub fn start() -> Result<Self, TransportError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;
        let handle = runtime.handle().clone();
        let (stop, stopped) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(REACTOR_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(async {
                    // Either an explicit stop or the sender being dropped.
                    let _ = stopped.await;
                });
                tracing::debug!("reactor stopped");
            })
            .map_err(TransportError::Runtime)?;
        tracing::debug!("reactor started");

        Ok(Self {
            handle,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// A handle for spawning I/O onto the reactor.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("reactor thread panicked");
            }
        }
    }
}
