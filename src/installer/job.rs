use std::{
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
    },
    thread::{self, JoinHandle},
};

use super::{InstallError, ModelInstaller};

/// What to install and where it should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub url: String,
    pub model_key: String,
}

/// Updates sent from a background install.
#[derive(Debug)]
pub enum InstallMessage {
    Progress(u8),
    Finished(Result<PathBuf, InstallError>),
}

/// Handle to an install running on its own thread.
///
/// Dropping the handle does not stop the install; call [`InstallJob::cancel`].
pub struct InstallJob {
    rx: Receiver<InstallMessage>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InstallJob {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Block for the next message; `None` after `Finished` has been taken.
    pub fn recv(&self) -> Option<InstallMessage> {
        self.rx.recv().ok()
    }

    /// Block until the install ends, feeding progress to `on_progress`.
    pub fn wait_with<F: FnMut(u8)>(mut self, mut on_progress: F) -> Result<PathBuf, InstallError> {
        let mut finished = None;
        while let Ok(message) = self.rx.recv() {
            match message {
                InstallMessage::Progress(percent) => on_progress(percent),
                InstallMessage::Finished(result) => {
                    finished = Some(result);
                    break;
                }
            }
        }
        let joined = self.handle.take().map(|handle| handle.join());
        match (finished, joined) {
            (Some(result), _) => result,
            (None, Some(Err(_))) => Err(InstallError::Io(io::Error::other(
                "install worker panicked",
            ))),
            (None, _) => Err(InstallError::Io(io::Error::other(
                "install worker stopped without a result",
            ))),
        }
    }

    pub fn wait(self) -> Result<PathBuf, InstallError> {
        self.wait_with(|_| {})
    }
}

impl std::fmt::Debug for InstallJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallJob")
            .field("cancelled", &self.cancel.load(Ordering::Relaxed))
            .field("running", &self.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .finish()
    }
}

/// Run [`ModelInstaller::download_and_extract_zip`] on a worker thread.
///
/// The job always ends with exactly one [`InstallMessage::Finished`].
pub fn spawn_install(installer: Arc<ModelInstaller>, request: InstallRequest) -> InstallJob {
    spawn_with_cancel(installer, request, Arc::new(AtomicBool::new(false)))
}

fn spawn_with_cancel(
    installer: Arc<ModelInstaller>,
    request: InstallRequest,
    cancel: Arc<AtomicBool>,
) -> InstallJob {
    let (tx, rx) = mpsc::channel();
    let worker_cancel = Arc::clone(&cancel);
    let handle = thread::spawn(move || {
        let progress_tx = tx.clone();
        let result = installer.download_and_extract_zip(
            &request.url,
            &request.model_key,
            |percent| {
                let _ = progress_tx.send(InstallMessage::Progress(percent));
            },
            &worker_cancel,
        );
        let _ = tx.send(InstallMessage::Finished(result));
    });
    InstallJob {
        rx,
        cancel,
        handle: Some(handle),
    }
}
