//! Polling acquisition of a single forecast file.
//!
//! The producer publishes forecast hours one after the other, so a file we
//! ask for may not exist yet. [`FileAcquirer::acquire`] keeps polling until
//! the local copy has the same size as the remote one, or until the remote
//! copy disappears while we hold a local one (the run was retired upstream).
//!
//! Each round trip:
//!
//! 1. With a local file present, probe the remote. Missing means retired,
//!    a matching size means done, a different size falls through.
//! 2. Probe again. If published, download over the local file and start
//!    over, so the new copy is size checked like any other. If not
//!    published, wait [`RetryPolicy::absent_interval`].
//!
//! Any fault waits [`RetryPolicy::fault_interval`] and starts over.

use std::path::Path;
use std::sync::Arc;

use crate::error::{FaultClass, FetchError};
use crate::retry::RetryPolicy;
use crate::run::AcquisitionTask;
use crate::store::{Remote, RemoteProbe};

/// How an acquisition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local and remote sizes agree.
    Verified { bytes: u64 },
    /// A local copy exists and the remote no longer serves the file.
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFileState {
    Missing,
    Present { len: u64 },
}

pub async fn local_state(path: &Path) -> Result<LocalFileState, FetchError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(LocalFileState::Present { len: meta.len() }),
        Ok(_) => Ok(LocalFileState::Missing),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalFileState::Missing),
        Err(e) => Err(e.into()),
    }
}

enum Step {
    Resolved(Resolution),
    Downloaded(u64),
    NotYetAvailable,
}

pub struct FileAcquirer<R> {
    remote: Arc<R>,
    policy: RetryPolicy,
}

impl<R> Clone for FileAcquirer<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            policy: self.policy,
        }
    }
}

impl<R: Remote> FileAcquirer<R> {
    pub fn new(remote: Arc<R>, policy: RetryPolicy) -> Self {
        Self { remote, policy }
    }

    /// Runs until the task resolves. There is no attempt limit and no
    /// deadline; callers that need one wrap this future in a timeout.
    pub async fn acquire(&self, task: &AcquisitionTask) -> Resolution {
        let name = task.file_name();
        log::debug!("processing {}", name);

        loop {
            match self.step(task).await {
                Ok(Step::Resolved(resolution)) => return resolution,
                Ok(Step::Downloaded(bytes)) => {
                    log::info!("{}: downloaded {} bytes, verifying", name, bytes);
                }
                Ok(Step::NotYetAvailable) => {
                    let delay = self.policy.absent_delay();
                    log::debug!("{}: not yet available, next check in {:?}", name, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let delay = self.policy.fault_delay();
                    match e.class() {
                        FaultClass::Transient => {
                            log::warn!("{}: {}, retrying in {:?}", name, e, delay)
                        }
                        FaultClass::Unexpected => {
                            log::error!("{}: unexpected error: {}, retrying in {:?}", name, e, delay)
                        }
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn step(&self, task: &AcquisitionTask) -> Result<Step, FetchError> {
        let name = task.file_name();

        if let LocalFileState::Present { len } = local_state(task.local_path()).await? {
            log::debug!("{}: found local copy of {} bytes", name, len);

            match self.remote.probe(task.location()).await? {
                RemoteProbe::Missing => {
                    log::info!("{}: remote not available (probably old run), keeping local copy", name);
                    return Ok(Step::Resolved(Resolution::Retired));
                }
                RemoteProbe::Available { content_length } if content_length == len => {
                    log::info!("{}: remote/local size match", name);
                    return Ok(Step::Resolved(Resolution::Verified { bytes: len }));
                }
                RemoteProbe::Available { content_length } => {
                    log::info!(
                        "{}: remote/local size differ ({} != {}), re-downloading",
                        name,
                        content_length,
                        len
                    );
                }
            }
        }

        match self.remote.probe(task.location()).await? {
            RemoteProbe::Available { content_length } => {
                log::info!(
                    "{}: available at {} ({} bytes), downloading",
                    name,
                    task.remote_url(),
                    content_length
                );
                let bytes = self
                    .remote
                    .download(task.location(), task.local_path())
                    .await?;
                Ok(Step::Downloaded(bytes))
            }
            RemoteProbe::Missing => Ok(Step::NotYetAvailable),
        }
    }
}
