use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::task::JoinSet;

use crate::acquirer::{FileAcquirer, Resolution};
use crate::run::{Layout, RunSpecification};
use crate::store::Remote;

/// Outcome of a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub verified: usize,
    pub retired: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn resolved(&self) -> usize {
        self.verified + self.retired
    }
}

/// Fetches every forecast hour of a run, one task per file.
pub struct BatchCoordinator<R> {
    acquirer: FileAcquirer<R>,
    layout: Layout,
}

impl<R: Remote + 'static> BatchCoordinator<R> {
    pub fn new(acquirer: FileAcquirer<R>, layout: Layout) -> Self {
        Self { acquirer, layout }
    }

    /// Returns once every file of the run is resolved. Files are polled
    /// concurrently and independently; nothing caps how many are in flight.
    pub async fn run_batch(&self, spec: &RunSpecification) -> Result<BatchReport, anyhow::Error> {
        let started = Instant::now();
        let local_dir = self.layout.local_dir(spec);
        log::info!(
            "Downloading {} files of {} into {}",
            spec.task_count(),
            spec.remote_dir_name(),
            local_dir.display()
        );

        // Tolerates the directory showing up concurrently.
        log::debug!("Making directory {}", local_dir.display());
        tokio::fs::create_dir_all(&local_dir)
            .await
            .with_context(|| format!("creating {}", local_dir.display()))?;

        let tasks = self.layout.tasks(spec).context("deriving tasks")?;

        let mut workers = JoinSet::new();
        for task in tasks {
            let acquirer = self.acquirer.clone();
            workers.spawn(async move { acquirer.acquire(&task).await });
        }

        let mut verified = 0;
        let mut retired = 0;
        let mut failed = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Resolution::Verified { .. }) => verified += 1,
                Ok(Resolution::Retired) => retired += 1,
                Err(e) => {
                    log::error!("download worker failed: {}", e);
                    failed += 1;
                }
            }
        }

        let elapsed = started.elapsed();
        if failed > 0 {
            anyhow::bail!(
                "{} of {} download workers of {} did not finish",
                failed,
                spec.task_count(),
                spec.remote_dir_name()
            );
        }

        log::info!(
            "Finished {} in {:.1?}: {} verified, {} retired",
            spec.remote_dir_name(),
            elapsed,
            verified,
            retired
        );

        Ok(BatchReport {
            verified,
            retired,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::acquirer::tests::{Scripted, ScriptedRemote};
    use crate::retry::RetryPolicy;
    use crate::store::RemoteProbe;

    fn coordinator(
        remote: &Arc<ScriptedRemote>,
        output: &std::path::Path,
    ) -> BatchCoordinator<ScriptedRemote> {
        let layout = Layout::new("http://nomads.example/gfs/prod/", output).unwrap();
        BatchCoordinator::new(
            FileAcquirer::new(Arc::clone(remote), RetryPolicy::default()),
            layout,
        )
    }

    #[tokio::test]
    async fn every_task_is_downloaded_into_run_directory() {
        let out = tempfile::tempdir().unwrap();
        let remote = Arc::new(ScriptedRemote::new(Scripted::Probe(
            RemoteProbe::Available { content_length: 16 },
        )));
        let spec = RunSpecification::new(2016, 6, 20, 0, 0, 24, 3).unwrap();

        let report = coordinator(&remote, out.path()).run_batch(&spec).await.unwrap();

        assert_eq!(report.verified, 9);
        assert_eq!(report.retired, 0);
        assert_eq!(remote.download_count(), 9);

        let run_dir = out.path().join("2016_06_20_c00");
        for hour in (0..=24).step_by(3) {
            let file = run_dir.join(format!("gfs.t00z.pgrb2.0p25.f{:03}", hour));
            assert_eq!(std::fs::metadata(&file).unwrap().len(), 16);
        }
    }

    #[tokio::test]
    async fn existing_run_directory_is_reused() {
        let out = tempfile::tempdir().unwrap();
        let run_dir = out.path().join("2016_06_20_c12");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("gfs.t12z.pgrb2.0p25.f006"), b"kept").unwrap();

        let remote = Arc::new(ScriptedRemote::new(Scripted::Probe(RemoteProbe::Missing)));
        let spec = RunSpecification::new(2016, 6, 20, 12, 6, 6, 1).unwrap();

        let report = coordinator(&remote, out.path()).run_batch(&spec).await.unwrap();

        assert_eq!(report.retired, 1);
        assert_eq!(report.resolved(), spec.task_count());
        assert_eq!(std::fs::read(run_dir.join("gfs.t12z.pgrb2.0p25.f006")).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn concurrent_batches_share_output_root() {
        let out = tempfile::tempdir().unwrap();
        let remote = Arc::new(ScriptedRemote::new(Scripted::Probe(
            RemoteProbe::Available { content_length: 4 },
        )));
        let coordinator = coordinator(&remote, &out.path().join("gfs_data"));
        let c00 = RunSpecification::new(2016, 6, 20, 0, 0, 12, 6).unwrap();
        let c06 = RunSpecification::new(2016, 6, 20, 6, 0, 12, 6).unwrap();

        let (a, b) = tokio::join!(coordinator.run_batch(&c00), coordinator.run_batch(&c06));

        assert_eq!(a.unwrap().resolved(), 3);
        assert_eq!(b.unwrap().resolved(), 3);
        assert!(out.path().join("gfs_data/2016_06_20_c00").is_dir());
        assert!(out.path().join("gfs_data/2016_06_20_c06").is_dir());
    }
}
