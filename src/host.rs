use std::future::Future;

use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::pipeline::{JobReport, JobStatus, Stage};
use crate::service::VideoReference;

/// Terminal states of every job of a run, in input order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|status| matches!(status, JobStatus::Success))
    }

    pub fn partial(&self) -> usize {
        self.count(|status| matches!(status, JobStatus::PartialSuccess { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, JobStatus::Failed { .. }))
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.reports.len()
    }

    fn count(&self, predicate: impl Fn(&JobStatus) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.status)).count()
    }
}

/// Run one job per reference, all at once.
///
/// Each job runs on its own task, so a panic is contained to that job and
/// reported as a failure of the `pipeline` stage; sibling jobs keep running.
pub async fn run_jobs<F, Fut>(references: Vec<VideoReference>, run: F) -> RunSummary
where
    F: Fn(VideoReference) -> Fut,
    Fut: Future<Output = JobReport> + Send + 'static,
{
    let total = references.len();
    info!("Starting {} job(s)", total);

    let mut set = JoinSet::new();
    for (index, reference) in references.into_iter().enumerate() {
        let video_id = reference.video_id.clone();
        let job = tokio::spawn(run(reference));

        set.spawn(async move {
            let report = match job.await {
                Ok(report) => report,
                Err(e) => {
                    let reason = describe_join_error(e);
                    error!("Job {} aborted: {}", video_id, reason);
                    JobReport::failed(&video_id, Stage::Pipeline, reason)
                }
            };
            (index, report)
        });
    }

    let mut slots: Vec<Option<JobReport>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, report)) => slots[index] = Some(report),
            Err(e) => error!("Job watcher task failed: {}", e),
        }
    }

    let summary = RunSummary {
        reports: slots.into_iter().flatten().collect(),
    };
    info!(
        "Run finished: {} succeeded, {} partial, {} failed",
        summary.succeeded(),
        summary.partial(),
        summary.failed()
    );
    summary
}

fn describe_join_error(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("job panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("job panicked: {}", message)
    } else {
        "job panicked".to_string()
    }
}
