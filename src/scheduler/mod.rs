mod schedule;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::ingest::{Collector, CycleReport, Target};

pub use schedule::Schedule;

/// What a job collects when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTarget {
    Country {
        country: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    Domain {
        domain: String,
    },
    /// Every domain currently flagged as favourite, one global cycle each.
    Favourites,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub times: Schedule,
    pub target: JobTarget,
}

pub struct Scheduler {
    jobs: Vec<Job>,
    collector: Arc<Collector>,
}

impl Scheduler {
    pub fn new(jobs: Vec<Job>, collector: Arc<Collector>) -> Self {
        Self { jobs, collector }
    }

    /// Jobs whose schedule matches `time`.
    pub fn due(&self, time: &impl Timelike) -> Vec<&Job> {
        self.jobs.iter().filter(|job| job.times.is_due(time)).collect()
    }

    /// Runs the jobs due at `time` once, for use from an external cron.
    pub async fn run_due(&self, time: &impl Timelike) -> Vec<CycleReport> {
        let mut reports = Vec::new();
        for job in self.due(time) {
            match execute(&self.collector, job).await {
                Ok(mut job_reports) => reports.append(&mut job_reports),
                Err(e) => tracing::error!(job = %job.name, error = %e, "Collection cycle aborted"),
            }
        }
        reports
    }

    /// Runs every job (or only the one called `name`) once, in order.
    pub async fn run_once(&self, name: Option<&str>) -> Result<Vec<CycleReport>> {
        let jobs: Vec<&Job> = match name {
            Some(name) => {
                let job = self
                    .jobs
                    .iter()
                    .find(|job| job.name == name)
                    .ok_or_else(|| anyhow::anyhow!("no job named '{name}'"))?;
                vec![job]
            }
            None => self.jobs.iter().collect(),
        };

        let mut reports = Vec::new();
        for job in jobs {
            match execute(&self.collector, job).await {
                Ok(mut job_reports) => reports.append(&mut job_reports),
                Err(e) => tracing::error!(job = %job.name, error = %e, "Collection cycle aborted"),
            }
        }
        Ok(reports)
    }

    /// Runs every job on its own task until `shutdown` flips to true, then
    /// waits for cycles already in progress to finish.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        tracing::info!(jobs = self.jobs.len(), "Scheduler started");
        for job in &self.jobs {
            let times: Vec<String> = job.times.times().iter().map(ToString::to_string).collect();
            tracing::info!(job = %job.name, times = ?times, "Job registered");
        }

        let handles: Vec<_> = self
            .jobs
            .into_iter()
            .map(|job| {
                tokio::spawn(run_job(job, Arc::clone(&self.collector), shutdown.clone()))
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Job task failed");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn run_job(job: Job, collector: Arc<Collector>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let (wait, tick) = next_tick(Local::now().naive_local());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }

        // The sleep follows the monotonic clock; after a host suspend the
        // tick can be long gone and is not made up.
        if !still_current(tick, Local::now().naive_local()) {
            tracing::debug!(job = %job.name, %tick, "Missed tick skipped");
            continue;
        }
        if !job.times.is_due(&tick) {
            continue;
        }

        tracing::info!(job = %job.name, "Job fired");
        match execute(&collector, &job).await {
            Ok(reports) => {
                let stored: usize = reports.iter().map(|r| r.stored).sum();
                tracing::info!(job = %job.name, cycles = reports.len(), stored, "Job finished");
            }
            Err(e) => tracing::error!(job = %job.name, error = %e, "Collection cycle aborted"),
        }
    }
    tracing::debug!(job = %job.name, "Job stopped");
}

async fn execute(collector: &Collector, job: &Job) -> Result<Vec<CycleReport>> {
    match &job.target {
        JobTarget::Country {
            country,
            language,
            query,
        } => {
            let target = Target::ByCountry {
                country: country.clone(),
                language: language.clone(),
                query: query.clone(),
            };
            Ok(vec![collector.collect(&target).await?])
        }
        JobTarget::Domain { domain } => {
            Ok(vec![collector.collect(&Target::global(domain.as_str())).await?])
        }
        JobTarget::Favourites => collector.collect_favourites().await,
    }
}

/// Start of the next wall-clock minute after `now`, and how long until then.
fn next_tick(now: NaiveDateTime) -> (Duration, NaiveDateTime) {
    let minute_start = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let tick = minute_start + chrono::Duration::minutes(1);
    let wait = (tick - now).to_std().unwrap_or_default();
    (wait, tick)
}

/// True while `now` is still inside the minute that starts at `tick`, or
/// slightly before it when the wall clock lags the timer.
fn still_current(tick: NaiveDateTime, now: NaiveDateTime) -> bool {
    now.signed_duration_since(tick) < chrono::Duration::minutes(1)
}
