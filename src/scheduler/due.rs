use chrono::{DateTime, FixedOffset, Utc};

use crate::models::job::ScheduleJob;

/// When an interval job should next run: `last_run_at + interval` when both
/// are known, otherwise the stored `next_run_at`.
pub fn effective_next_run(job: &ScheduleJob) -> Option<DateTime<Utc>> {
    match (job.interval, job.last_run_at) {
        (Some(interval), Some(last_run_at)) => Some(last_run_at + interval.duration()),
        _ => job.next_run_at,
    }
}

/// Whether a job's scheduled time has arrived.
///
/// Due when it has never run, when its next run time has passed, or when one
/// of its daily `specific_times` (read in `offset`) fell after the last run
/// and no later than `now` on the current calendar day.
pub fn is_job_due(job: &ScheduleJob, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    let Some(last_run_at) = job.last_run_at else {
        return true;
    };

    if effective_next_run(job).is_some_and(|next| next <= now) {
        return true;
    }

    specific_time_passed(job, last_run_at, now, offset)
}

fn specific_time_passed(
    job: &ScheduleJob,
    last_run_at: DateTime<Utc>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> bool {
    let today = now.with_timezone(&offset).date_naive();

    job.specific_times.iter().any(|time| {
        today
            .and_time(*time)
            .and_local_timezone(offset)
            .single()
            .map(|at| at.with_timezone(&Utc))
            .is_some_and(|at| last_run_at < at && at <= now)
    })
}
