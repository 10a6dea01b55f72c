//! Job code → job lookup

use std::collections::HashMap;

use crate::Job;

/// Lookup from job code to job, built once per request.
///
/// When a job code repeats, the later job wins.
#[derive(Clone, Debug, Default)]
pub struct JobIndex<'a> {
    jobs: HashMap<&'a str, &'a Job>,
}

impl<'a> JobIndex<'a> {
    pub fn new(jobs: &'a [Job]) -> Self {
        let jobs = jobs.iter().map(|job| (job.job_code.as_str(), job)).collect();
        Self { jobs }
    }

    pub fn get(&self, job_code: &str) -> Option<&'a Job> {
        self.jobs.get(job_code).copied()
    }

    /// Display label for a job code, if the job is known
    pub fn name(&self, job_code: &str) -> Option<&'a str> {
        self.get(job_code).map(|job| job.job_name.as_str())
    }
}
