//! Job orchestration for mparchive.
//!
//! This crate ties the crawler components into one controllable job:
//! resolve the account, list its articles, archive each one, with
//! pause/cancel checkpoints in between (see [`job::run`]).

pub mod collaborators;
pub mod control;
pub mod job;
pub mod progress;

pub use collaborators::{
    AuthorizationGate, CredentialProvider, EnvCredentials, StaticCredentials, Unmetered, UsageQuota,
};
pub use control::{JobHandle, JobState, JobToken, job_control};
pub use job::{JobOutcome, JobReport, JobRequest, run, run_authorized};
pub use progress::{ChannelProgress, ProgressEvent, ProgressReporter, SilentProgress};
