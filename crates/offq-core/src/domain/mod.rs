//! Domain model (ids, jobs, status).

pub mod ids;
pub mod job;

pub use self::ids::{JobId, ParseJobIdError};
pub use self::job::{Job, JobStatus, JobType, Payload};
