//! Job record types: state machine, wire shape and status views.

mod record;
mod report;

pub use record::{Job, JobState, JobStatus, JobTransition, NewJob};
pub use report::{JobStatusReport, JobView};
