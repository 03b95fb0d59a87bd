pub mod executor;
pub mod model;
pub mod retry;
pub mod runner;
pub mod validation;
pub mod worker;

pub use executor::{StepError, StepExecutor};
pub use model::{Job, JobSpec, JobStatus, Step};
pub use runner::JobRunner;
pub use validation::NewJob;
pub use worker::{PollOutcome, StepWorker};
