mod poller;

pub use poller::{HttpStatusSource, JobPoller, PollEvent, StatusSnapshot, StatusSource};
