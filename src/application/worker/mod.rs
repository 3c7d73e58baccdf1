pub mod client;
pub mod protocol;
pub mod worker;

pub use client::{Job, JobClient};
pub use protocol::{WorkerRequest, WorkerResponse};
pub use worker::{JobSettings, Worker, WorkerContext, WorkerHandle};
