//! Mirrors GFS forecast files from a server that publishes them one
//! forecast hour at a time.

pub mod acquirer;
pub mod batch;
pub mod error;
pub mod retry;
pub mod run;
pub mod store;
pub mod utils;

pub use acquirer::{FileAcquirer, Resolution};
pub use batch::{BatchCoordinator, BatchReport};
pub use error::{FetchError, RunSpecError};
pub use retry::RetryPolicy;
pub use run::{AcquisitionTask, Layout, RunSpecification};
