pub mod manual;
pub mod mock;

pub use manual::ManualBackend;
pub use mock::{MockBackend, MockResponse};
