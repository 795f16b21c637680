pub mod ready;
pub mod shutdown;

pub use ready::{ReadyError, Readiness};
pub use shutdown::ShutdownController;
