pub mod backend;
pub mod controller;
pub mod loop_worker;
pub mod replay;
pub mod simulated;

pub use backend::ScanBackend;
pub use controller::ScanController;
pub use loop_worker::{resolve_vendors, ScanSchedule, ScanSummary};
pub use replay::ReplayBackend;
pub use simulated::SimulatedBackend;
