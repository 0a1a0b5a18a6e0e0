//! Dockyard compose
//!
//! Docker Compose スタックを結合テストの単位で起動・待機・記録・破棄する。
//! 外部とのやり取りはすべて [`ProcessRunner`]、[`FileSystem`]、[`Clock`]、
//! [`dockyard_core::PropertyStore`] を経由する。

pub mod cleanup;
pub mod clock;
pub mod controller;
pub mod fs;
pub mod orchestrator;
pub mod process;
pub mod recorder;
pub mod report;
pub mod waiter;

#[cfg(test)]
mod testing;

pub use cleanup::{CleanupCoordinator, CleanupReport, CleanupStrategy, PROJECT_LABEL};
pub use clock::{Clock, SystemClock};
pub use controller::{ComposeStatusSource, StackController, missing_files};
pub use fs::{FileSystem, LocalFileSystem};
pub use orchestrator::{
    CycleContext, CycleError, CyclePhase, LifecycleOrchestrator, LifecycleServices,
    TeardownReport,
};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemProcessRunner};
pub use recorder::{
    DiscoveryRecord, RecordRequest, ServiceEntry, StateDocument, StateRecorder, discovery_path,
    state_file_path,
};
pub use report::StepReport;
pub use waiter::{ReadinessWaiter, StatusSource, WaitOutcome, WaitSpec};
