//! Synchronized acquisition: the capture subprocess worker and the
//! orchestrator that runs every worker of a session in lockstep.

pub mod orchestrator;
pub mod tool;
pub mod worker;

pub use orchestrator::{CaptureOrchestrator, Collaborators, OrchestratorSettings, SessionOutcome};
pub use tool::{parse_capture_stats, CaptureTool, DEFAULT_CAPTURE_TOOL};
pub use worker::{CaptureReport, PacketCaptureWorker};
