//! Session-scoped streaming pipeline: Intelligent Buffer, Progress Tracker,
//! Session Channel Manager, and the SSE Transport that serves them over
//! HTTP (spec §4.4–§4.7).

pub mod buffer;
pub mod progress;
pub mod session;
pub mod sse;

pub use buffer::{IntelligentBuffer, PushOutcome, RuleClass};
pub use progress::{ProgressTracker, TrackerEvent, TrackerPhase};
pub use session::{Session, SessionChannelManager, SessionError};
pub use sse::{sse_handler, ShutdownSignal, SharedSessionManager, SseState};
