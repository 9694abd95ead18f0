pub mod display;
pub mod phase;
pub mod record;
pub mod session;
pub mod stimulus;
pub mod trial;

pub use display::{Display, Feedback, Screen};
pub use phase::{Phase, PhaseEvent, SessionStage, TrialPhase};
pub use record::{SessionRecord, TrialRecord};
pub use session::{SessionState, SessionStatus, SubjectId, SubjectIdError};
pub use stimulus::{Decision, Lexicality, ParseLexicalityError, StimulusItem, mask_for};
pub use trial::{Response, TrialResult, TrialSpec, duration_from_secs};
