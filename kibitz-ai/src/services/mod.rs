//! Analysis pipeline services
//!
//! Leaf services (PGN parsing, player matching, prompt building) are plain
//! functions. External collaborators (object storage, the model, dispatch)
//! sit behind traits so they can be swapped at startup or faked in tests.

pub mod analysis_worker;
pub mod bulk_submitter;
pub mod dispatcher;
pub mod model_client;
pub mod object_storage;
pub mod pgn_parser;
pub mod player_matcher;
pub mod prompt;

pub use analysis_worker::{AnalysisWorker, RunOutcome};
pub use bulk_submitter::{BulkSubmitter, SkippedGame, SubmissionError, SubmissionOutcome};
pub use dispatcher::{
    DispatchError, Dispatcher, InlineDispatcher, QueueDispatcher, QueueSettings, TaskPayload,
    SIGNATURE_HEADER,
};
pub use model_client::{AnalysisModel, GeminiClient, GeminiSettings, ModelError};
pub use object_storage::{LocalObjectStorage, ObjectStorage, StorageError};
