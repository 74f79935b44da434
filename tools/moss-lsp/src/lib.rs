//! Language-server backend for the Moss type checker.
//!
//! This crate arbitrates *when* incremental re-checks run and *against
//! which snapshot*; the analysis itself is delegated through the
//! [`Analysis`] seam, and transport framing / message parsing live with the
//! embedder (messages arrive here already canonicalized).
//!
//! # Architecture
//!
//! Two logical threads:
//! - The **coordinator thread** drives [`LspServer::process_message`]: it
//!   runs the edit committer against the shared snapshot, decides fast path
//!   vs slow path, and submits work.
//! - The **typechecker thread** (owned by [`TypecheckerCoordinator`])
//!   serializes submitted tasks against the live analysis state. Fast-path
//!   edits go through `sync_run` and block the coordinator; slow-path edits
//!   go through `async_run` and stay cancelable until their commit point.
//!
//! Worker pools (state hashing, batch indexing) only ever hand results back
//! through bounded queues; they never touch either thread's state.

mod commit;
mod config;
mod coordinator;
mod protocol;
mod server;
mod tracing_setup;
mod typechecker;
mod updates;

#[cfg(test)]
mod testing;

pub use config::LspConfig;
pub use coordinator::TypecheckerCoordinator;
pub use protocol::{
    BufferOutput, CanonicalMessage, CodeActionOptions, CompletionOptions, ErrorCode, FileUpdate,
    InitializeResult, Location, LspMethod, LspOutput, NotificationMessage, OutgoingMessage,
    OutgoingNotification, Position, Range, RequestId, RequestMessage, ResponseError,
    ResponseMessage, ServerCapabilities, SignatureHelpOptions, TextDocumentIdentifier,
    TextDocumentItem, WorkspaceEditParams, TEXT_DOCUMENT_SYNC_FULL,
};
pub use server::{LoopControl, LspServer};
pub use tracing_setup::init_tracing;
pub use typechecker::{Analysis, NoopAnalysis, Typechecker};
pub use updates::LspFileUpdates;
