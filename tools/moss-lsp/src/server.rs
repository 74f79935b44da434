//! Message dispatch.
//!
//! [`LspServer::process_message`] is the coordinator thread's entry point:
//! it runs the edit committer inline and submits everything that touches
//! typechecker state through the [`TypecheckerCoordinator`]. A single
//! request never takes the loop down; structured errors go back to the
//! client as response errors.

use crate::config::LspConfig;
use crate::coordinator::TypecheckerCoordinator;
use crate::protocol::{
    CanonicalMessage, CodeActionOptions, CompletionOptions, ErrorCode, InitializeResult, Location,
    LspMethod, LspOutput, MossErrorParams, NotificationMessage, OutgoingMessage,
    OutgoingNotification, RequestId, RequestMessage, ResponseError, ResponseMessage,
    ServerCapabilities,
    SignatureHelpOptions, TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams,
    WorkspaceEditParams, TEXT_DOCUMENT_SYNC_FULL,
};
use crate::typechecker::{Analysis, Typechecker};
use crate::updates::LspFileUpdates;
use moss_pipeline::{
    compute_state_hashes, index_batch, File, FileHash, FileId, GlobalState, Indexer,
};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What the embedder's read loop should do after a message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    /// `exit` received; `clean` iff `shutdown` came first.
    Exit { clean: bool },
}

/// The last dispatched slow-path update, kept for merge/cancel reasoning
/// together with the hashes its commit displaced.
pub(crate) struct SlowPathRetry {
    pub(crate) update: LspFileUpdates,
    pub(crate) evictions: FxHashMap<FileId, FileHash>,
}

/// The language-server backend.
///
/// Owns the shared snapshot (`initial_gs`) and its hash column; both are
/// mutated only by the committer, on the thread that calls
/// [`process_message`](LspServer::process_message).
pub struct LspServer {
    pub(crate) config: Arc<LspConfig>,
    pub(crate) output: Arc<dyn LspOutput>,
    pub(crate) indexer: Arc<dyn Indexer>,
    pub(crate) coordinator: TypecheckerCoordinator,
    pub(crate) initial_gs: GlobalState,
    pub(crate) state_hashes: Vec<FileHash>,
    pub(crate) last_slow_path: Option<SlowPathRetry>,
    shutdown_requested: bool,
}

impl LspServer {
    pub fn new(
        config: LspConfig,
        indexer: Arc<dyn Indexer>,
        analysis: Arc<dyn Analysis>,
        output: Arc<dyn LspOutput>,
    ) -> Self {
        let coordinator = TypecheckerCoordinator::new(Typechecker::new(analysis));
        LspServer {
            config: Arc::new(config),
            output,
            indexer,
            coordinator,
            initial_gs: GlobalState::new(),
            state_hashes: Vec::new(),
            last_slow_path: None,
            shutdown_requested: false,
        }
    }

    /// Handle one canonicalized message.
    pub fn process_message(&mut self, message: CanonicalMessage) -> LoopControl {
        match message {
            CanonicalMessage::Notification(notification) => self.process_notification(notification),
            CanonicalMessage::Request(request) => {
                self.process_request(request);
                LoopControl::Continue
            }
        }
    }

    fn process_notification(&mut self, notification: NotificationMessage) -> LoopControl {
        match notification.method {
            LspMethod::WorkspaceEdit => {
                match serde_json::from_value::<WorkspaceEditParams>(notification.params) {
                    Ok(params) => self.handle_workspace_edit(params),
                    Err(err) => error!(%err, "malformed workspace edit"),
                }
            }
            LspMethod::Initialized => self.handle_initialized(),
            LspMethod::Exit => {
                return LoopControl::Exit {
                    clean: self.shutdown_requested,
                }
            }
            LspMethod::Fence => {
                // Round-trip through the typechecker queue, then echo the
                // fence back with identical params.
                let output = Arc::clone(&self.output);
                let params = notification.params;
                self.coordinator.sync_run(move |_typechecker| {
                    output.write(OutgoingMessage::Notification(OutgoingNotification::new(
                        LspMethod::Fence,
                        params,
                    )));
                });
            }
            LspMethod::Error => {
                match serde_json::from_value::<MossErrorParams>(notification.params) {
                    Ok(params) if params.code == ErrorCode::MethodNotFound.code() => {
                        // Just a method we chose not to handle.
                        debug!(message = %params.message, "client-reported error");
                    }
                    Ok(params) => error!(code = params.code, message = %params.message, "client-reported error"),
                    Err(err) => error!(%err, "malformed error notification"),
                }
            }
            other => {
                debug!(method = ?other, "ignoring notification");
            }
        }
        LoopControl::Continue
    }

    fn process_request(&mut self, request: RequestMessage) {
        let RequestMessage {
            id,
            method,
            params,
            canceled,
        } = request;

        if canceled {
            self.respond(ResponseMessage::error(
                id,
                ErrorCode::RequestCancelled,
                "Request was canceled",
            ));
            return;
        }

        match method {
            LspMethod::Initialize => {
                let result = InitializeResult {
                    capabilities: capabilities(&self.config),
                };
                self.respond(ResponseMessage::ok(
                    id,
                    serde_json::to_value(result).expect("capabilities serialize"),
                ));
            }
            LspMethod::Shutdown => {
                self.shutdown_requested = true;
                self.respond(ResponseMessage::ok(id, Value::Null));
            }
            LspMethod::Definition
            | LspMethod::TypeDefinition
            | LspMethod::References
            | LspMethod::DocumentHighlight => self.handle_position_query(id, method, params),
            LspMethod::Hover => self.handle_hover(id, params),
            LspMethod::Completion => {
                self.respond_on_typechecker(id, json!({ "isIncomplete": false, "items": [] }));
            }
            LspMethod::SignatureHelp => {
                self.respond_on_typechecker(id, json!({ "signatures": [] }));
            }
            LspMethod::CodeAction
            | LspMethod::WorkspaceSymbol
            | LspMethod::DocumentSymbol => {
                self.respond_on_typechecker(id, json!([]));
            }
            LspMethod::ReadFile => self.handle_read_file(id, params),
            LspMethod::Error => match serde_json::from_value::<MossErrorParams>(params) {
                Ok(err_params) => {
                    self.respond(ResponseMessage {
                        jsonrpc: "2.0".to_string(),
                        id,
                        result: None,
                        error: Some(ResponseError {
                            code: err_params.code,
                            message: err_params.message,
                        }),
                    });
                }
                Err(_) => self.respond(ResponseMessage::error(
                    id,
                    ErrorCode::InvalidParams,
                    "malformed moss/error params",
                )),
            },
            LspMethod::Initialized
            | LspMethod::Exit
            | LspMethod::WorkspaceEdit
            | LspMethod::Fence => {
                self.respond(ResponseMessage::error(
                    id,
                    ErrorCode::MethodNotFound,
                    format!("Notification method sent as request: {}", method_str(method)),
                ));
            }
        }
    }

    /// Commit the edit against the shared snapshot and dispatch it: fast
    /// path synchronously, slow path asynchronously (and cancelable).
    fn handle_workspace_edit(&mut self, params: WorkspaceEditParams) {
        let update = self.commit_edit(params);
        let merged_edits = update.edit_count - 1;
        if update.can_take_fast_path {
            self.coordinator.sync_run(move |typechecker| {
                if !typechecker.typecheck(update) {
                    debug!(merged_edits, "processed workspace edit on the fast path");
                }
            });
        } else {
            self.initial_gs.epochs().start_commit_epoch(update.epoch);
            self.coordinator.async_run(move |typechecker| {
                if !typechecker.typecheck(update) {
                    debug!(merged_edits, "processed workspace edit on the slow path");
                }
            });
        }
    }

    /// Index the configured workspace, hash everything, and hand the
    /// typechecker its initial state. Blocking: initialization is not
    /// cancelable.
    fn handle_initialized(&mut self) {
        let root = std::path::Path::new(&self.config.root_path);
        let mut entered = Vec::new();
        for path in &self.config.input_paths {
            match std::fs::read_to_string(path) {
                Ok(source) => {
                    // Store paths workspace-relative so they match uris.
                    let stored = if self.config.root_path.is_empty() {
                        path.as_path()
                    } else {
                        path.strip_prefix(root).unwrap_or(path)
                    };
                    let file = File::new(stored.display().to_string(), source);
                    entered.push(self.initial_gs.enter_file(file));
                }
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable file"),
            }
        }
        debug!(files = entered.len(), "initial index");

        let indexed = index_batch(&*self.indexer, &self.initial_gs, &entered);
        let hash_input: Vec<Option<Arc<File>>> =
            self.initial_gs.files().iter().cloned().map(Some).collect();
        self.state_hashes =
            compute_state_hashes(&*self.indexer, self.config.workers, &hash_input);

        let gs = self.initial_gs.deep_copy();
        let state_hashes = self.state_hashes.clone();
        self.coordinator.sync_run(move |typechecker| {
            typechecker.initialize(gs, indexed, state_hashes);
        });
    }

    fn handle_position_query(&mut self, id: RequestId, method: LspMethod, params: Value) {
        let Some((path, params)) = self.parse_position_params(&id, params) else {
            return;
        };
        let output = Arc::clone(&self.output);
        self.coordinator.sync_run(move |typechecker| {
            let locations = typechecker.query_by_loc(&path, params.position);
            let result = match method {
                LspMethod::DocumentHighlight => highlights_result(&locations),
                _ => serde_json::to_value(&locations).expect("locations serialize"),
            };
            output.write(OutgoingMessage::Response(ResponseMessage::ok(id, result)));
        });
    }

    fn handle_hover(&mut self, id: RequestId, params: Value) {
        let Some((path, params)) = self.parse_position_params(&id, params) else {
            return;
        };
        let output = Arc::clone(&self.output);
        self.coordinator.sync_run(move |typechecker| {
            let result = match typechecker.hover(&path, params.position) {
                Some(markdown) => json!({
                    "contents": { "kind": "markdown", "value": markdown }
                }),
                None => Value::Null,
            };
            output.write(OutgoingMessage::Response(ResponseMessage::ok(id, result)));
        });
    }

    fn handle_read_file(&mut self, id: RequestId, params: Value) {
        let Ok(params) = serde_json::from_value::<TextDocumentIdentifier>(params) else {
            self.respond(ResponseMessage::error(
                id,
                ErrorCode::InvalidParams,
                "expected a text document identifier",
            ));
            return;
        };
        let Some(path) = self.config.path_from_uri(&params.uri).map(str::to_string) else {
            self.respond(ResponseMessage::error(
                id,
                ErrorCode::InvalidParams,
                format!("Did not find file at uri {}", params.uri),
            ));
            return;
        };
        let uri = params.uri;
        let output = Arc::clone(&self.output);
        self.coordinator.sync_run(move |typechecker| {
            let response = match typechecker.read_file(&path) {
                Some(text) => {
                    let item = TextDocumentItem {
                        uri,
                        language_id: "moss".to_string(),
                        version: 0,
                        text: text.to_string(),
                    };
                    ResponseMessage::ok(id, serde_json::to_value(item).expect("item serializes"))
                }
                None => ResponseMessage::error(
                    id,
                    ErrorCode::InvalidParams,
                    format!("Did not find file at uri {uri}"),
                ),
            };
            output.write(OutgoingMessage::Response(response));
        });
    }

    /// Parse position params, responding with `InvalidParams` on failure.
    fn parse_position_params(
        &mut self,
        id: &RequestId,
        params: Value,
    ) -> Option<(String, TextDocumentPositionParams)> {
        let params = match serde_json::from_value::<TextDocumentPositionParams>(params) {
            Ok(params) => params,
            Err(_) => {
                self.respond(ResponseMessage::error(
                    id.clone(),
                    ErrorCode::InvalidParams,
                    "expected text document position params",
                ));
                return None;
            }
        };
        match self.config.path_from_uri(&params.text_document.uri) {
            Some(path) => Some((path.to_string(), params)),
            None => {
                self.respond(ResponseMessage::error(
                    id.clone(),
                    ErrorCode::InvalidParams,
                    format!("Did not find file at uri {}", params.text_document.uri),
                ));
                None
            }
        }
    }

    /// Answer `result` from the typechecker thread, preserving queue order
    /// relative to pending edits.
    fn respond_on_typechecker(&self, id: RequestId, result: Value) {
        let output = Arc::clone(&self.output);
        self.coordinator.sync_run(move |_typechecker| {
            output.write(OutgoingMessage::Response(ResponseMessage::ok(id, result)));
        });
    }

    fn respond(&self, response: ResponseMessage) {
        self.output.write(OutgoingMessage::Response(response));
    }

    /// Number of uncanceled typecheck runs so far. Blocks on the
    /// typechecker queue, so it doubles as a fence in tests.
    pub fn typecheck_count(&self) -> u32 {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.coordinator.sync_run(move |typechecker| {
            let _ = tx.send(typechecker.typecheck_runs());
        });
        rx.recv().expect("typechecker thread is gone")
    }
}

fn highlights_result(locations: &[Location]) -> Value {
    Value::Array(
        locations
            .iter()
            .map(|location| json!({ "range": location.range }))
            .collect(),
    )
}

fn method_str(method: LspMethod) -> String {
    match serde_json::to_value(method) {
        Ok(Value::String(s)) => s,
        _ => format!("{method:?}"),
    }
}

fn capabilities(config: &LspConfig) -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: TEXT_DOCUMENT_SYNC_FULL,
        definition_provider: true,
        type_definition_provider: true,
        document_symbol_provider: config.document_symbol_enabled,
        workspace_symbol_provider: true,
        document_highlight_provider: config.document_highlight_enabled,
        hover_provider: true,
        references_provider: true,
        code_action_provider: config.quick_fix_enabled.then(|| CodeActionOptions {
            code_action_kinds: vec!["quickfix".to_string()],
        }),
        signature_help_provider: config.signature_help_enabled.then(|| SignatureHelpOptions {
            trigger_characters: vec!["(".to_string(), ",".to_string()],
        }),
        completion_provider: CompletionOptions {
            trigger_characters: vec![".".to_string()],
        },
    }
}
