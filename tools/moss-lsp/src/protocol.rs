//! Canonicalized message surface.
//!
//! Messages reach the server already framed, parsed, and canonicalized by
//! an upstream preprocessor (which also folds `didOpen`/`didChange` streams
//! into batched `moss/workspaceEdit` notifications and flags requests whose
//! id was canceled in flight). These types are that interface; raw
//! JSON-RPC framing never appears in this crate.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes used by the server.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i64)]
pub enum ErrorCode {
    // Defined by JSON RPC
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    ServerErrorStart = -32099,
    ServerErrorEnd = -32000,
    ServerNotInitialized = -32002,
    UnknownErrorCode = -32001,

    // Defined by the LSP
    RequestCancelled = -32800,
}

impl ErrorCode {
    #[inline]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Methods the server dispatches on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LspMethod {
    #[serde(rename = "initialize")]
    Initialize,
    #[serde(rename = "initialized")]
    Initialized,
    #[serde(rename = "shutdown")]
    Shutdown,
    #[serde(rename = "exit")]
    Exit,
    #[serde(rename = "workspace/symbol")]
    WorkspaceSymbol,
    #[serde(rename = "textDocument/definition")]
    Definition,
    #[serde(rename = "textDocument/typeDefinition")]
    TypeDefinition,
    #[serde(rename = "textDocument/hover")]
    Hover,
    #[serde(rename = "textDocument/completion")]
    Completion,
    #[serde(rename = "textDocument/codeAction")]
    CodeAction,
    #[serde(rename = "textDocument/signatureHelp")]
    SignatureHelp,
    #[serde(rename = "textDocument/references")]
    References,
    #[serde(rename = "textDocument/documentHighlight")]
    DocumentHighlight,
    #[serde(rename = "textDocument/documentSymbol")]
    DocumentSymbol,
    #[serde(rename = "moss/workspaceEdit")]
    WorkspaceEdit,
    #[serde(rename = "moss/readFile")]
    ReadFile,
    #[serde(rename = "moss/fence")]
    Fence,
    #[serde(rename = "moss/error")]
    Error,
}

/// A request id: number or string, chosen by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

/// A canonicalized request.
#[derive(Clone, Debug, Deserialize)]
pub struct RequestMessage {
    pub id: RequestId,
    pub method: LspMethod,
    #[serde(default)]
    pub params: Value,
    /// Set by the preprocessor when the client canceled this id while the
    /// message was still queued.
    #[serde(default)]
    pub canceled: bool,
}

/// A canonicalized notification.
#[derive(Clone, Debug, Deserialize)]
pub struct NotificationMessage {
    pub method: LspMethod,
    #[serde(default)]
    pub params: Value,
}

/// Any canonicalized incoming message.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum CanonicalMessage {
    Request(RequestMessage),
    Notification(NotificationMessage),
}

impl CanonicalMessage {
    pub fn request(id: impl Into<RequestId>, method: LspMethod, params: Value) -> Self {
        CanonicalMessage::Request(RequestMessage {
            id: id.into(),
            method,
            params,
            canceled: false,
        })
    }

    pub fn notification(method: LspMethod, params: Value) -> Self {
        CanonicalMessage::Notification(NotificationMessage { method, params })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// An outgoing response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ResponseMessage {
    pub fn ok(id: RequestId, result: Value) -> Self {
        ResponseMessage {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        ResponseMessage {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ResponseError {
                code: code.code(),
                message: message.into(),
            }),
        }
    }
}

/// An outgoing notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutgoingNotification {
    pub jsonrpc: String,
    pub method: LspMethod,
    pub params: Value,
}

impl OutgoingNotification {
    pub fn new(method: LspMethod, params: Value) -> Self {
        OutgoingNotification {
            jsonrpc: "2.0".to_string(),
            method,
            params,
        }
    }
}

/// Anything the server writes back.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Response(ResponseMessage),
    Notification(OutgoingNotification),
}

/// Transport seam: the embedder owns framing and the client connection.
pub trait LspOutput: Send + Sync {
    fn write(&self, msg: OutgoingMessage);
}

/// An [`LspOutput`] that buffers messages, for tests and embedding.
#[derive(Default)]
pub struct BufferOutput {
    messages: Mutex<Vec<OutgoingMessage>>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything written so far.
    pub fn take(&self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl LspOutput for BufferOutput {
    fn write(&self, msg: OutgoingMessage) {
        self.messages.lock().push(msg);
    }
}

// === Params and results ===

/// Batched file updates carried by `moss/workspaceEdit`.
///
/// `epoch` is assigned by the preprocessor and strictly increases;
/// `merge_count` counts edits the preprocessor already folded into this one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEditParams {
    pub epoch: u64,
    #[serde(default)]
    pub merge_count: u32,
    pub updates: Vec<FileUpdate>,
}

/// One new file content within a workspace edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileUpdate {
    pub path: String,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentPositionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

/// `textDocumentSync: Full` — the client always sends whole documents.
pub const TEXT_DOCUMENT_SYNC_FULL: u8 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub text_document_sync: u8,
    pub definition_provider: bool,
    pub type_definition_provider: bool,
    pub document_symbol_provider: bool,
    pub workspace_symbol_provider: bool,
    pub document_highlight_provider: bool,
    pub hover_provider: bool,
    pub references_provider: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_action_provider: Option<CodeActionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_help_provider: Option<SignatureHelpOptions>,
    pub completion_provider: CompletionOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeActionOptions {
    pub code_action_kinds: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpOptions {
    pub trigger_characters: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub trigger_characters: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
}

/// Params of `moss/error`, in both its request and notification forms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MossErrorParams {
    pub code: i64,
    pub message: String,
}
