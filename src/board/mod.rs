//! The shared board document and its access layer.

pub mod bootstrap;
pub mod http;
pub mod meta;
pub mod models;
pub mod store;

pub use bootstrap::{WorkflowColumns, ensure_workflow_columns, resolve_workflow_columns};
pub use http::HttpBoardStore;
pub use models::{
    AgentDef, AgentMeta, BacklogPatch, BacklogProject, Board, Column, Document, MetaStatus,
    NewTask, SpecStatus, SpecTask, Task, TaskPatch,
};
pub use store::{BoardStore, FileBoardStore, MemoryStore};
