//! Workflow column bootstrap.
//!
//! The runner needs `Queue`, `Agent WIP`, and `Review` to exist. Missing
//! columns are created in their logical position: each goes before the
//! first of its downstream anchors that already exists (`Done` is the final
//! anchor and is never created here), appended when no anchor is present.

use crate::errors::StoreError;

use super::models::{Board, Column, synth_id};
use super::store::BoardStore;

pub const QUEUE_TITLE: &str = "Queue";
pub const WIP_TITLE: &str = "Agent WIP";
pub const REVIEW_TITLE: &str = "Review";
pub const DONE_TITLE: &str = "Done";

/// Resolved ids of the three workflow columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowColumns {
    pub queue: String,
    pub wip: String,
    pub review: String,
}

/// Title-indexed lookup; titles are authoritative, ids are cached.
pub fn resolve_workflow_columns(board: &Board) -> Option<WorkflowColumns> {
    Some(WorkflowColumns {
        queue: board.column_by_title(QUEUE_TITLE)?.id.clone(),
        wip: board.column_by_title(WIP_TITLE)?.id.clone(),
        review: board.column_by_title(REVIEW_TITLE)?.id.clone(),
    })
}

fn insert_before_anchor(board: &mut Board, title: &str, anchors: &[&str]) {
    let column = Column {
        id: synth_id(),
        title: title.to_string(),
        tasks: vec![],
    };
    let position = anchors.iter().find_map(|anchor| {
        board
            .columns
            .iter()
            .position(|c| c.title.eq_ignore_ascii_case(anchor))
    });
    match position {
        Some(idx) => board.columns.insert(idx, column),
        None => board.columns.push(column),
    }
}

/// Make the missing workflow columns exist on `board`. Returns whether
/// anything was added.
pub fn ensure_columns_on(board: &mut Board) -> bool {
    let mut changed = false;
    let plan: [(&str, &[&str]); 3] = [
        (QUEUE_TITLE, &[WIP_TITLE, REVIEW_TITLE, DONE_TITLE]),
        (WIP_TITLE, &[REVIEW_TITLE, DONE_TITLE]),
        (REVIEW_TITLE, &[DONE_TITLE]),
    ];
    for (title, anchors) in plan {
        if board.column_by_title(title).is_none() {
            insert_before_anchor(board, title, anchors);
            changed = true;
        }
    }
    changed
}

/// Fetch the board, create whatever workflow columns are missing, persist,
/// and return the resolved ids.
pub async fn ensure_workflow_columns(
    store: &dyn BoardStore,
) -> Result<WorkflowColumns, StoreError> {
    let mut board = store.get_board().await?;
    if ensure_columns_on(&mut board) {
        store.save_board(&board).await?;
    }
    Ok(resolve_workflow_columns(&board).expect("workflow columns exist after bootstrap"))
}
