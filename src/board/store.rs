//! The pluggable board store.
//!
//! All board access goes through [`BoardStore`]. Three implementations
//! exist: the remote HTTP CRUD client (`http.rs`), a local JSON file store,
//! and an in-memory store for tests. The file and memory stores share the
//! same mutation helpers so their semantics cannot drift apart.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::StoreError;

use super::models::{
    BacklogPatch, BacklogProject, Board, Column, NewTask, Task, TaskPatch, now_ts, synth_id,
};

#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn get_board(&self) -> Result<Board, StoreError>;

    /// Full replace of columns and initiatives. The backlog is server-owned
    /// and preserved from the stored document, never taken from `board`.
    async fn save_board(&self, board: &Board) -> Result<(), StoreError>;

    async fn list_backlog(&self) -> Result<Vec<BacklogProject>, StoreError>;
    async fn update_backlog(&self, id: &str, patch: &BacklogPatch) -> Result<(), StoreError>;

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;
    async fn create_task(&self, task: &NewTask) -> Result<Task, StoreError>;
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError>;
    async fn move_task(&self, id: &str, target_column_id: &str) -> Result<(), StoreError>;
    async fn delete_task(&self, id: &str) -> Result<(), StoreError>;

    async fn create_column(&self, title: &str) -> Result<Column, StoreError>;
    async fn list_columns(&self) -> Result<Vec<Column>, StoreError>;
}

// ── Shared mutation helpers ───────────────────────────────────────────

fn apply_save(stored: &mut Board, incoming: &Board) {
    stored.columns = incoming.columns.clone();
    stored.initiatives = incoming.initiatives.clone();
    // backlog stays as stored: it is server-owned.
}

fn apply_update_backlog(
    board: &mut Board,
    id: &str,
    patch: &BacklogPatch,
) -> Result<(), StoreError> {
    let project = board
        .backlog
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| StoreError::ProjectNotFound { id: id.to_string() })?;
    if let Some(status) = patch.spec_status {
        project.spec_status = status;
    }
    if let Some(ref spec) = patch.spec {
        project.spec = Some(spec.clone());
    }
    if let Some(ref tasks) = patch.spec_tasks {
        project.spec_tasks = tasks.clone();
    }
    Ok(())
}

fn apply_create_task(board: &mut Board, new: &NewTask) -> Result<Task, StoreError> {
    let column = board
        .columns
        .iter_mut()
        .find(|c| c.id == new.column_id)
        .ok_or_else(|| StoreError::ColumnNotFound {
            id: new.column_id.clone(),
        })?;
    let task = Task {
        id: synth_id(),
        title: new.title.clone(),
        description: new.description.clone(),
        color: new.color,
        created_at: now_ts(),
        moved_at: None,
    };
    column.tasks.push(task.clone());
    Ok(task)
}

fn apply_update_task(board: &mut Board, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
    let task = board
        .columns
        .iter_mut()
        .flat_map(|c| c.tasks.iter_mut())
        .find(|t| t.id == id)
        .ok_or_else(|| StoreError::TaskNotFound { id: id.to_string() })?;
    if let Some(ref title) = patch.title {
        task.title = title.clone();
    }
    if let Some(ref description) = patch.description {
        task.description = description.clone();
    }
    if let Some(color) = patch.color {
        task.color = color;
    }
    Ok(())
}

fn apply_move_task(board: &mut Board, id: &str, target: &str) -> Result<(), StoreError> {
    if !board.columns.iter().any(|c| c.id == target) {
        return Err(StoreError::ColumnNotFound {
            id: target.to_string(),
        });
    }
    let mut moved = None;
    for column in &mut board.columns {
        if let Some(pos) = column.tasks.iter().position(|t| t.id == id) {
            moved = Some(column.tasks.remove(pos));
            break;
        }
    }
    let mut task = moved.ok_or_else(|| StoreError::TaskNotFound { id: id.to_string() })?;
    task.moved_at = Some(now_ts());
    board
        .columns
        .iter_mut()
        .find(|c| c.id == target)
        .expect("target column checked above")
        .tasks
        .push(task);
    Ok(())
}

fn apply_delete_task(board: &mut Board, id: &str) -> Result<(), StoreError> {
    for column in &mut board.columns {
        if let Some(pos) = column.tasks.iter().position(|t| t.id == id) {
            column.tasks.remove(pos);
            return Ok(());
        }
    }
    Err(StoreError::TaskNotFound { id: id.to_string() })
}

fn apply_create_column(board: &mut Board, title: &str) -> Column {
    let column = Column {
        id: synth_id(),
        title: title.to_string(),
        tasks: vec![],
    };
    board.columns.push(column.clone());
    column
}

// ── In-memory store ───────────────────────────────────────────────────

/// In-process store, primarily for tests and loop-level scenarios.
#[derive(Default)]
pub struct MemoryStore {
    board: Mutex<Board>,
}

impl MemoryStore {
    pub fn new(board: Board) -> Self {
        Self {
            board: Mutex::new(board),
        }
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&mut Board) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut board = self.board.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut board)
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn get_board(&self) -> Result<Board, StoreError> {
        self.with(|b| Ok(b.clone()))
    }

    async fn save_board(&self, board: &Board) -> Result<(), StoreError> {
        self.with(|b| {
            apply_save(b, board);
            Ok(())
        })
    }

    async fn list_backlog(&self) -> Result<Vec<BacklogProject>, StoreError> {
        self.with(|b| Ok(b.backlog.clone()))
    }

    async fn update_backlog(&self, id: &str, patch: &BacklogPatch) -> Result<(), StoreError> {
        self.with(|b| apply_update_backlog(b, id, patch))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.with(|b| Ok(b.columns.iter().flat_map(|c| c.tasks.clone()).collect()))
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, StoreError> {
        self.with(|b| apply_create_task(b, task))
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        self.with(|b| apply_update_task(b, id, patch))
    }

    async fn move_task(&self, id: &str, target_column_id: &str) -> Result<(), StoreError> {
        self.with(|b| apply_move_task(b, id, target_column_id))
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.with(|b| apply_delete_task(b, id))
    }

    async fn create_column(&self, title: &str) -> Result<Column, StoreError> {
        self.with(|b| Ok(apply_create_column(b, title)))
    }

    async fn list_columns(&self) -> Result<Vec<Column>, StoreError> {
        self.with(|b| Ok(b.columns.clone()))
    }
}

// ── Local file store ──────────────────────────────────────────────────

/// JSON-file-backed store. Every mutation is a read-modify-write under an
/// async mutex, persisted atomically (temp file + rename).
pub struct FileBoardStore {
    path: PathBuf,
    guard: tokio::sync::Mutex<()>,
}

impl FileBoardStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: tokio::sync::Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Board, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Board::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, board: &Board) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(board)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    async fn with<T>(
        &self,
        f: impl FnOnce(&mut Board) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.guard.lock().await;
        let mut board = self.load()?;
        let out = f(&mut board)?;
        self.persist(&board)?;
        Ok(out)
    }
}

#[async_trait]
impl BoardStore for FileBoardStore {
    async fn get_board(&self) -> Result<Board, StoreError> {
        let _guard = self.guard.lock().await;
        self.load()
    }

    async fn save_board(&self, board: &Board) -> Result<(), StoreError> {
        self.with(|b| {
            apply_save(b, board);
            Ok(())
        })
        .await
    }

    async fn list_backlog(&self) -> Result<Vec<BacklogProject>, StoreError> {
        let _guard = self.guard.lock().await;
        Ok(self.load()?.backlog)
    }

    async fn update_backlog(&self, id: &str, patch: &BacklogPatch) -> Result<(), StoreError> {
        self.with(|b| apply_update_backlog(b, id, patch)).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let _guard = self.guard.lock().await;
        Ok(self
            .load()?
            .columns
            .into_iter()
            .flat_map(|c| c.tasks)
            .collect())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, StoreError> {
        self.with(|b| apply_create_task(b, task)).await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        self.with(|b| apply_update_task(b, id, patch)).await
    }

    async fn move_task(&self, id: &str, target_column_id: &str) -> Result<(), StoreError> {
        self.with(|b| apply_move_task(b, id, target_column_id)).await
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.with(|b| apply_delete_task(b, id)).await
    }

    async fn create_column(&self, title: &str) -> Result<Column, StoreError> {
        self.with(|b| Ok(apply_create_column(b, title))).await
    }

    async fn list_columns(&self) -> Result<Vec<Column>, StoreError> {
        let _guard = self.guard.lock().await;
        Ok(self.load()?.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::models::SpecStatus;

    fn board_with_columns() -> Board {
        Board {
            columns: vec![
                Column {
                    id: "c1".into(),
                    title: "Queue".into(),
                    tasks: vec![],
                },
                Column {
                    id: "c2".into(),
                    title: "Review".into(),
                    tasks: vec![],
                },
            ],
            initiatives: vec![],
            backlog: vec![BacklogProject {
                id: "p1".into(),
                title: "Demo".into(),
                description: String::new(),
                github_link: None,
                documents: vec![],
                spec_status: SpecStatus::Generating,
                spec: None,
                spec_tasks: vec![],
                created_at: now_ts(),
            }],
        }
    }

    #[tokio::test]
    async fn memory_store_task_lifecycle() {
        let store = MemoryStore::new(board_with_columns());
        let task = store
            .create_task(&NewTask {
                column_id: "c1".into(),
                title: "Implement login".into(),
                description: "add OAuth".into(),
                color: 1,
            })
            .await
            .unwrap();
        assert!(task.moved_at.is_none());

        store.move_task(&task.id, "c2").await.unwrap();
        let board = store.get_board().await.unwrap();
        let (column, moved) = board.find_task(&task.id).unwrap();
        assert_eq!(column.id, "c2");
        assert!(moved.moved_at.is_some());

        store.delete_task(&task.id).await.unwrap();
        assert!(store.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn move_to_unknown_column_fails_without_losing_task() {
        let store = MemoryStore::new(board_with_columns());
        let task = store
            .create_task(&NewTask {
                column_id: "c1".into(),
                title: "t".into(),
                description: String::new(),
                color: 0,
            })
            .await
            .unwrap();
        let err = store.move_task(&task.id, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound { .. }));
        assert_eq!(store.list_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_board_preserves_backlog() {
        let store = MemoryStore::new(board_with_columns());
        let mut incoming = store.get_board().await.unwrap();
        incoming.backlog.clear();
        incoming.columns.push(Column {
            id: "c3".into(),
            title: "Agent WIP".into(),
            tasks: vec![],
        });
        store.save_board(&incoming).await.unwrap();

        let board = store.get_board().await.unwrap();
        assert_eq!(board.columns.len(), 3);
        assert_eq!(board.backlog.len(), 1, "backlog is server-owned");
    }

    #[tokio::test]
    async fn update_backlog_patches_only_given_fields() {
        let store = MemoryStore::new(board_with_columns());
        store
            .update_backlog(
                "p1",
                &BacklogPatch {
                    spec_status: Some(SpecStatus::Ready),
                    spec: Some("# Spec".into()),
                    spec_tasks: None,
                },
            )
            .await
            .unwrap();
        let project = &store.list_backlog().await.unwrap()[0];
        assert_eq!(project.spec_status, SpecStatus::Ready);
        assert_eq!(project.spec.as_deref(), Some("# Spec"));
        assert_eq!(project.title, "Demo");
    }

    #[tokio::test]
    async fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");

        {
            let store = FileBoardStore::new(path.clone());
            assert!(store.get_board().await.unwrap().columns.is_empty());
            store.create_column("Queue").await.unwrap();
        }

        // A fresh store instance sees the persisted column.
        let store = FileBoardStore::new(path);
        let columns = store.list_columns().await.unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].title, "Queue");
    }

    #[tokio::test]
    async fn file_store_update_task_is_field_wise() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBoardStore::new(dir.path().join("board.json"));
        let column = store.create_column("Queue").await.unwrap();
        let task = store
            .create_task(&NewTask {
                column_id: column.id,
                title: "old".into(),
                description: "keep me".into(),
                color: 3,
            })
            .await
            .unwrap();

        store
            .update_task(
                &task.id,
                &TaskPatch {
                    title: Some("new".into()),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();

        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks[0].title, "new");
        assert_eq!(tasks[0].description, "keep me");
        assert_eq!(tasks[0].color, 3);
    }
}
