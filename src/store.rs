use crate::errors::{FilingError, FilingResult};
use crate::models::{DriveSnapshot, FolderNode, Node};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

pub type StoreFuture<T> = Pin<Box<dyn Future<Output = FilingResult<T>> + Send + 'static>>;

/// Boundary to the host's document/drive store. The engine only reads
/// snapshots and submits mutation requests through this trait.
pub trait DriveStore: Send + Sync {
    fn snapshot(&self) -> DriveSnapshot;
    fn subscribe(&self) -> watch::Receiver<DriveSnapshot>;
    fn create_folder(&self, drive_id: &str, name: &str, parent_id: Option<&str>) -> StoreFuture<FolderNode>;
    fn move_node(&self, node_id: &str, destination_id: &str) -> StoreFuture<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateFolder { name: String, parent_id: Option<String> },
    MoveNode { node_id: String, destination_id: String },
}

#[derive(Debug, Default)]
struct FaultPlan {
    failing_creates: usize,
    failing_moves: usize,
}

struct MemoryInner {
    drive: Mutex<DriveSnapshot>,
    sender: watch::Sender<DriveSnapshot>,
    faults: Mutex<FaultPlan>,
    calls: Mutex<Vec<StoreCall>>,
}

/// In-process [`DriveStore`] holding a single drive. Every applied mutation
/// publishes a fresh snapshot to subscribers.
#[derive(Clone)]
pub struct MemoryDriveStore {
    inner: Arc<MemoryInner>,
}

impl MemoryDriveStore {
    pub fn new(snapshot: DriveSnapshot) -> Self {
        let (sender, _) = watch::channel(snapshot.clone());
        Self {
            inner: Arc::new(MemoryInner {
                drive: Mutex::new(snapshot),
                sender,
                faults: Mutex::new(FaultPlan::default()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Makes the next `count` folder creations reject.
    pub fn fail_next_creates(&self, count: usize) {
        lock(&self.inner.faults).failing_creates = count;
    }

    /// Makes the next `count` moves reject.
    pub fn fail_next_moves(&self, count: usize) {
        lock(&self.inner.faults).failing_moves = count;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.inner.calls).clone()
    }

    /// Replaces the drive contents, as if another client had edited it.
    pub fn replace(&self, snapshot: DriveSnapshot) {
        *lock(&self.inner.drive) = snapshot.clone();
        self.inner.sender.send_replace(snapshot);
    }
}

impl MemoryInner {
    fn apply_create(&self, drive_id: &str, name: &str, parent_id: Option<&str>) -> FilingResult<FolderNode> {
        lock(&self.calls).push(StoreCall::CreateFolder {
            name: name.to_string(),
            parent_id: parent_id.map(ToString::to_string),
        });
        take_fault(&mut lock(&self.faults).failing_creates, "create folder")?;

        let mut drive = lock(&self.drive);
        if drive.drive_id != drive_id {
            return Err(FilingError::NotFound(format!("Drive {} does not exist", drive_id)));
        }
        if let Some(parent) = parent_id {
            if drive.node(parent).and_then(Node::as_folder).is_none() {
                return Err(FilingError::NotFound(format!("Parent folder {} does not exist", parent)));
            }
        }

        let folder = FolderNode {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            parent_folder: parent_id.map(ToString::to_string),
        };
        drive.nodes.push(Node::Folder(folder.clone()));
        self.sender.send_replace(drive.clone());
        Ok(folder)
    }

    fn apply_move(&self, node_id: &str, destination_id: &str) -> FilingResult<()> {
        lock(&self.calls).push(StoreCall::MoveNode {
            node_id: node_id.to_string(),
            destination_id: destination_id.to_string(),
        });
        take_fault(&mut lock(&self.faults).failing_moves, "move node")?;

        let mut drive = lock(&self.drive);
        if drive.node(destination_id).and_then(Node::as_folder).is_none() {
            return Err(FilingError::NotFound(format!("Destination folder {} does not exist", destination_id)));
        }
        if is_within(&drive, destination_id, node_id) {
            return Err(FilingError::Store(format!(
                "Cannot move {} into its own subtree",
                node_id
            )));
        }

        let node = drive
            .nodes
            .iter_mut()
            .find(|node| node.id() == node_id)
            .ok_or_else(|| FilingError::NotFound(format!("Node {} does not exist", node_id)))?;
        node.set_parent_folder(Some(destination_id.to_string()));
        self.sender.send_replace(drive.clone());
        Ok(())
    }
}

impl DriveStore for MemoryDriveStore {
    fn snapshot(&self) -> DriveSnapshot {
        lock(&self.inner.drive).clone()
    }

    fn subscribe(&self) -> watch::Receiver<DriveSnapshot> {
        self.inner.sender.subscribe()
    }

    fn create_folder(&self, drive_id: &str, name: &str, parent_id: Option<&str>) -> StoreFuture<FolderNode> {
        let inner = self.inner.clone();
        let drive_id = drive_id.to_string();
        let name = name.to_string();
        let parent_id = parent_id.map(ToString::to_string);
        Box::pin(async move {
            tokio::task::yield_now().await;
            inner.apply_create(&drive_id, &name, parent_id.as_deref())
        })
    }

    fn move_node(&self, node_id: &str, destination_id: &str) -> StoreFuture<()> {
        let inner = self.inner.clone();
        let node_id = node_id.to_string();
        let destination_id = destination_id.to_string();
        Box::pin(async move {
            tokio::task::yield_now().await;
            inner.apply_move(&node_id, &destination_id)
        })
    }
}

fn take_fault(remaining: &mut usize, operation: &str) -> FilingResult<()> {
    if *remaining == 0 {
        return Ok(());
    }
    *remaining -= 1;
    Err(FilingError::Store(format!("Injected failure during {}", operation)))
}

/// True when `candidate` is `ancestor` or sits somewhere below it.
fn is_within(drive: &DriveSnapshot, candidate: &str, ancestor: &str) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(candidate);
    while let Some(current) = cursor {
        if current == ancestor {
            return true;
        }
        if !seen.insert(current) {
            return false;
        }
        cursor = drive.node(current).and_then(Node::parent_folder);
    }
    false
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
