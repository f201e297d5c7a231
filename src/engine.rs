use crate::errors::{FilingError, FilingResult};
use crate::models::DriveSnapshot;
use crate::placement::{plan_pass, EngineState, PlacementCommand};
use crate::settings::FilingSettings;
use crate::store::DriveStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    RootCreated { folder_id: String },
    Filed { node_id: String, folder_id: String },
    Failed { node_id: Option<String>, error: String },
}

/// Keeps expense reports that sit directly in the root folder filed into
/// year folders. Each instance owns its own de-duplication state; a fresh
/// instance re-evaluates every report at the root.
#[derive(Clone)]
pub struct FolderPlacementEngine {
    store: Arc<dyn DriveStore>,
    settings: Arc<FilingSettings>,
    state: Arc<Mutex<EngineState>>,
    alive: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl FolderPlacementEngine {
    pub fn new(store: Arc<dyn DriveStore>, settings: FilingSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(EngineState::default())),
            alive: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn processed_ids(&self) -> Vec<String> {
        self.lock_state().processed.iter().cloned().collect()
    }

    pub fn is_processed(&self, node_id: &str) -> bool {
        self.lock_state().processed.contains(node_id)
    }

    /// Runs one pass over `snapshot` and dispatches the resulting store
    /// commands as background tasks. Must be called inside a Tokio runtime.
    pub fn evaluate(&self, snapshot: &DriveSnapshot) -> Vec<JoinHandle<CommandOutcome>> {
        if !self.alive.load(Ordering::SeqCst) {
            return Vec::new();
        }

        let plan = {
            let mut state = self.lock_state();
            let plan = plan_pass(snapshot, &state, &self.settings);
            *state = plan.state.clone();
            plan
        };

        for year in &plan.duplicate_years {
            tracing::warn!(drive_id = %snapshot.drive_id, year = %year, "duplicate year folders under root; using the first");
        }
        for node_id in &plan.left_at_root {
            tracing::warn!(node_id = %node_id, "expense report has no usable periodStart; leaving it at the root");
        }
        if !plan.awaiting_document.is_empty() {
            tracing::debug!(count = plan.awaiting_document.len(), "expense reports waiting for documents to load");
        }
        if !plan.awaiting_bucket.is_empty() {
            tracing::debug!(count = plan.awaiting_bucket.len(), "expense reports waiting for a year folder");
        }

        plan.commands
            .into_iter()
            .map(|command| self.dispatch(command))
            .collect()
    }

    fn dispatch(&self, command: PlacementCommand) -> JoinHandle<CommandOutcome> {
        let engine = self.clone();
        tokio::spawn(async move {
            let node_id = command.node_id().map(ToString::to_string);
            match engine.execute(command).await {
                Ok(outcome) => outcome,
                Err(error) => CommandOutcome::Failed {
                    node_id,
                    error: error.to_string(),
                },
            }
        })
    }

    async fn execute(&self, command: PlacementCommand) -> FilingResult<CommandOutcome> {
        match command {
            PlacementCommand::CreateRoot { drive_id, name } => {
                // The root is requested once per instance, failed or not.
                let folder = self
                    .store
                    .create_folder(&drive_id, &name, None)
                    .await
                    .inspect_err(|error| {
                        tracing::error!(drive_id = %drive_id, folder = %name, error = %error, "failed to create root folder");
                    })?;
                tracing::info!(drive_id = %drive_id, folder_id = %folder.id, "created root folder");
                Ok(CommandOutcome::RootCreated { folder_id: folder.id })
            }
            PlacementCommand::MoveToBucket {
                node_id,
                year,
                folder_id,
            } => {
                if let Err(error) = self.store.move_node(&node_id, &folder_id).await {
                    tracing::warn!(node_id = %node_id, year = %year, error = %error, "failed to move expense report to year folder");
                    self.release(&node_id, None);
                    return Err(error);
                }
                tracing::info!(node_id = %node_id, year = %year, "filed expense report");
                Ok(CommandOutcome::Filed { node_id, folder_id })
            }
            PlacementCommand::CreateBucketAndMove {
                drive_id,
                node_id,
                year,
                root_id,
            } => {
                let folder = match self.store.create_folder(&drive_id, &year, Some(&root_id)).await {
                    Ok(folder) => folder,
                    Err(error) => {
                        tracing::warn!(node_id = %node_id, year = %year, error = %error, "failed to create year folder");
                        self.release(&node_id, Some(&year));
                        return Err(error);
                    }
                };
                self.release_bucket(&year);

                if let Err(error) = self.store.move_node(&node_id, &folder.id).await {
                    tracing::warn!(node_id = %node_id, year = %year, error = %error, "failed to move expense report to new year folder");
                    self.release(&node_id, None);
                    return Err(error);
                }
                tracing::info!(node_id = %node_id, year = %year, folder_id = %folder.id, "created year folder and filed expense report");
                Ok(CommandOutcome::Filed {
                    node_id,
                    folder_id: folder.id,
                })
            }
        }
    }

    /// Clears the processed flag so the next pass retries the node. A torn
    /// down instance leaves its state untouched.
    fn release(&self, node_id: &str, pending_year: Option<&str>) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.lock_state();
        state.processed.remove(node_id);
        if let Some(year) = pending_year {
            state.pending_buckets.remove(year);
        }
    }

    fn release_bucket(&self, year: &str) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        self.lock_state().pending_buckets.remove(year);
    }

    /// Subscription adapter: evaluates the current snapshot, then every
    /// snapshot the store publishes, until shutdown or the store goes away.
    pub async fn run(self, mut receiver: watch::Receiver<DriveSnapshot>) {
        let initial = receiver.borrow_and_update().clone();
        self.evaluate(&initial);

        loop {
            if !self.alive.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = self.shutdown.notified() => break,
                changed = receiver.changed() => {
                    if changed.is_err() {
                        tracing::info!("drive store closed; stopping placement engine");
                        break;
                    }
                    let snapshot = receiver.borrow_and_update().clone();
                    self.evaluate(&snapshot);
                }
            }
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let receiver = self.store.subscribe();
        tokio::spawn(async move {
            engine.run(receiver).await;
        })
    }

    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Evaluates the store's snapshot and waits for the issued commands,
    /// repeating until a pass issues nothing. Returns the number of passes
    /// that issued commands. Failures that the quiescent pass did not retry,
    /// such as a failed root bootstrap, are returned as a store error.
    pub async fn settle(&self, max_passes: usize) -> FilingResult<usize> {
        let mut unresolved: Vec<(Option<String>, String)> = Vec::new();
        for pass in 0..max_passes {
            let handles = self.evaluate(&self.store.snapshot());
            if handles.is_empty() {
                if unresolved.is_empty() {
                    return Ok(pass);
                }
                let details: Vec<String> = unresolved
                    .iter()
                    .map(|(node_id, error)| match node_id {
                        Some(node_id) => format!("{}: {}", node_id, error),
                        None => error.clone(),
                    })
                    .collect();
                return Err(FilingError::Store(format!(
                    "{} placement command(s) failed and were not retried: {}",
                    unresolved.len(),
                    details.join("; ")
                )));
            }

            unresolved.clear();
            for handle in handles {
                let outcome = handle
                    .await
                    .map_err(|error| FilingError::Internal(format!("placement task failed: {}", error)))?;
                if let CommandOutcome::Failed { node_id, error } = outcome {
                    tracing::debug!(node_id = ?node_id, error = %error, "placement command failed");
                    unresolved.push((node_id, error));
                }
            }
        }
        Err(FilingError::Internal(format!(
            "drive did not settle within {} passes",
            max_passes
        )))
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandOutcome, FolderPlacementEngine};
    use crate::drive::fixtures::{file, folder, report};
    use crate::errors::FilingError;
    use crate::models::{DriveSnapshot, Node};
    use crate::settings::FilingSettings;
    use crate::store::{DriveStore, MemoryDriveStore, StoreCall};
    use std::sync::Arc;

    const REPORT: &str = "powerhouse/expense-report";

    fn drive(nodes: Vec<Node>, documents: Vec<crate::models::Document>) -> DriveSnapshot {
        DriveSnapshot {
            drive_id: "drive".to_string(),
            nodes,
            documents,
        }
    }

    fn engine_for(store: &MemoryDriveStore) -> FolderPlacementEngine {
        FolderPlacementEngine::new(Arc::new(store.clone()), FilingSettings::default())
    }

    async fn join_all(handles: Vec<tokio::task::JoinHandle<CommandOutcome>>) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("task joined"));
        }
        outcomes
    }

    fn parent_name(snapshot: &DriveSnapshot, node_id: &str) -> Option<String> {
        let parent = snapshot.node(node_id)?.parent_folder()?;
        snapshot.node(parent).map(|node| node.name().to_string())
    }

    #[tokio::test]
    async fn unchanged_snapshot_issues_no_duplicate_commands() {
        let store = MemoryDriveStore::new(drive(
            vec![
                folder("root", "Expense Reports", None),
                folder("y23", "2023", Some("root")),
                file("a", Some("root"), REPORT),
            ],
            vec![report("a", Some("2023-06-15T00:00:00Z"))],
        ));
        let engine = engine_for(&store);
        let snapshot = store.snapshot();

        let first = engine.evaluate(&snapshot);
        let second = engine.evaluate(&snapshot);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        join_all(first).await;

        assert_eq!(store.calls().len(), 1);
        assert_eq!(parent_name(&store.snapshot(), "a").as_deref(), Some("2023"));
    }

    #[tokio::test]
    async fn converges_to_year_buckets() {
        let store = MemoryDriveStore::new(drive(
            vec![
                folder("root", "Expense Reports", None),
                file("a", Some("root"), REPORT),
                file("b", Some("root"), REPORT),
                file("c", Some("root"), REPORT),
            ],
            vec![
                report("a", Some("2023-06-15T00:00:00Z")),
                report("b", Some("2024-12-31T23:59:59Z")),
                report("c", Some("2024-01-01")),
            ],
        ));
        let engine = engine_for(&store);

        engine.settle(10).await.expect("settles");

        let snapshot = store.snapshot();
        assert_eq!(parent_name(&snapshot, "a").as_deref(), Some("2023"));
        assert_eq!(parent_name(&snapshot, "b").as_deref(), Some("2024"));
        assert_eq!(parent_name(&snapshot, "c").as_deref(), Some("2024"));

        let created_2024 = store
            .calls()
            .into_iter()
            .filter(|call| matches!(call, StoreCall::CreateFolder { name, .. } if name == "2024"))
            .count();
        assert_eq!(created_2024, 1);
    }

    #[tokio::test]
    async fn failed_move_is_retried_on_next_pass() {
        let store = MemoryDriveStore::new(drive(
            vec![
                folder("root", "Expense Reports", None),
                folder("y23", "2023", Some("root")),
                file("a", Some("root"), REPORT),
            ],
            vec![report("a", Some("2023-03-01"))],
        ));
        store.fail_next_moves(1);
        let engine = engine_for(&store);

        let outcomes = join_all(engine.evaluate(&store.snapshot())).await;
        assert!(matches!(outcomes[0], CommandOutcome::Failed { .. }));
        assert!(!engine.is_processed("a"));

        let outcomes = join_all(engine.evaluate(&store.snapshot())).await;
        assert_eq!(
            outcomes,
            vec![CommandOutcome::Filed {
                node_id: "a".to_string(),
                folder_id: "y23".to_string()
            }]
        );
        assert_eq!(parent_name(&store.snapshot(), "a").as_deref(), Some("2023"));
    }

    #[tokio::test]
    async fn failed_bucket_creation_skips_move_and_allows_retry() {
        let store = MemoryDriveStore::new(drive(
            vec![folder("root", "Expense Reports", None), file("a", Some("root"), REPORT)],
            vec![report("a", Some("2022-08-01"))],
        ));
        store.fail_next_creates(1);
        let engine = engine_for(&store);

        let outcomes = join_all(engine.evaluate(&store.snapshot())).await;
        assert!(matches!(outcomes[0], CommandOutcome::Failed { .. }));
        assert!(!store
            .calls()
            .iter()
            .any(|call| matches!(call, StoreCall::MoveNode { .. })));

        engine.settle(5).await.expect("settles after retry");
        assert_eq!(parent_name(&store.snapshot(), "a").as_deref(), Some("2022"));
    }

    #[tokio::test]
    async fn unclassifiable_report_is_never_retried() {
        let store = MemoryDriveStore::new(drive(
            vec![folder("root", "Expense Reports", None), file("a", Some("root"), REPORT)],
            vec![report("a", None)],
        ));
        let engine = engine_for(&store);

        for _ in 0..10 {
            assert!(engine.evaluate(&store.snapshot()).is_empty());
        }
        assert!(engine.is_processed("a"));
        assert!(store.calls().is_empty());
        assert_eq!(parent_name(&store.snapshot(), "a").as_deref(), Some("Expense Reports"));
    }

    #[tokio::test]
    async fn missing_root_is_requested_exactly_once() {
        let store = MemoryDriveStore::new(drive(vec![], vec![]));
        store.fail_next_creates(1);
        let engine = engine_for(&store);
        let snapshot = store.snapshot();

        let mut handles = Vec::new();
        for _ in 0..5 {
            handles.extend(engine.evaluate(&snapshot));
        }
        assert_eq!(handles.len(), 1);
        join_all(handles).await;

        assert!(engine.evaluate(&store.snapshot()).is_empty());
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn settle_reports_failed_root_bootstrap() {
        let store = MemoryDriveStore::new(drive(vec![], vec![]));
        store.fail_next_creates(1);
        let engine = engine_for(&store);

        let error = engine.settle(4).await.expect_err("root creation failed");
        assert!(matches!(error, FilingError::Store(_)));
        assert!(error.to_string().starts_with("STORE_FAILURE:"));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn settle_succeeds_once_failed_moves_are_retried() {
        let store = MemoryDriveStore::new(drive(
            vec![
                folder("root", "Expense Reports", None),
                folder("y23", "2023", Some("root")),
                file("a", Some("root"), REPORT),
            ],
            vec![report("a", Some("2023-03-01"))],
        ));
        store.fail_next_moves(1);
        let engine = engine_for(&store);

        let passes = engine.settle(4).await.expect("settles after retry");
        assert_eq!(passes, 2);
        assert_eq!(parent_name(&store.snapshot(), "a").as_deref(), Some("2023"));
    }

    #[tokio::test]
    async fn fresh_instance_reevaluates_root_reports() {
        let store = MemoryDriveStore::new(drive(
            vec![folder("root", "Expense Reports", None), file("a", Some("root"), REPORT)],
            vec![report("a", None)],
        ));
        let first = engine_for(&store);
        first.evaluate(&store.snapshot());
        assert!(first.is_processed("a"));

        let second = engine_for(&store);
        assert!(second.processed_ids().is_empty());
        second.evaluate(&store.snapshot());
        assert_eq!(second.processed_ids(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn teardown_ignores_late_failures() {
        let store = MemoryDriveStore::new(drive(
            vec![
                folder("root", "Expense Reports", None),
                folder("y23", "2023", Some("root")),
                file("a", Some("root"), REPORT),
            ],
            vec![report("a", Some("2023-03-01"))],
        ));
        store.fail_next_moves(1);
        let engine = engine_for(&store);

        let handles = engine.evaluate(&store.snapshot());
        engine.shutdown();
        join_all(handles).await;

        assert!(engine.is_processed("a"));
        assert!(engine.evaluate(&store.snapshot()).is_empty());
    }

    #[tokio::test]
    async fn subscription_loop_files_new_reports() {
        let store = MemoryDriveStore::new(drive(vec![folder("root", "Expense Reports", None)], vec![]));
        let engine = engine_for(&store);
        let task = engine.start();

        store.replace(drive(
            vec![folder("root", "Expense Reports", None), file("a", Some("root"), REPORT)],
            vec![report("a", Some("2026-05-01T12:00:00Z"))],
        ));

        let mut receiver = store.subscribe();
        let filed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if parent_name(&receiver.borrow_and_update(), "a").as_deref() == Some("2026") {
                    break;
                }
                receiver.changed().await.expect("store alive");
            }
        })
        .await;
        assert!(filed.is_ok());

        engine.shutdown();
        task.await.expect("engine loop exits");
    }
}
