use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use logictree::engine::{CheckRequest, RuntimeEvent, TriggerRequest, WorkerRequest};
use logictree::exec::{BackendFuture, ExecutorBackend};
use logictree::plugin::builtin::checkers::constant_outcome;
use logictree::plugin::{CheckOutcome, Worker};
use logictree::tree::{NodeIndex, WorkerId};
use logictree::trigger::TriggerId;

/// A fake executor that:
/// - records everything it was asked to do, as short strings
///   (`check:<id>`, `cancel:<node>`, `worker:<event>:<id>`, `arm:<name>`, ...)
/// - immediately completes each check, with a scripted outcome by node id or
///   else the check's parameters read as a constant
/// - immediately finishes each worker.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, CheckOutcome>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
        }
    }

    pub fn with_outcome(mut self, node_id: &str, outcome: CheckOutcome) -> Self {
        self.outcomes.insert(node_id.to_string(), outcome);
        self
    }

    fn record(&self, entry: String) {
        self.executed.lock().unwrap().push(entry);
    }
}

impl ExecutorBackend for FakeExecutor {
    fn start_check(&mut self, request: CheckRequest) -> BackendFuture<'_> {
        self.record(format!("check:{}", request.id));
        let outcome = self
            .outcomes
            .get(&request.id)
            .cloned()
            .unwrap_or_else(|| constant_outcome(&request.parameters));
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            tx.send(RuntimeEvent::CheckCompleted {
                node: request.node,
                generation: request.generation,
                outcome,
            })
            .await
            .map_err(anyhow::Error::from)?;
            Ok(())
        })
    }

    fn cancel_check(&mut self, node: NodeIndex, _generation: u64) -> BackendFuture<'_> {
        self.record(format!("cancel:{node}"));
        Box::pin(async { Ok(()) })
    }

    fn exec_worker(&mut self, request: WorkerRequest) -> BackendFuture<'_> {
        self.record(format!("worker:{}:{}", request.event.name, request.node_id));
        let tx = self.runtime_tx.clone();
        Box::pin(async move {
            tx.send(RuntimeEvent::WorkerFinished {
                worker: request.worker,
                sender: request.sender,
            })
            .await
            .map_err(anyhow::Error::from)?;
            Ok(())
        })
    }

    fn break_worker(
        &mut self,
        _worker: WorkerId,
        _sender: NodeIndex,
        _plugin: Arc<dyn Worker>,
        node_id: String,
    ) -> BackendFuture<'_> {
        self.record(format!("break:{node_id}"));
        Box::pin(async { Ok(()) })
    }

    fn arm_trigger(&mut self, request: TriggerRequest) -> BackendFuture<'_> {
        self.record(format!("arm:{}", request.name));
        Box::pin(async { Ok(()) })
    }

    fn disarm_trigger(&mut self, trigger: TriggerId) -> BackendFuture<'_> {
        self.record(format!("disarm:{trigger}"));
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&mut self) -> BackendFuture<'_> {
        self.record("shutdown".to_string());
        Box::pin(async { Ok(()) })
    }
}
