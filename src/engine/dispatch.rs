// src/engine/dispatch.rs

//! Dispatch table: which actions run, at what urgency, for each trigger.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::Condition;
use crate::config::ConfigFile;
use crate::exec::{ActionContext, ActionExecutor};
use crate::types::{TriggerKind, Urgency};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub actions: Vec<String>,
    pub urgency: Urgency,
}

/// Snapshot of the trigger routes taken at daemon start.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    routes: HashMap<TriggerKind, Route>,
}

impl DispatchTable {
    pub fn from_config(config: &ConfigFile) -> Self {
        let t = config.triggers();
        let mut table = Self::default();
        table.insert(TriggerKind::FileChange, t.file_change.actions.clone(), t.file_change.urgency);
        table.insert(TriggerKind::BulkChange, t.bulk_change.actions.clone(), t.bulk_change.urgency);
        table.insert(
            TriggerKind::BuildFailure,
            t.build_failure.actions.clone(),
            t.build_failure.urgency,
        );
        table.insert(TriggerKind::CommitHook, t.commit_hook.actions.clone(), t.commit_hook.urgency);
        // Scheduled tasks carry their own action lists.
        table.insert(TriggerKind::ScheduledTask, Vec::new(), t.scheduled_task.urgency);
        table.insert(
            TriggerKind::ErrorThreshold,
            t.error_threshold.actions.clone(),
            t.error_threshold.urgency,
        );
        table
    }

    pub fn insert(&mut self, kind: TriggerKind, actions: Vec<String>, urgency: Urgency) {
        self.routes.insert(kind, Route { actions, urgency });
    }

    pub fn route(&self, kind: TriggerKind) -> Option<&Route> {
        self.routes.get(&kind)
    }
}

/// Result of one dispatch: which actions succeeded and which failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub trigger: TriggerKind,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cloneable handle every detector uses to run its actions.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    executor: Arc<ActionExecutor>,
    table: Arc<DispatchTable>,
}

impl Dispatcher {
    pub fn new(executor: Arc<ActionExecutor>, table: DispatchTable) -> Self {
        Self {
            executor,
            table: Arc::new(table),
        }
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn context_for(&self, condition: &Condition) -> ActionContext {
        let mut ctx = ActionContext::new(condition.kind(), condition.summary())
            .with_files(condition.files().to_vec());
        if let Some(route) = self.table.route(condition.kind()) {
            ctx = ctx.with_urgency(route.urgency);
        }
        ctx
    }

    /// Run the condition's actions in order. A failing action does not stop
    /// the ones after it.
    pub async fn fire(&self, condition: Condition) -> DispatchReport {
        let trigger = condition.kind();
        let actions = match &condition {
            Condition::ScheduledTask { actions, .. } => actions.clone(),
            _ => self
                .table
                .route(trigger)
                .map(|r| r.actions.clone())
                .unwrap_or_default(),
        };

        let ctx = self.context_for(&condition);
        info!(%trigger, actions = ?actions, message = %ctx.message, "trigger fired");

        let mut report = DispatchReport {
            trigger,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for action in actions {
            match self.executor.execute(&action, &ctx).await {
                Ok(_) => report.succeeded.push(action),
                Err(e) => {
                    warn!(%trigger, action = %action, error = %e, "action failed");
                    report.failed.push(action);
                }
            }
        }

        report
    }
}
