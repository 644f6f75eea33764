//! Single-writer refresh queue.
//!
//! One task owns the [`Pipeline`] and runs refreshes strictly one after the
//! other, so the periodic trigger and on-demand requests never write the
//! export file or redefine the analytics table concurrently. Readers use
//! [`RefreshHandle::last_completed`], which only changes after a run ends.
//!
//! The queue holds at most one pending request. A fire-and-forget request
//! that finds the queue full is coalesced into the pending one.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::pipeline::{Pipeline, RefreshReport, RefreshTrigger};

struct RefreshRequest {
    trigger: RefreshTrigger,
    reply: Option<oneshot::Sender<Result<RefreshReport>>>,
}

/// Cloneable handle to the refresh task.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshRequest>,
    last: Arc<RwLock<Option<RefreshReport>>>,
}

/// Start the refresh task. It runs until every handle is dropped.
pub fn spawn_refresher(pipeline: Pipeline) -> (RefreshHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<RefreshRequest>(1);
    let last: Arc<RwLock<Option<RefreshReport>>> = Arc::new(RwLock::new(None));
    let snapshot = last.clone();

    let task = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let result = pipeline.run(request.trigger).await;
            match &result {
                Ok(report) => {
                    *snapshot.write().await = Some(report.clone());
                }
                Err(e) => {
                    error!(trigger = ?request.trigger, error = %format!("{:#}", e), "refresh failed");
                }
            }
            if let Some(reply) = request.reply {
                // The requester may have gone away; nothing to do then.
                let _ = reply.send(result);
            }
        }
        debug!("refresh task stopped");
    });

    (RefreshHandle { tx, last }, task)
}

impl RefreshHandle {
    /// Queue a refresh and wait for its report.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<RefreshReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RefreshRequest {
                trigger,
                reply: Some(reply),
            })
            .await
            .map_err(|_| anyhow!("refresh task is not running"))?;
        rx.await
            .map_err(|_| anyhow!("refresh task stopped before replying"))?
    }

    /// Queue a refresh without waiting. Returns `false` when the request was
    /// coalesced into one already pending (or the task is gone).
    pub fn request(&self, trigger: RefreshTrigger) -> bool {
        match self.tx.try_send(RefreshRequest {
            trigger,
            reply: None,
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(?trigger, "refresh already pending, request coalesced");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(?trigger, "refresh task is not running");
                false
            }
        }
    }

    /// Report of the most recent run that finished without a local error.
    pub async fn last_completed(&self) -> Option<RefreshReport> {
        self.last.read().await.clone()
    }
}
