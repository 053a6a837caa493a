//! The pool handle.
//!
//! [`WorkerPool`] is a cheap clonable front for the dispatch loop. Every
//! request method returns immediately with a [`Reply`]; the response arrives
//! whenever a worker produces it. Dropping the last handle shuts the pool
//! down in the background; [`WorkerPool::shutdown`] does the same but waits
//! for the workers to be reaped.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use pyscout_core::message::{RequestPayload, SourceContext, SymbolKind, WireRequest};

use crate::config::PyscoutConfig;
use crate::error::{PyscoutError, PyscoutResult};
use crate::pyenv;
use crate::pyworker;

use super::dispatcher::{Dispatcher, PoolCommand};
use super::reply::Reply;
use super::supervisor::Supervisor;

// ============================================================================
// WorkerPool
// ============================================================================

#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<PoolCommand>,
}

impl WorkerPool {
    /// Discovers a Python interpreter and starts the configured number of
    /// workers running the embedded worker script.
    pub async fn start(config: &PyscoutConfig) -> PyscoutResult<WorkerPool> {
        Self::start_with_script(config, pyworker::WORKER_SCRIPT).await
    }

    /// Starts the pool with an alternative worker script.
    pub(crate) async fn start_with_script(
        config: &PyscoutConfig,
        script_source: &str,
    ) -> PyscoutResult<WorkerPool> {
        config.validate()?;
        let python = pyenv::discover(config.python.as_deref())?;
        let (supervisor, listeners) = Supervisor::start(config, python, script_source).await?;

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(Dispatcher::new(supervisor).run(listeners, commands_rx, events_rx, events_tx));
        Ok(WorkerPool { commands })
    }

    pub fn create_project(&self, project_root: impl Into<String>) -> Reply {
        self.send(RequestPayload::CreateProject {
            project_root: project_root.into(),
        })
    }

    pub fn destroy_project(&self, project_root: impl Into<String>) -> Reply {
        self.send(RequestPayload::DestroyProject {
            project_root: project_root.into(),
        })
    }

    pub fn rebuild_symbol_index(&self, project_root: impl Into<String>) -> Reply {
        self.send(RequestPayload::RebuildSymbolIndex {
            project_root: project_root.into(),
        })
    }

    pub fn update_symbol_index(&self, file_path: impl Into<String>) -> Reply {
        self.send(RequestPayload::UpdateSymbolIndex {
            file_path: file_path.into(),
        })
    }

    pub fn parse_file(&self, file_path: impl Into<String>, module_name: Option<String>) -> Reply {
        self.send(RequestPayload::ParseFile {
            file_path: file_path.into(),
            module_name,
        })
    }

    pub fn completion(&self, context: SourceContext) -> Reply {
        self.send(RequestPayload::Completion { context })
    }

    pub fn tooltip(&self, context: SourceContext) -> Reply {
        self.send(RequestPayload::Tooltip { context })
    }

    pub fn definition_location(&self, context: SourceContext) -> Reply {
        self.send(RequestPayload::DefinitionLocation { context })
    }

    pub fn search(
        &self,
        query: impl Into<String>,
        file_path: Option<String>,
        symbol_kind: Option<SymbolKind>,
    ) -> Reply {
        self.send(RequestPayload::Search {
            query: query.into(),
            file_path,
            symbol_kind,
        })
    }

    /// Stops the pool and waits for every worker to be reaped. Outstanding
    /// replies resolve as lost.
    pub async fn shutdown(&self) -> PyscoutResult<()> {
        let (done, waiter) = oneshot::channel();
        self.commands
            .send(PoolCommand::Shutdown { done })
            .map_err(|_| PyscoutError::PoolClosed)?;
        waiter.await.map_err(|_| PyscoutError::PoolClosed)
    }

    fn send(&self, payload: RequestPayload) -> Reply {
        let (tx, reply) = Reply::channel();
        let request = WireRequest::new(payload);
        let command = PoolCommand::Send { request, reply: tx };
        if self.commands.send(command).is_err() {
            debug!("worker pool is closed; reply will resolve as lost");
        }
        reply
    }
}

// ============================================================================
// Tests
// ============================================================================
