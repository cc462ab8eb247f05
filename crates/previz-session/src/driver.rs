//! The session driver: one object the harness drives through a
//! preview session.
//!
//! One session is: reset the graph, run the user script (staging every
//! rendered frame), then on a clean return fit the leaves to the
//! viewport, flatten concats, reprioritise the cache against the new
//! graph, commit staging, and rotate the reader pool. On a script
//! error, staging is discarded and the session returns to idle.

use tracing::{error, info};

use previz_core::{PrevizError, Result};
use previz_engine::cache;
use previz_engine::graph;
use previz_engine::node::Clip;
use previz_engine::ops::ResizeTarget;
use previz_engine::reader;

use crate::control::{ControlMessage, ControlQueue};
use crate::state::SessionPhase;

/// Drives the engine through the session state machine.
pub struct SessionDriver {
    phase: SessionPhase,
    /// Preview panel dimensions; leaves are scaled to fit when set.
    viewport: Option<(u32, u32)>,
    /// The leaves of the most recent successful session, in timestamp
    /// order: what the preview tabs show.
    preview_leaves: Vec<Clip>,
}

impl SessionDriver {
    pub fn new(viewport: Option<(u32, u32)>) -> Self {
        Self {
            phase: SessionPhase::Idle,
            viewport,
            preview_leaves: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn set_viewport(&mut self, viewport: Option<(u32, u32)>) {
        self.viewport = viewport;
    }

    /// The clips being previewed, one per tab.
    pub fn preview_leaves(&self) -> &[Clip] {
        &self.preview_leaves
    }

    fn transition(&mut self, next: SessionPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(PrevizError::CacheInconsistency(format!(
                "illegal session transition {} -> {next}",
                self.phase
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Start a session: discard the old graph and route renders to
    /// staging.
    pub fn begin_script(&mut self) -> Result<()> {
        self.transition(SessionPhase::ScriptRunning)?;
        info!("session started");
        graph::reset();
        cache::with_current(|c| c.set_script_running(true));
        Ok(())
    }

    /// The script returned; finalize or fail accordingly.
    pub fn finish_script(&mut self, outcome: std::result::Result<(), anyhow::Error>) -> Result<()> {
        cache::with_current(|c| c.set_script_running(false));
        match outcome {
            Ok(()) => {
                self.transition(SessionPhase::Finalizing)?;
                self.finalize()
            }
            Err(script_error) => {
                self.transition(SessionPhase::Failed)?;
                error!(error = %script_error, "script produced an error");
                cache::with_current(|c| c.empty_staging());
                self.preview_leaves.clear();
                self.transition(SessionPhase::Idle)
            }
        }
    }

    /// Run `script` through a full session.
    pub fn run_session<F>(&mut self, script: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), anyhow::Error>,
    {
        self.begin_script()?;
        let outcome = script();
        self.finish_script(outcome)
    }

    /// The fix-up / flatten / reprioritise / commit pipeline.
    fn finalize(&mut self) -> Result<()> {
        let graph = graph::current();

        // Scale each leaf to fit the preview panel. The resize fusion
        // rules make this transient: it annihilates against a later
        // user resize instead of permanently altering the DAG.
        if let Some(viewport) = self.viewport {
            for leaf in graph.leaves() {
                let fitted = fit_to_viewport(leaf.size(), viewport);
                if fitted != leaf.size() {
                    let resized =
                        leaf.resize(ResizeTarget::Size(fitted.0, fitted.1))?;
                    resized.set_timestamp(leaf.timestamp());
                }
            }
        }

        graph.unify_preview_nodes();
        graph.flatten_concats()?;

        cache::with_current(|c| c.reprioritise(&graph))?;
        cache::with_current(|c| c.commit())?;

        // Recycle this session's readers for the next one.
        reader::with_registry(|registry| registry.rotate());

        self.preview_leaves = graph.leaves();
        self.transition(SessionPhase::Previewing)?;
        info!(leaves = self.preview_leaves.len(), "session ready for preview");
        Ok(())
    }

    /// Handle any pending control messages. Returns false when the
    /// harness asked for shutdown.
    pub fn pump_control(&mut self, queue: &ControlQueue) -> Result<bool> {
        while let Some(message) = queue.poll() {
            match message {
                ControlMessage::Rerun => {
                    if self.phase == SessionPhase::Previewing {
                        self.transition(SessionPhase::Idle)?;
                    }
                }
                ControlMessage::Shutdown => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl Default for SessionDriver {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Largest size with `target`'s aspect ratio fitting inside `panel`.
fn fit_to_viewport(target: (u32, u32), panel: (u32, u32)) -> (u32, u32) {
    let scale = (panel.0 as f64 / target.0 as f64).min(panel.1 as f64 / target.1 as f64);
    (
        ((target.0 as f64 * scale).round() as u32).max(1),
        ((target.1 as f64 * scale).round() as u32).max(1),
    )
}
