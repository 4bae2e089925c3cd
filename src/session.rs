//! Per-session viewer state.
//!
//! Each browser session owns one [`Session`]: the chosen variable, the
//! selection map derived from the controls, and the two display panels. The
//! phase moves `Idle -> Selecting -> Resolved -> Fetching -> Displayed | Failed`
//! and `reset` returns it to `Idle` from anywhere.
//!
//! Fetches run outside the store lock. [`Session::begin_fetch`] hands out a
//! [`FetchTicket`] carrying a snapshot of the selection; results recorded
//! against a ticket issued before the last reset are dropped.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dataset::Metadata;
use crate::error::{Result, ViewerError};
use crate::render::PlotResult;
use crate::selection::{
    build_checklist, build_selection, Checklist, ControlError, SelectionMap, SelectionOutcome,
    UserSelection,
};
use crate::stats::StatsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Selecting,
    Resolved,
    Fetching,
    Displayed,
    Failed,
}

/// An error shown in place of a panel's content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelError {
    pub kind: String,
    pub message: String,
}

impl From<&ViewerError> for PanelError {
    fn from(error: &ViewerError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Statistics panel content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsPanel {
    Shown(StatsResult),
    Error(PanelError),
}

/// What the plot panel currently shows; the PNG itself is never kept
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotPanel {
    pub extent: [f64; 4],
    pub title: String,
    pub png_bytes: usize,
}

/// Snapshot taken when a fetch starts
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub variable: String,
    pub selection: SelectionMap,
    generation: u64,
}

/// Answer to a `Reset` action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetResult {
    pub selection: SelectionMap,
    pub variable: Option<String>,
    pub stats: Option<StatsPanel>,
    pub plot: Option<PlotPanel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub variable: Option<String>,
    pub checklist: Option<Checklist>,
    pub selection: SelectionMap,
    pub control_errors: Vec<ControlError>,
    pub stats: Option<StatsPanel>,
    pub plot: Option<PlotPanel>,
    /// Why the last fetch failed, if it did
    pub last_failure: Option<PanelError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phase: SessionPhase::Idle,
            variable: None,
            checklist: None,
            selection: SelectionMap::default(),
            control_errors: Vec::new(),
            stats: None,
            plot: None,
            last_failure: None,
            created_at: now,
            updated_at: now,
            generation: 0,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Pick a variable; the previous selection no longer applies
    pub fn choose_variable(&mut self, metadata: &Metadata, variable: &str) -> Result<Checklist> {
        let checklist = build_checklist(metadata, variable)?;

        self.variable = Some(variable.to_string());
        self.checklist = Some(checklist.clone());
        self.selection = SelectionMap::new(variable);
        self.control_errors.clear();
        self.phase = SessionPhase::Selecting;
        self.touch();
        Ok(checklist)
    }

    /// Rebuild the selection map from the submitted control state
    pub fn apply_selection(
        &mut self,
        metadata: &Metadata,
        input: &UserSelection,
    ) -> Result<SelectionOutcome> {
        let mut input = input.clone();
        if input.selected_variable.is_none() {
            input.selected_variable = self.variable.clone();
        }
        if let Some(variable) = input.selected_variable.as_deref() {
            if self.variable.as_deref() != Some(variable) {
                self.choose_variable(metadata, variable)?;
            }
        }

        let outcome = build_selection(metadata, &input)?;

        self.selection = outcome.selection.clone();
        self.control_errors = outcome.control_errors.clone();
        self.phase = if self.selection.is_empty() {
            SessionPhase::Selecting
        } else {
            SessionPhase::Resolved
        };
        self.touch();

        debug!(
            session = %self.id,
            entries = self.selection.len(),
            control_errors = self.control_errors.len(),
            "Selection rebuilt"
        );
        Ok(outcome)
    }

    /// Start a fetch against the current selection
    pub fn begin_fetch(&mut self) -> Result<FetchTicket> {
        let variable = self.variable.clone().ok_or_else(|| ViewerError::InvalidParameter {
            param: "variable".to_string(),
            message: "no variable is selected".to_string(),
        })?;
        if self.selection.is_empty() {
            return Err(ViewerError::InvalidParameter {
                param: "selection".to_string(),
                message: format!("no dimension of {} is selected", variable),
            });
        }

        self.phase = SessionPhase::Fetching;
        self.touch();
        Ok(FetchTicket {
            variable,
            selection: self.selection.clone(),
            generation: self.generation,
        })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
    }

    fn finish(&mut self, error: Option<PanelError>) {
        self.phase = if error.is_some() {
            SessionPhase::Failed
        } else {
            SessionPhase::Displayed
        };
        self.last_failure = error;
        self.touch();
    }

    /// Record a `ShowStats` outcome; false when the ticket predates a reset
    pub fn record_stats(&mut self, ticket: &FetchTicket, result: &Result<StatsResult>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        match result {
            Ok(stats) => {
                self.stats = Some(StatsPanel::Shown(*stats));
                self.finish(None);
            }
            Err(e) => {
                let error = PanelError::from(e);
                self.stats = Some(StatsPanel::Error(error.clone()));
                self.finish(Some(error));
            }
        }
        true
    }

    /// Record a `ShowPlot` outcome; a failed plot hides the panel
    pub fn record_plot(&mut self, ticket: &FetchTicket, result: &Result<PlotResult>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        match result {
            Ok(plot) => {
                self.plot = Some(PlotPanel {
                    extent: plot.extent,
                    title: plot.title.clone(),
                    png_bytes: plot.png.len(),
                });
                self.finish(None);
            }
            Err(e) => {
                self.plot = None;
                self.finish(Some(PanelError::from(e)));
            }
        }
        true
    }

    /// Return to `Idle`, whatever the current phase
    pub fn reset(&mut self) -> ResetResult {
        self.phase = SessionPhase::Idle;
        self.variable = None;
        self.checklist = None;
        self.selection = SelectionMap::default();
        self.control_errors.clear();
        self.stats = None;
        self.plot = None;
        self.last_failure = None;
        self.generation += 1;
        self.touch();

        ResetResult {
            selection: self.selection.clone(),
            variable: None,
            stats: None,
            plot: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// All live sessions, keyed by id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return a copy of it
    pub fn create(&self) -> Session {
        let session = Session::new();
        self.sessions.write().insert(session.id, session.clone());
        info!(session = %session.id, "Session created");
        session
    }

    pub fn get(&self, id: Uuid) -> Result<Session> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        match self.sessions.write().remove(&id) {
            Some(_) => {
                info!(session = %id, "Session dropped");
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    /// Run `f` on one session under the write lock
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        Ok(f(session))
    }

    /// Drop sessions not updated within `max_idle`; returns how many went
    pub fn expire_idle(&self, max_idle: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = session.updated_at >= cutoff;
            if !keep {
                debug!(session = %id, updated_at = %session.updated_at, "Session expired");
            }
            keep
        });
        let expired = before - sessions.len();
        if expired > 0 {
            info!(expired = expired, remaining = sessions.len(), "Expired idle sessions");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

fn not_found(id: Uuid) -> ViewerError {
    ViewerError::SessionNotFound { id: id.to_string() }
}
