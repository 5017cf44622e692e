//! Protocol definitions: the immutable step graph a session runs on.
//!
//! A protocol is authored as a JSON document (see `protocols/` for the
//! bundled ones) and turned into a [`ProtocolDefinition`] exactly once,
//! through [`ProtocolDefinition::from_json`] or
//! [`ProtocolDefinition::from_document`].  Both paths run the full graph
//! validation in [`validate`]; there is no other way to construct a
//! definition, so the interpreter never sees a dangling edge.
//!
//! ```text
//!  JSON ──serde──▶ ProtocolDocument ──validate──▶ ProtocolDefinition
//!                                        │
//!                                        └──▶ Vec<ContentWarning>
//! ```

pub mod library;
pub mod validate;

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub use validate::ContentWarning;

// ---------------------------------------------------------------------------
// Step identity
// ---------------------------------------------------------------------------

/// Identifier of a step within one protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for StepId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One node of the protocol graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Text handed to the speech-output collaborator when the step is entered.
    #[serde(default)]
    pub voice_prompt: String,
    #[serde(default)]
    pub animation_ref: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// The closed set of step behaviours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Shown until the user moves on, or auto-advances after a delay.
    Instruction {
        next_step_id: StepId,
        #[serde(default)]
        duration_seconds: Option<u32>,
        #[serde(default)]
        critical_warning: Option<String>,
    },
    /// Blocks until one of the expected keywords is heard (or it times out).
    VoiceTrigger {
        expected_keywords: BTreeSet<String>,
        next_step_id: StepId,
        #[serde(default)]
        timeout_seconds: Option<u32>,
        #[serde(default)]
        timeout_step_id: Option<StepId>,
    },
    /// Binary branch answered by tap or voice.
    Popup {
        yes_next_step_id: StepId,
        no_next_step_id: StepId,
        #[serde(default)]
        yes_keywords: BTreeSet<String>,
        #[serde(default)]
        no_keywords: BTreeSet<String>,
    },
    /// Fixed-duration step with optional mid-step events and beat target.
    Timed {
        duration_seconds: u32,
        #[serde(default)]
        timer_events: Vec<TimerEvent>,
        #[serde(default)]
        count_beats: bool,
        #[serde(default)]
        target_beats: Option<u32>,
        next_step_id: StepId,
    },
    /// Jump back to an earlier step, at most `max_iterations` times.
    Loop {
        loop_to_step_id: StepId,
        #[serde(default)]
        max_iterations: Option<u32>,
        /// Exit taken once the iteration cap is reached.
        #[serde(default)]
        next_step_id: Option<StepId>,
    },
    /// End of the protocol.
    Terminal { outcome: OutcomeKind },
}

impl StepKind {
    /// Short lowercase name, used in logs and hints.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Instruction { .. } => "instruction",
            Self::VoiceTrigger { .. } => "voice_trigger",
            Self::Popup { .. } => "popup",
            Self::Timed { .. } => "timed",
            Self::Loop { .. } => "loop",
            Self::Terminal { .. } => "terminal",
        }
    }

    /// Every outgoing edge as `(field name, target)`, timer-effect targets
    /// included.  Absent optional edges are skipped.
    pub fn edges(&self) -> Vec<(&'static str, &StepId)> {
        let mut edges = Vec::new();
        match self {
            Self::Instruction { next_step_id, .. } => edges.push(("next_step_id", next_step_id)),
            Self::VoiceTrigger {
                next_step_id,
                timeout_step_id,
                ..
            } => {
                edges.push(("next_step_id", next_step_id));
                if let Some(t) = timeout_step_id {
                    edges.push(("timeout_step_id", t));
                }
            }
            Self::Popup {
                yes_next_step_id,
                no_next_step_id,
                ..
            } => {
                edges.push(("yes_next_step_id", yes_next_step_id));
                edges.push(("no_next_step_id", no_next_step_id));
            }
            Self::Timed {
                next_step_id,
                timer_events,
                ..
            } => {
                edges.push(("next_step_id", next_step_id));
                for event in timer_events {
                    match &event.effect {
                        TimerEffect::Transition { step_id } => edges.push(("transition step_id", step_id)),
                        TimerEffect::Popup {
                            yes_step_id,
                            no_step_id,
                            ..
                        } => {
                            if let Some(y) = yes_step_id {
                                edges.push(("popup yes_step_id", y));
                            }
                            if let Some(n) = no_step_id {
                                edges.push(("popup no_step_id", n));
                            }
                        }
                        TimerEffect::Notification { .. } => {}
                    }
                }
            }
            Self::Loop {
                loop_to_step_id,
                next_step_id,
                ..
            } => {
                edges.push(("loop_to_step_id", loop_to_step_id));
                if let Some(n) = next_step_id {
                    edges.push(("next_step_id", n));
                }
            }
            Self::Terminal { .. } => {}
        }
        edges
    }
}

/// A time-indexed sub-event inside a [`StepKind::Timed`] step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEvent {
    pub trigger_at_seconds: u32,
    pub effect: TimerEffect,
}

/// What the presentation layer is expected to do when a timer event fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEffect {
    /// Ask a yes/no question; answers may branch to other steps.
    Popup {
        title: String,
        message: String,
        #[serde(default)]
        yes_step_id: Option<StepId>,
        #[serde(default)]
        no_step_id: Option<StepId>,
    },
    /// Non-blocking cue (toast, chime, spoken reminder).
    Notification { message: String },
    /// Silent jump to another step.
    Transition { step_id: StepId },
}

/// How a protocol run ended when it reached a terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The emergency resolved (obstruction cleared, person breathing).
    Resolved,
    /// Care handed over to emergency services or a trained responder.
    HandedOver,
    /// The situation needs a different protocol or professional help.
    Escalated,
}

// ---------------------------------------------------------------------------
// Documents and validated definitions
// ---------------------------------------------------------------------------

/// Raw, unvalidated shape of a protocol document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolDocument {
    pub id: String,
    pub name: String,
    pub initial_step_id: StepId,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub metronome_bpm: Option<u16>,
}

/// A validated, immutable protocol graph.
#[derive(Debug, Clone)]
pub struct ProtocolDefinition {
    id: String,
    name: String,
    initial_step_id: StepId,
    steps: BTreeMap<StepId, StepDefinition>,
    metronome_bpm: Option<u16>,
    warnings: Vec<ContentWarning>,
}

impl ProtocolDefinition {
    /// Parse and validate a JSON protocol document.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let document: ProtocolDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    /// Validate an already-parsed document.
    ///
    /// Keywords are normalized here (trimmed, lowercased) so matching at
    /// runtime is a plain set lookup.
    pub fn from_document(document: ProtocolDocument) -> Result<Self, ProtocolError> {
        let mut steps = BTreeMap::new();
        for mut step in document.steps {
            if step.id.is_empty() {
                return Err(ProtocolError::InvalidStep {
                    step: step.id,
                    reason: "step id is empty",
                });
            }
            normalize_step_keywords(&mut step.kind);
            if steps.contains_key(&step.id) {
                return Err(ProtocolError::DuplicateStep(step.id));
            }
            steps.insert(step.id.clone(), step);
        }

        let warnings = validate::validate_graph(&document.initial_step_id, &steps)?;

        Ok(Self {
            id: document.id,
            name: document.name,
            initial_step_id: document.initial_step_id,
            steps,
            metronome_bpm: document.metronome_bpm,
            warnings,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_step_id(&self) -> &StepId {
        &self.initial_step_id
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.steps.contains_key(id)
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.values()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn metronome_bpm(&self) -> Option<u16> {
        self.metronome_bpm
    }

    /// Non-fatal content-quality findings from load time.
    pub fn warnings(&self) -> &[ContentWarning] {
        &self.warnings
    }
}

/// Lowercase and trim a keyword (or a heard phrase) for exact matching.
pub fn normalize_keyword(text: &str) -> String {
    text.trim().to_lowercase()
}

fn normalize_set(set: &mut BTreeSet<String>) {
    *set = set
        .iter()
        .map(|k| normalize_keyword(k))
        .filter(|k| !k.is_empty())
        .collect();
}

fn normalize_step_keywords(kind: &mut StepKind) {
    match kind {
        StepKind::VoiceTrigger {
            expected_keywords, ..
        } => normalize_set(expected_keywords),
        StepKind::Popup {
            yes_keywords,
            no_keywords,
            ..
        } => {
            normalize_set(yes_keywords);
            normalize_set(no_keywords);
        }
        _ => {}
    }
}
