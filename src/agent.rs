//! Multi-agent annotation log.
//!
//! Producers attach attributed annotations to a package. The log is
//! append-only: an annotation is never edited or removed once added.
//! Annotations are grouped into chains by context type, and chains keep
//! the order in which they were first created so the rendered narrative is
//! deterministic for a given sequence of appends.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;
use crate::package::DataPackage;

/// Context type used when a request does not name one.
pub const DEFAULT_CONTEXT_TYPE: &str = "expert_opinion";
pub const DEFAULT_AGENT_TYPE: &str = "llm_agent";
pub const DEFAULT_ANNOTATION_TYPE: &str = "observation";

const EXPERT_OPINION: &str = "expert_opinion";
const ANALYSIS_RESULT: &str = "analysis_result";

/// Unique identifier for an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(uuid::Uuid);

impl AnnotationId {
    /// Creates a new random annotation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attributed contribution. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnnotation {
    id: AnnotationId,
    content: String,
    agent_id: String,
    agent_type: String,
    context_type: String,
    annotation_type: String,
    confidence: f32,
    created_at: DateTime<Utc>,
    sequence: u64,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    references: Vec<String>,
}

impl AgentAnnotation {
    pub const fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    pub fn annotation_type(&self) -> &str {
        &self.annotation_type
    }

    pub const fn confidence(&self) -> f32 {
        self.confidence
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Position of this annotation among all annotations of its package.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    /// Ids of packages or annotations this annotation refers to.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Returns true for expert opinions, by context or annotation type.
    #[must_use]
    pub fn is_expert_opinion(&self) -> bool {
        self.context_type == EXPERT_OPINION || self.annotation_type == EXPERT_OPINION
    }
}

/// Parameters of one append.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRequest {
    content: String,
    agent_id: String,
    agent_type: String,
    context_type: String,
    annotation_type: String,
    confidence: f32,
    metadata: serde_json::Map<String, serde_json::Value>,
    references: Vec<String>,
}

impl AnnotationRequest {
    #[must_use]
    pub fn new(content: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            agent_id: agent_id.into(),
            agent_type: DEFAULT_AGENT_TYPE.to_string(),
            context_type: DEFAULT_CONTEXT_TYPE.to_string(),
            annotation_type: DEFAULT_ANNOTATION_TYPE.to_string(),
            confidence: 1.0,
            metadata: serde_json::Map::new(),
            references: Vec::new(),
        }
    }

    #[must_use]
    pub fn agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    #[must_use]
    pub fn context_type(mut self, context_type: impl Into<String>) -> Self {
        self.context_type = context_type.into();
        self
    }

    #[must_use]
    pub fn annotation_type(mut self, annotation_type: impl Into<String>) -> Self {
        self.annotation_type = annotation_type.into();
        self
    }

    #[must_use]
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_fields(&self.content, &self.agent_id, &self.context_type, self.confidence)
    }
}

fn check_fields(content: &str, agent_id: &str, context_type: &str, confidence: f32) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "content".to_string() });
    }
    if agent_id.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "agent_id".to_string() });
    }
    if context_type.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "context_type".to_string() });
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::ConfidenceOutOfRange { value: confidence });
    }
    Ok(())
}

/// Per-annotation-type aggregate of a chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    pub annotation_type: String,
    pub count: usize,
    pub agents: Vec<String>,
    pub mean_confidence: f32,
}

/// Annotations sharing one context type, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContextChain {
    context_type: String,
    annotations: Vec<AgentAnnotation>,
}

impl AgentContextChain {
    fn new(context_type: String) -> Self {
        Self {
            context_type,
            annotations: Vec::new(),
        }
    }

    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    pub fn annotations(&self) -> &[AgentAnnotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Groups the chain by annotation type. Agents are listed in first
    /// contribution order.
    #[must_use]
    pub fn consensus(&self) -> Vec<Consensus> {
        let mut groups: BTreeMap<&str, (Vec<String>, f32, usize)> = BTreeMap::new();
        for a in &self.annotations {
            let entry = groups.entry(a.annotation_type.as_str()).or_default();
            if !entry.0.contains(&a.agent_id) {
                entry.0.push(a.agent_id.clone());
            }
            entry.1 += a.confidence;
            entry.2 += 1;
        }
        groups
            .into_iter()
            .map(|(annotation_type, (agents, total, count))| {
                #[allow(clippy::cast_precision_loss)]
                let mean_confidence = total / count as f32;
                Consensus {
                    annotation_type: annotation_type.to_string(),
                    count,
                    agents,
                    mean_confidence,
                }
            })
            .collect()
    }
}

/// Aggregate view of a context, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub total_annotations: usize,
    pub unique_agents: usize,
    pub context_types: Vec<String>,
    pub expert_opinions: usize,
}

/// All annotation chains of one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentContext {
    chains: Vec<AgentContextChain>,
    #[serde(skip)]
    next_sequence: u64,
}

#[derive(Deserialize)]
struct RawContext {
    #[serde(default)]
    chains: Vec<AgentContextChain>,
}

impl MultiAgentContext {
    fn from_raw(raw: RawContext) -> Result<Self, String> {
        let next_sequence = check_decoded(&raw.chains)?;
        Ok(Self {
            chains: raw.chains,
            next_sequence,
        })
    }
}

/// Decoded logs must look like something `add` could have produced.
/// Returns the next free sequence number.
fn check_decoded(chains: &[AgentContextChain]) -> Result<u64, String> {
    let mut context_types = BTreeSet::new();
    let mut ids = BTreeSet::new();
    let mut sequences = BTreeSet::new();
    let mut next_sequence = 0u64;

    for chain in chains {
        if chain.context_type.trim().is_empty() {
            return Err("chain has a blank context type".to_string());
        }
        if !context_types.insert(chain.context_type.as_str()) {
            return Err(format!("context type '{}' has more than one chain", chain.context_type));
        }
        if chain.annotations.is_empty() {
            return Err(format!("chain '{}' has no annotations", chain.context_type));
        }
        for a in &chain.annotations {
            check_fields(&a.content, &a.agent_id, &a.context_type, a.confidence)
                .map_err(|e| format!("annotation {}: {e}", a.id))?;
            if a.context_type != chain.context_type {
                return Err(format!(
                    "annotation {} has context type '{}' but sits in chain '{}'",
                    a.id, a.context_type, chain.context_type
                ));
            }
            if !ids.insert(a.id) {
                return Err(format!("annotation id {} appears more than once", a.id));
            }
            if !sequences.insert(a.sequence) {
                return Err(format!("sequence {} appears more than once", a.sequence));
            }
            let after = a
                .sequence
                .checked_add(1)
                .ok_or_else(|| format!("annotation {} leaves no room for further appends", a.id))?;
            next_sequence = next_sequence.max(after);
        }
    }
    Ok(next_sequence)
}

impl<'de> Deserialize<'de> for MultiAgentContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawContext::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(serde::de::Error::custom)
    }
}

impl MultiAgentContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an annotation to the chain for its context type.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for blank content, agent id or
    /// context type, `ValidationError::ConfidenceOutOfRange` for a
    /// confidence outside `0.0..=1.0`, and `ValidationError::SequenceExhausted`
    /// once no sequence number is left.
    pub fn add(&mut self, request: AnnotationRequest) -> Result<AnnotationId, ValidationError> {
        request.validate()?;
        let sequence = self.next_sequence;
        let next_sequence = sequence.checked_add(1).ok_or(ValidationError::SequenceExhausted)?;

        let annotation = AgentAnnotation {
            id: AnnotationId::new(),
            content: request.content,
            agent_id: request.agent_id,
            agent_type: request.agent_type,
            context_type: request.context_type,
            annotation_type: request.annotation_type,
            confidence: request.confidence,
            created_at: Utc::now(),
            sequence,
            metadata: request.metadata,
            references: request.references,
        };
        self.next_sequence = next_sequence;
        let id = annotation.id;

        let pos = match self.chains.iter().position(|c| c.context_type == annotation.context_type) {
            Some(pos) => pos,
            None => {
                self.chains.push(AgentContextChain::new(annotation.context_type.clone()));
                self.chains.len() - 1
            }
        };
        tracing::trace!(
            annotation_id = %id,
            agent_id = %annotation.agent_id,
            context_type = %annotation.context_type,
            sequence = annotation.sequence,
            "annotation appended"
        );
        self.chains[pos].annotations.push(annotation);
        Ok(id)
    }

    /// Chains in creation order.
    pub fn chains(&self) -> &[AgentContextChain] {
        &self.chains
    }

    pub fn chain(&self, context_type: &str) -> Option<&AgentContextChain> {
        self.chains.iter().find(|c| c.context_type == context_type)
    }

    /// All annotations in global insertion order.
    #[must_use]
    pub fn annotations(&self) -> Vec<&AgentAnnotation> {
        let mut all: Vec<&AgentAnnotation> = self.chains.iter().flat_map(|c| c.annotations.iter()).collect();
        all.sort_by_key(|a| a.sequence);
        all
    }

    pub fn annotations_where<P>(&self, mut predicate: P) -> Vec<&AgentAnnotation>
    where
        P: FnMut(&AgentAnnotation) -> bool,
    {
        self.annotations().into_iter().filter(|a| predicate(*a)).collect()
    }

    pub fn expert_opinions(&self) -> Vec<&AgentAnnotation> {
        self.annotations_where(AgentAnnotation::is_expert_opinion)
    }

    pub fn get(&self, id: AnnotationId) -> Option<&AgentAnnotation> {
        self.chains
            .iter()
            .flat_map(|c| c.annotations.iter())
            .find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.chains.iter().map(AgentContextChain::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn summary(&self) -> ContextSummary {
        let agents: BTreeSet<&str> = self
            .chains
            .iter()
            .flat_map(|c| c.annotations.iter())
            .map(|a| a.agent_id.as_str())
            .collect();
        ContextSummary {
            total_annotations: self.len(),
            unique_agents: agents.len(),
            context_types: self.chains.iter().map(|c| c.context_type.clone()).collect(),
            expert_opinions: self.expert_opinions().len(),
        }
    }

    /// Renders the log as markdown-like text.
    ///
    /// One `## <context_type>` group per chain in creation order, each
    /// followed by `- <agent_id>: <content>` lines; groups are separated by
    /// a blank line. Identical logs always render identically.
    #[must_use]
    pub fn narrative(&self) -> String {
        let mut out = String::new();
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str("## ");
            out.push_str(&chain.context_type);
            out.push('\n');
            for a in &chain.annotations {
                out.push_str("- ");
                out.push_str(&a.agent_id);
                out.push_str(": ");
                out.push_str(&a.content);
                out.push('\n');
            }
        }
        out
    }
}

impl DataPackage {
    /// Appends an annotation, creating the agent context on first use.
    ///
    /// # Errors
    ///
    /// See [`MultiAgentContext::add`].
    pub fn add_annotation(&mut self, request: AnnotationRequest) -> Result<AnnotationId, ValidationError> {
        self.agent_context.get_or_insert_with(MultiAgentContext::new).add(request)
    }

    pub fn add_expert_opinion(
        &mut self,
        content: impl Into<String>,
        agent_id: impl Into<String>,
        confidence: f32,
    ) -> Result<AnnotationId, ValidationError> {
        self.add_annotation(
            AnnotationRequest::new(content, agent_id)
                .context_type(EXPERT_OPINION)
                .annotation_type(EXPERT_OPINION)
                .confidence(confidence),
        )
    }

    pub fn add_analysis_result(
        &mut self,
        content: impl Into<String>,
        agent_id: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<AnnotationId, ValidationError> {
        let mut request = AnnotationRequest::new(content, agent_id)
            .agent_type("analysis_agent")
            .context_type(ANALYSIS_RESULT)
            .annotation_type(ANALYSIS_RESULT);
        request.metadata = metadata;
        self.add_annotation(request)
    }

    /// Narrative of the agent context; empty when nothing was added.
    #[must_use]
    pub fn narrative(&self) -> String {
        self.agent_context
            .as_ref()
            .map(MultiAgentContext::narrative)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn context_summary(&self) -> ContextSummary {
        self.agent_context
            .as_ref()
            .map(MultiAgentContext::summary)
            .unwrap_or_default()
    }
}

/// A package shared between producer threads.
///
/// Appends take the write lock, so concurrent producers never lose an
/// annotation and sequence numbers follow lock acquisition order.
#[derive(Debug, Clone)]
pub struct SharedPackage(Arc<RwLock<DataPackage>>);

impl SharedPackage {
    #[must_use]
    pub fn new(package: DataPackage) -> Self {
        Self(Arc::new(RwLock::new(package)))
    }

    pub fn add_annotation(&self, request: AnnotationRequest) -> Result<AnnotationId, ValidationError> {
        self.0.write().add_annotation(request)
    }

    /// Runs `f` against a consistent snapshot of the package.
    pub fn read<R>(&self, f: impl FnOnce(&DataPackage) -> R) -> R {
        f(&self.0.read())
    }

    #[must_use]
    pub fn snapshot(&self) -> DataPackage {
        self.0.read().clone()
    }

    /// Returns the package if this is the last handle, otherwise gives the handle back.
    pub fn try_unwrap(self) -> Result<DataPackage, Self> {
        Arc::try_unwrap(self.0).map(RwLock::into_inner).map_err(Self)
    }
}
