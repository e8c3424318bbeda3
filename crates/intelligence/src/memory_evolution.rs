//! Memory evolution: how a newly written memory relates to the memory graph
//! that already exists.
//!
//! Nexus writes memories as ordinary files; deciding whether a new one
//! updates, extends, or is derived from an existing one starts with a cheap
//! heuristic classifier ([`classify_heuristic`]) over regex marker words,
//! entity-name overlap, and embedding similarity. Only when that heuristic
//! is unsure does the decision escalate to [`MemoryEvolutionEngine`], the
//! out-of-process boundary an LLM call sits behind — the same shape
//! [`crate::expand::QueryExpander`] fixes for query expansion.

use nexus_core::Entity;
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum heuristic confidence to accept its verdict without escalating.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
/// Heuristic confidence below this is not reported as a relationship at all.
const MIN_REPORTABLE_CONFIDENCE: f32 = 0.3;

static UPDATES_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(actually|correction|no longer|changed to|is now|instead|not anymore|switched to|moved to|replaced|updated|previously|was wrong|turns out|in fact|corrected)\b",
    )
    .expect("static pattern")
});

static EXTENDS_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(also|additionally|furthermore|moreover|more specifically|in addition|on top of|besides|plus|as well as|another thing|not only|along with|together with)\b",
    )
    .expect("static pattern")
});

static DERIVES_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(therefore|thus|consequently|because of|based on|implies|as a result|it follows|hence|so we should|this means|given that|due to|leads to|suggests that)\b",
    )
    .expect("static pattern")
});

/// A node in the memory graph, identified by the file entity backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryNode {
    /// The file entity this memory is stored as.
    pub entity: Entity,
    /// The memory's text content.
    pub content: String,
    /// Entity names mentioned in the memory (lowercased comparison is the
    /// caller's responsibility; stored as given).
    pub entities: Vec<String>,
    /// Embedding vector, if one has already been computed upstream.
    pub embedding: Option<Vec<f32>>,
}

impl MemoryNode {
    /// A memory node with no entity/embedding metadata.
    pub fn text_only(entity: Entity, content: impl Into<String>) -> Self {
        MemoryNode {
            entity,
            content: content.into(),
            entities: Vec::new(),
            embedding: None,
        }
    }
}

/// How a new memory relates to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionRelation {
    /// The new memory supersedes the existing one; the existing one should
    /// be archived or overwritten.
    Updates,
    /// The new memory adds detail to the existing one without contradicting it.
    Extends,
    /// The new memory was derived from the existing one (e.g. summarized or
    /// inferred from it) and should be linked back to it.
    DerivesFrom,
}

/// One detected relationship between a new memory and an existing node.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// The existing memory the new one relates to.
    pub existing: Entity,
    /// How it relates.
    pub relation: EvolutionRelation,
    /// The confidence in this judgment, in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Whether a heuristic or an escalated model produced this outcome.
    pub method: &'static str,
}

/// Cosine similarity between two equal-length vectors; `0.0` if either is
/// zero-length or zero-norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Overlap ratio between a new memory's entities and an existing memory's,
/// case-insensitively. `0.0` if the new memory names no entities.
fn entity_overlap(new_entities: &[String], existing_entities: &[String]) -> f32 {
    if new_entities.is_empty() {
        return 0.0;
    }
    let existing: std::collections::HashSet<String> =
        existing_entities.iter().map(|e| e.to_lowercase()).collect();
    let overlap = new_entities
        .iter()
        .filter(|e| existing.contains(&e.to_lowercase()))
        .count();
    (overlap as f32 / new_entities.len() as f32).min(1.0)
}

/// Classify how `new_memory` relates to `candidate` using regex markers,
/// entity overlap, and embedding similarity, without any model call.
///
/// Scoring: each regex match contributes `1.0` to its category; entity
/// overlap contributes `overlap * 0.5` to Updates and `overlap * 0.3` to
/// Extends; similarity above `0.8` adds `0.3` to Updates, similarity above
/// `0.5` adds `0.2` to Extends and `0.1` to Updates. Confidence is the
/// winning category's share of the total score, capped at `0.95` and
/// boosted by `0.2` when only one category has any signal at all. Below
/// [`MIN_REPORTABLE_CONFIDENCE`] no relationship is reported.
pub fn classify_heuristic(new_memory: &MemoryNode, candidate: &MemoryNode) -> Option<EvolutionOutcome> {
    let mut updates_score = 0.0f32;
    let mut extends_score = 0.0f32;
    let mut derives_score = 0.0f32;

    updates_score += UPDATES_MARKERS.find_iter(&new_memory.content).count() as f32;
    extends_score += EXTENDS_MARKERS.find_iter(&new_memory.content).count() as f32;
    derives_score += DERIVES_MARKERS.find_iter(&new_memory.content).count() as f32;

    let overlap = entity_overlap(&new_memory.entities, &candidate.entities);
    if overlap > 0.0 {
        updates_score += overlap * 0.5;
        extends_score += overlap * 0.3;
    }

    if let (Some(a), Some(b)) = (&new_memory.embedding, &candidate.embedding) {
        let similarity = cosine_similarity(a, b);
        if similarity > 0.8 {
            updates_score += 0.3;
        } else if similarity > 0.5 {
            extends_score += 0.2;
            updates_score += 0.1;
        }
    }

    let total = updates_score + extends_score + derives_score;
    if total == 0.0 {
        return None;
    }

    let scores = [
        (EvolutionRelation::Updates, updates_score),
        (EvolutionRelation::Extends, extends_score),
        (EvolutionRelation::DerivesFrom, derives_score),
    ];
    let (winner, winner_score) = scores
        .into_iter()
        .fold((EvolutionRelation::Updates, -1.0f32), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        });

    let mut confidence = (winner_score / total).min(0.95);
    let nonzero_categories = [updates_score, extends_score, derives_score]
        .iter()
        .filter(|s| **s > 0.0)
        .count();
    if nonzero_categories == 1 {
        confidence = (confidence + 0.2).min(0.95);
    }

    if confidence < MIN_REPORTABLE_CONFIDENCE {
        return None;
    }

    Some(EvolutionOutcome {
        existing: candidate.entity.clone(),
        relation: winner,
        confidence,
        method: "heuristic",
    })
}

/// Escalated out-of-process judge for candidates the heuristic left unsure
/// about (confidence below [`DEFAULT_CONFIDENCE_THRESHOLD`]).
///
/// Implementations typically embed `new_memory` and the candidates, then ask
/// an LLM to classify each pairing; this workspace only depends on the
/// trait. Object-safe for use as `Arc<dyn MemoryEvolutionEngine>`.
pub trait MemoryEvolutionEngine: Send + Sync {
    /// Classify how `new_memory` relates to each of `candidates`, returning
    /// one outcome per candidate judged to have a relation at all (silence
    /// on a candidate means "unrelated").
    fn evolve(&self, new_memory: &MemoryNode, candidates: &[MemoryNode]) -> Vec<EvolutionOutcome>;
}

/// Detects evolution relationships for `new_memory` against `candidates`,
/// running the heuristic first and escalating only the candidates it isn't
/// confident about to `engine` (if one is supplied).
///
/// Mirrors the two-tier shape of the originating detector: most pairings are
/// resolved by regex/similarity scoring alone, and the external collaborator
/// is consulted only for the ambiguous remainder.
pub fn detect_evolution(
    new_memory: &MemoryNode,
    candidates: &[MemoryNode],
    engine: Option<&dyn MemoryEvolutionEngine>,
    confidence_threshold: f32,
) -> Vec<EvolutionOutcome> {
    let mut outcomes = Vec::new();
    let mut ambiguous = Vec::new();

    for candidate in candidates {
        match classify_heuristic(new_memory, candidate) {
            Some(outcome) if outcome.confidence >= confidence_threshold => outcomes.push(outcome),
            _ => ambiguous.push(candidate.clone()),
        }
    }

    if let Some(engine) = engine {
        if !ambiguous.is_empty() {
            outcomes.extend(engine.evolve(new_memory, &ambiguous));
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, content: &str) -> MemoryNode {
        MemoryNode::text_only(Entity::new("file", path), content)
    }

    #[test]
    fn updates_marker_classifies_as_updates() {
        let new_memory = node("/memories/new.md", "Actually, the deploy target changed to us-east-1.");
        let candidate = node("/memories/old.md", "The deploy target is us-west-2.");
        let outcome = classify_heuristic(&new_memory, &candidate).expect("should classify");
        assert_eq!(outcome.relation, EvolutionRelation::Updates);
        assert!(outcome.confidence >= MIN_REPORTABLE_CONFIDENCE);
    }

    #[test]
    fn extends_marker_classifies_as_extends() {
        let new_memory = node("/memories/new.md", "Additionally, the service also exposes a metrics endpoint.");
        let candidate = node("/memories/old.md", "The service exposes a health endpoint.");
        let outcome = classify_heuristic(&new_memory, &candidate).expect("should classify");
        assert_eq!(outcome.relation, EvolutionRelation::Extends);
    }

    #[test]
    fn derives_marker_classifies_as_derives() {
        let new_memory = node("/memories/new.md", "Therefore, we should shard the table by tenant.");
        let candidate = node("/memories/old.md", "The table has grown past 500GB.");
        let outcome = classify_heuristic(&new_memory, &candidate).expect("should classify");
        assert_eq!(outcome.relation, EvolutionRelation::DerivesFrom);
    }

    #[test]
    fn no_signal_yields_no_outcome() {
        let new_memory = node("/memories/new.md", "The sky is blue today.");
        let candidate = node("/memories/old.md", "Water boils at 100 degrees.");
        assert!(classify_heuristic(&new_memory, &candidate).is_none());
    }

    #[test]
    fn single_category_signal_boosts_confidence() {
        let new_memory = node("/memories/new.md", "Actually, correction: it was updated previously.");
        let candidate = node("/memories/old.md", "Something unrelated.");
        let outcome = classify_heuristic(&new_memory, &candidate).expect("should classify");
        assert_eq!(outcome.relation, EvolutionRelation::Updates);
        assert!(outcome.confidence > 0.9);
    }

    #[test]
    fn high_similarity_alone_suggests_updates() {
        let mut new_memory = node("/memories/new.md", "plain text with no markers");
        new_memory.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut candidate = node("/memories/old.md", "plain text with no markers either");
        candidate.embedding = Some(vec![0.99, 0.01, 0.0]);
        let outcome = classify_heuristic(&new_memory, &candidate).expect("should classify");
        assert_eq!(outcome.relation, EvolutionRelation::Updates);
    }

    struct AlwaysExtends;

    impl MemoryEvolutionEngine for AlwaysExtends {
        fn evolve(&self, _new_memory: &MemoryNode, candidates: &[MemoryNode]) -> Vec<EvolutionOutcome> {
            candidates
                .iter()
                .map(|c| EvolutionOutcome {
                    existing: c.entity.clone(),
                    relation: EvolutionRelation::Extends,
                    confidence: 1.0,
                    method: "llm",
                })
                .collect()
        }
    }

    #[test]
    fn engine_is_object_safe() {
        let engine: std::sync::Arc<dyn MemoryEvolutionEngine> = std::sync::Arc::new(AlwaysExtends);
        let new_memory = node("/memories/new.md", "new");
        let existing = node("/memories/old.md", "old");
        let outcomes = engine.evolve(&new_memory, &[existing.clone()]);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].existing, existing.entity);
        assert_eq!(outcomes[0].relation, EvolutionRelation::Extends);
    }

    #[test]
    fn ambiguous_candidates_escalate_to_engine() {
        let new_memory = node("/memories/new.md", "nothing special here");
        let candidate = node("/memories/old.md", "also nothing special");
        let outcomes = detect_evolution(
            &new_memory,
            &[candidate.clone()],
            Some(&AlwaysExtends),
            DEFAULT_CONFIDENCE_THRESHOLD,
        );
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].method, "llm");
    }

    #[test]
    fn confident_heuristic_never_escalates() {
        let new_memory = node("/memories/new.md", "Actually, correction: it was updated previously.");
        let candidate = node("/memories/old.md", "Something unrelated.");
        let outcomes = detect_evolution(&new_memory, &[candidate], None, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].method, "heuristic");
    }

    #[test]
    fn no_engine_and_ambiguous_drops_silently() {
        let new_memory = node("/memories/new.md", "nothing special here");
        let candidate = node("/memories/old.md", "also nothing special");
        let outcomes = detect_evolution(&new_memory, &[candidate], None, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(outcomes.is_empty());
    }
}
