// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Funnel classification pipeline.
//!
//! Every inbound message flows through here: the contact is recorded, the
//! message persisted, and a classifier (LLM or keyword heuristic) proposes
//! a stage and score. Funnel policy then applies the proposal:
//! - a contact advances at most one stage per message and never regresses,
//! - an operator-set manual floor is never crossed downward,
//! - low-confidence advances and classifier failures are flagged for a
//!   human instead of being applied.
//!
//! Repeated identical messages from the same contact reuse a cached verdict
//! so the model is not asked the same question twice.

use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use leadgate_config::model::ClassifierConfig;
use leadgate_core::{
    ClassificationOutcome, ClassificationRequest, ClassifierProvider, FunnelContact, FunnelStage,
    LeadgateError, MessageContent, Qualification, Verdict,
};
use leadgate_storage::{ContactRecord, Database, queries};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::events::{AlertBus, AlertEvent};
use crate::scheduler::Scheduler;
use crate::template::render_template;

/// What funnel policy decided for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    pub stage: FunnelStage,
    pub score: u8,
}

/// How many verdicts the in-memory cache retains before evicting the oldest.
const VERDICT_CACHE_CAPACITY: usize = 1024;

type CacheKey = (String, u64);

/// Bounded verdict cache with oldest-first eviction.
struct VerdictCache {
    capacity: usize,
    entries: HashMap<CacheKey, ClassificationOutcome>,
    order: VecDeque<CacheKey>,
}

impl VerdictCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<ClassificationOutcome> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, outcome: ClassificationOutcome) {
        if self.entries.insert(key.clone(), outcome).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

/// Classifies inbound messages and moves contacts through the funnel.
pub struct FunnelPipeline {
    db: Database,
    provider: Option<Arc<dyn ClassifierProvider>>,
    scheduler: Arc<Scheduler>,
    alerts: AlertBus,
    config: ClassifierConfig,
    /// Cached outcomes keyed by (contact id, message fingerprint).
    verdict_cache: Mutex<VerdictCache>,
}

impl FunnelPipeline {
    pub fn new(
        db: Database,
        provider: Option<Arc<dyn ClassifierProvider>>,
        scheduler: Arc<Scheduler>,
        alerts: AlertBus,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            db,
            provider,
            scheduler,
            alerts,
            config,
            verdict_cache: Mutex::new(VerdictCache::new(VERDICT_CACHE_CAPACITY)),
        }
    }

    /// Record an inbound message and classify its sender.
    pub async fn handle_inbound(
        &self,
        session: &str,
        sender: &str,
        sender_name: Option<&str>,
        external_id: &str,
        body: &str,
        received_at: &str,
    ) -> Result<(), LeadgateError> {
        let digits: String = sender.chars().filter(|c| c.is_ascii_digit()).collect();
        let contact = queries::contacts::observe_contact(&self.db, &digits, sender_name).await?;

        let inbound_id = uuid::Uuid::new_v4().to_string();
        queries::inbound::insert_inbound(
            &self.db,
            &inbound_id,
            external_id,
            session,
            &digits,
            body,
            &contact.id,
            received_at,
        )
        .await?;

        self.classify(session, &contact, &inbound_id, body).await
    }

    async fn classify(
        &self,
        session: &str,
        contact: &ContactRecord,
        inbound_id: &str,
        body: &str,
    ) -> Result<(), LeadgateError> {
        let fingerprint = message_fingerprint(body);
        let cache_key = (contact.id.clone(), fingerprint);

        let cached = {
            let cache = self.verdict_cache.lock().await;
            cache.get(&cache_key)
        };

        let outcome = match cached {
            Some(outcome) => {
                debug!(contact = %contact.id, "verdict cache hit");
                outcome
            }
            None => {
                let outcome = match self.propose(contact, body).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(contact = %contact.id, error = %e, "classification failed");
                        queries::inbound::set_verdict(
                            &self.db,
                            inbound_id,
                            &Verdict::FlagForHuman.to_string(),
                            None,
                        )
                        .await?;
                        self.alerts.publish(AlertEvent::HumanReviewNeeded {
                            contact_id: contact.id.clone(),
                            reason: e.to_string(),
                        });
                        return Ok(());
                    }
                };
                let mut cache = self.verdict_cache.lock().await;
                cache.insert(cache_key, outcome.clone());
                outcome
            }
        };

        let current: FunnelStage = contact.stage.parse().unwrap_or(FunnelStage::Unknown);
        let floor = contact
            .manual_floor
            .as_deref()
            .and_then(|s| s.parse().ok());
        let decision = decide(current, floor, &outcome, self.config.min_advance_score);

        let stage_changed = decision.stage != current;
        queries::contacts::apply_classification(
            &self.db,
            &contact.id,
            &decision.stage.to_string(),
            i64::from(decision.score),
            &Qualification::from_score(decision.score).to_string(),
            inbound_id,
            stage_changed,
        )
        .await?;
        queries::inbound::set_verdict(
            &self.db,
            inbound_id,
            &decision.verdict.to_string(),
            Some(i64::from(decision.score)),
        )
        .await?;

        match decision.verdict {
            Verdict::FlagForHuman => {
                self.alerts.publish(AlertEvent::HumanReviewNeeded {
                    contact_id: contact.id.clone(),
                    reason: format!(
                        "advance to {} proposed with low confidence (score {})",
                        outcome.stage, outcome.score
                    ),
                });
            }
            Verdict::Advance => {
                info!(
                    contact = %contact.id,
                    stage = %decision.stage,
                    score = decision.score,
                    "contact advanced"
                );
                self.trigger_stage_template(session, contact, decision.stage, inbound_id)
                    .await?;
            }
            Verdict::Stay => {}
        }
        Ok(())
    }

    async fn propose(
        &self,
        contact: &ContactRecord,
        body: &str,
    ) -> Result<ClassificationOutcome, LeadgateError> {
        let Some(provider) = &self.provider else {
            return Ok(heuristic_outcome(
                contact.score.clamp(0, 100) as u8,
                body,
            ));
        };

        let mut history = queries::inbound::recent_bodies_for_contact(
            &self.db,
            &contact.id,
            i64::from(self.config.history_limit),
        )
        .await?;
        // The triggering message was already persisted; keep it out of the
        // history section of the prompt.
        if history.last().map(String::as_str) == Some(body) {
            history.pop();
        }

        let request = ClassificationRequest {
            contact: contact_from_record(contact),
            message: body.to_string(),
            history,
        };
        provider.classify(&request).await
    }

    /// Queue the stage's welcome template, if one is registered.
    async fn trigger_stage_template(
        &self,
        session: &str,
        contact: &ContactRecord,
        stage: FunnelStage,
        inbound_id: &str,
    ) -> Result<(), LeadgateError> {
        let Some(template) =
            queries::templates::template_for_stage(&self.db, &stage.to_string()).await?
        else {
            return Ok(());
        };
        let body = render_template(&template.body, contact);
        let message_id = self
            .scheduler
            .enqueue(
                session,
                &contact.phone,
                &MessageContent::Text { body },
                None,
                Some(inbound_id),
            )
            .await?;
        debug!(
            contact = %contact.id,
            template = %template.name,
            message_id = %message_id,
            "stage template queued"
        );
        Ok(())
    }
}

/// Apply funnel policy to a classifier proposal.
pub fn decide(
    current: FunnelStage,
    manual_floor: Option<FunnelStage>,
    outcome: &ClassificationOutcome,
    min_advance_score: u8,
) -> Decision {
    let effective = match manual_floor {
        Some(floor) if floor.rank() > current.rank() => floor,
        _ => current,
    };

    if outcome.stage.rank() > effective.rank() {
        if outcome.score < min_advance_score {
            return Decision {
                verdict: Verdict::FlagForHuman,
                stage: effective,
                score: outcome.score,
            };
        }
        let next = effective.next().unwrap_or(effective);
        return Decision {
            verdict: Verdict::Advance,
            stage: next,
            score: outcome.score,
        };
    }

    Decision {
        verdict: Verdict::Stay,
        stage: effective,
        score: outcome.score,
    }
}

const BUYING_SIGNALS: &[&str] = &[
    "preco", "preço", "price", "pagamento", "payment", "comprar", "buy", "pix", "boleto",
    "quanto custa",
];

const ENGAGEMENT_SIGNALS: &[&str] = &[
    "plano", "plan", "como funciona", "how does", "prazo", "entrega", "delivery", "detalhe",
];

/// Keyword fallback used when no LLM provider is configured.
pub fn heuristic_outcome(current_score: u8, message: &str) -> ClassificationOutcome {
    let lower = message.to_lowercase();
    let (stage, bump) = if BUYING_SIGNALS.iter().any(|s| lower.contains(s)) {
        (FunnelStage::Conversion, 25)
    } else if ENGAGEMENT_SIGNALS.iter().any(|s| lower.contains(s)) {
        (FunnelStage::Relationship, 10)
    } else {
        (FunnelStage::Attraction, 5)
    };
    let score = (u16::from(current_score) + bump).min(100) as u8;
    ClassificationOutcome {
        stage,
        score,
        reasoning: "keyword heuristic".into(),
    }
}

fn message_fingerprint(body: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    body.trim().to_lowercase().hash(&mut hasher);
    hasher.finish()
}

fn contact_from_record(record: &ContactRecord) -> FunnelContact {
    FunnelContact {
        id: record.id.clone(),
        phone: record.phone.clone(),
        name: record.name.clone(),
        stage: record.stage.parse().unwrap_or(FunnelStage::Unknown),
        score: record.score.clamp(0, 100) as u8,
        qualification: record
            .qualification
            .parse()
            .unwrap_or(Qualification::Cold),
        manual_floor: record.manual_floor.as_deref().and_then(|s| s.parse().ok()),
        interaction_count: record.interaction_count.max(0) as u32,
        last_transition_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use leadgate_config::model::{DispatchConfig, SchedulerConfig};
    use leadgate_test_utils::{MockClassifier, MockGateway};
    use tempfile::tempdir;

    fn outcome(stage: FunnelStage, score: u8) -> ClassificationOutcome {
        ClassificationOutcome {
            stage,
            score,
            reasoning: "test".into(),
        }
    }

    #[test]
    fn advance_moves_exactly_one_stage() {
        let d = decide(
            FunnelStage::Attraction,
            None,
            &outcome(FunnelStage::Customer, 90),
            40,
        );
        assert_eq!(d.verdict, Verdict::Advance);
        assert_eq!(d.stage, FunnelStage::Relationship);
    }

    #[test]
    fn regression_proposals_keep_current_stage() {
        let d = decide(
            FunnelStage::Conversion,
            None,
            &outcome(FunnelStage::Attraction, 60),
            40,
        );
        assert_eq!(d.verdict, Verdict::Stay);
        assert_eq!(d.stage, FunnelStage::Conversion);
    }

    #[test]
    fn low_confidence_advance_is_flagged() {
        let d = decide(
            FunnelStage::Attraction,
            None,
            &outcome(FunnelStage::Relationship, 20),
            40,
        );
        assert_eq!(d.verdict, Verdict::FlagForHuman);
        assert_eq!(d.stage, FunnelStage::Attraction);
    }

    #[test]
    fn manual_floor_is_respected() {
        let d = decide(
            FunnelStage::Attraction,
            Some(FunnelStage::Conversion),
            &outcome(FunnelStage::Relationship, 80),
            40,
        );
        assert_eq!(d.verdict, Verdict::Stay);
        assert_eq!(d.stage, FunnelStage::Conversion);
    }

    #[test]
    fn verdict_cache_evicts_oldest_at_capacity() {
        let mut cache = VerdictCache::new(2);
        let key = |i: u64| ("c1".to_string(), i);
        cache.insert(key(1), outcome(FunnelStage::Attraction, 10));
        cache.insert(key(2), outcome(FunnelStage::Attraction, 20));
        cache.insert(key(3), outcome(FunnelStage::Attraction, 30));

        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
        assert!(cache.get(&key(3)).is_some());

        // Re-inserting an existing key neither grows the cache nor evicts.
        cache.insert(key(3), outcome(FunnelStage::Relationship, 35));
        assert_eq!(cache.entries.len(), 2);
        assert!(cache.get(&key(2)).is_some());
        assert_eq!(
            cache.get(&key(3)).unwrap().stage,
            FunnelStage::Relationship
        );
    }

    #[test]
    fn heuristic_detects_buying_signals() {
        let o = heuristic_outcome(30, "Quanto custa o plano anual? Aceita pix?");
        assert_eq!(o.stage, FunnelStage::Conversion);
        assert_eq!(o.score, 55);

        let o = heuristic_outcome(98, "price?");
        assert_eq!(o.score, 100);

        let o = heuristic_outcome(0, "oi");
        assert_eq!(o.stage, FunnelStage::Attraction);
    }

    struct Harness {
        db: Database,
        gateway: Arc<MockGateway>,
        classifier: Arc<MockClassifier>,
        pipeline: FunnelPipeline,
        alerts: AlertBus,
        _dir: tempfile::TempDir,
    }

    async fn setup(provider_enabled: bool) -> Harness {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(MockGateway::new());
        let alerts = AlertBus::new(8);
        let dispatcher = Arc::new(Dispatcher::new(
            db.clone(),
            gateway.clone(),
            alerts.clone(),
            DispatchConfig::default(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            db.clone(),
            dispatcher,
            alerts.clone(),
            SchedulerConfig::default(),
        ));
        let classifier = Arc::new(MockClassifier::new());
        let provider: Option<Arc<dyn ClassifierProvider>> = if provider_enabled {
            Some(classifier.clone())
        } else {
            None
        };
        let pipeline = FunnelPipeline::new(
            db.clone(),
            provider,
            scheduler,
            alerts.clone(),
            ClassifierConfig::default(),
        );
        Harness {
            db,
            gateway,
            classifier,
            pipeline,
            alerts,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn inbound_message_advances_contact_one_stage() {
        let h = setup(true).await;
        h.classifier.push_outcome(outcome(FunnelStage::Conversion, 85));

        h.pipeline
            .handle_inbound(
                "main",
                "+5511999998888",
                Some("Ana"),
                "ext-1",
                "quero comprar",
                "2026-08-29T10:00:00.000Z",
            )
            .await
            .unwrap();

        let contact = queries::contacts::get_by_phone(&h.db, "5511999998888")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.stage, "attraction");
        assert_eq!(contact.score, 85);
        assert_eq!(contact.qualification, "sales_ready");
        assert!(contact.last_transition_at.is_some());
    }

    #[tokio::test]
    async fn classifier_failure_flags_for_human() {
        let h = setup(true).await;
        let mut alerts = h.alerts.subscribe();
        h.classifier.push_failure(LeadgateError::ClassifierTimeout {
            duration: std::time::Duration::from_secs(15),
        });

        h.pipeline
            .handle_inbound(
                "main",
                "5511999998888",
                None,
                "ext-1",
                "oi",
                "2026-08-29T10:00:00.000Z",
            )
            .await
            .unwrap();

        assert!(matches!(
            alerts.recv().await.unwrap(),
            AlertEvent::HumanReviewNeeded { .. }
        ));
        // The contact was recorded but not advanced.
        let contact = queries::contacts::get_by_phone(&h.db, "5511999998888")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.stage, "unknown");
    }

    #[tokio::test]
    async fn repeated_message_reuses_cached_verdict() {
        let h = setup(true).await;
        h.classifier.push_outcome(outcome(FunnelStage::Attraction, 30));

        for i in 0..2 {
            h.pipeline
                .handle_inbound(
                    "main",
                    "5511999998888",
                    None,
                    &format!("ext-{i}"),
                    "oi, tudo bem?",
                    "2026-08-29T10:00:00.000Z",
                )
                .await
                .unwrap();
        }

        // The second identical message is answered from the cache; the
        // provider saw exactly one request.
        assert_eq!(h.classifier.requests().len(), 1);
    }

    #[tokio::test]
    async fn stage_advance_queues_the_stage_template() {
        let h = setup(true).await;
        queries::templates::upsert_template(
            &h.db,
            "attraction-welcome",
            Some("attraction"),
            "Oi {name}!",
        )
        .await
        .unwrap();
        h.classifier.push_outcome(outcome(FunnelStage::Attraction, 60));

        h.pipeline
            .handle_inbound(
                "main",
                "5511999998888",
                Some("Ana"),
                "ext-1",
                "oi",
                "2026-08-29T10:00:00.000Z",
            )
            .await
            .unwrap();

        let pending = queries::queue::list_entries(&h.db, Some("pending"), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        let message = queries::messages::get_message(&h.db, &pending[0].message_id)
            .await
            .unwrap()
            .unwrap();
        assert!(message.content.contains("Oi Ana!"));
        assert!(h.gateway.sends().is_empty());
    }

    #[tokio::test]
    async fn heuristic_fallback_scores_without_provider() {
        let h = setup(false).await;

        h.pipeline
            .handle_inbound(
                "main",
                "5511999998888",
                None,
                "ext-1",
                "qual o preco?",
                "2026-08-29T10:00:00.000Z",
            )
            .await
            .unwrap();

        let contact = queries::contacts::get_by_phone(&h.db, "5511999998888")
            .await
            .unwrap()
            .unwrap();
        // Heuristic proposed conversion with low absolute score; policy
        // flags instead of advancing from unknown.
        assert_eq!(contact.stage, "unknown");
        assert_eq!(contact.score, 25);
    }
}
