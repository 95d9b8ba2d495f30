//! The engine facade.
//!
//! [`StudyService`] owns the store plus one instance of every policy
//! component and exposes the operations callers actually invoke: opening a
//! session, grading a card, resolving derived decks, the difficulty report,
//! and catalog curation. Each operation validates its inputs at the
//! boundary, asks the pure components for decisions, and persists the
//! result through the store.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::{ProblemAnalyzer, ProblemScore};
use crate::catalog::{CardTemplate, Deck, DeckSelector, Subject};
use crate::error::{CoreError, Result};
use crate::events::RatingEvent;
use crate::hierarchy::DeckResolver;
use crate::session::{
    DailyCounters, Learner, QueueCategory, QueueCounts, ScopedCard, SessionBuilder, StudySession,
    StudyTier, TierQuotas,
};
use crate::srs::{CardProgress, CardState, Rating, Scheduler};
use crate::storage::{Config, Database, StudyStats};

/// One queue position hydrated with card content, ready to present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSummary {
    pub card_id: String,
    pub front: String,
    pub back: String,
    pub subject_title: String,
    pub state: CardState,
    pub due_at: DateTime<Utc>,
    pub category: QueueCategory,
}

/// Reply to opening (or re-polling) a study session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextCards {
    /// Token ratings must echo back; stable for the learner's whole local day.
    pub session_token: String,
    pub day: NaiveDate,
    pub cards: Vec<CardSummary>,
    /// Pool sizes before quota truncation.
    pub pending: QueueCounts,
    /// Cards are waiting but today's quota blocks them.
    pub limit_reached: bool,
    /// Nothing waiting and nothing blocked.
    pub session_complete: bool,
}

/// Reply to grading a card: the new schedule plus what the session looks
/// like afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingOutcome {
    pub card_id: String,
    pub state: CardState,
    pub due_at: DateTime<Utc>,
    pub interval_min: i64,
    pub ease: f64,
    pub session_continues: bool,
    pub limit_reached: bool,
}

/// Reply to a derived-deck recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckResolution {
    pub subject_id: String,
    /// Subject-rooted decks whose membership was rewritten.
    pub decks_refreshed: usize,
    /// Cards on the subject's subtree after the recomputation.
    pub member_cards: usize,
}

/// The study engine: storage plus scheduling, session, hierarchy, and
/// analytics policy behind one API.
pub struct StudyService {
    db: Database,
    scheduler: Scheduler,
    builder: SessionBuilder,
    resolver: DeckResolver,
    analyzer: ProblemAnalyzer,
    quotas: TierQuotas,
}

impl StudyService {
    /// Create a service over `db` with default policy everywhere.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            scheduler: Scheduler::new(),
            builder: SessionBuilder::new(),
            resolver: DeckResolver::new(),
            analyzer: ProblemAnalyzer::new(),
            quotas: TierQuotas::default(),
        }
    }

    /// Create a service with every component wired from `config`.
    pub fn with_config(db: Database, config: &Config) -> Self {
        Self {
            db,
            scheduler: Scheduler::with_config(config.srs.clone()),
            builder: SessionBuilder::with_config(config.session.clone()),
            resolver: DeckResolver::with_config(config.resolver.clone()),
            analyzer: ProblemAnalyzer::with_config(config.analytics.clone()),
            quotas: config.tiers.clone(),
        }
    }

    /// Direct store access, for listings and diagnostics.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // === Sessions ===

    /// Open (or re-poll) today's session for `learner_id` over `selector`.
    ///
    /// The queue is rebuilt from current state on every call; the
    /// persistent day row only carries the token, the counters, and the
    /// scope the session was opened over.
    pub fn next_cards(&self, learner_id: &str, selector: &DeckSelector) -> Result<NextCards> {
        let now = Utc::now();
        let learner = self.require_learner(learner_id)?;
        let day = learner.local_day(now);

        let mut counters = self
            .db
            .session_day(learner_id, day)?
            .unwrap_or_else(|| DailyCounters::start(learner_id, day));
        let token = counters
            .session_token
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        counters.session_token = Some(token.clone());
        self.db.ensure_session_day(learner_id, day, &token, selector)?;

        let (session, progress, scoped) = self.open_queue(&learner, day, selector, &counters, now)?;
        let cards = self.hydrate(&session, &scoped, &progress)?;
        debug!(
            "Session {} for learner {}: {} offered ({} learning / {} review / {} fresh pending)",
            session.token,
            learner_id,
            cards.len(),
            session.pending.learning_pending,
            session.pending.reviews_pending,
            session.pending.fresh_pending,
        );

        Ok(NextCards {
            session_token: session.token.clone(),
            day,
            cards,
            pending: session.pending,
            limit_reached: session.limit_reached,
            session_complete: session.is_complete(),
        })
    }

    /// Grade one card.
    ///
    /// The rating string is validated before anything is read or written,
    /// and `session_token` must match the learner's open session for today.
    /// Progress row, event log, and daily counters move in one transaction;
    /// a submission that loses the version race is retried once on fresh
    /// state before giving up.
    pub fn submit_rating(
        &self,
        learner_id: &str,
        card_id: &str,
        rating: &str,
        session_token: &str,
    ) -> Result<RatingOutcome> {
        let rating = Rating::from_str(rating)?;
        let now = Utc::now();
        let learner = self.require_learner(learner_id)?;
        self.require_card(card_id)?;
        let day = learner.local_day(now);

        let counters = self.db.session_day(learner_id, day)?;
        let known_token = counters.as_ref().and_then(|c| c.session_token.as_deref());
        if known_token != Some(session_token) {
            return Err(CoreError::StaleSession {
                learner_id: learner_id.to_string(),
            });
        }
        let selector = counters
            .and_then(|c| c.selector)
            .unwrap_or(DeckSelector::Any);

        let mut applied = None;
        for attempt in 0..2 {
            let stored = self.db.get_progress(learner_id, card_id)?;
            let expected = stored.as_ref().map(|p| p.version);
            let before = stored
                .unwrap_or_else(|| self.scheduler.fresh_progress(learner_id, card_id, now));
            let introduced_new = !before.seen();
            let completed_review = before.state == CardState::Review;

            let mut after = self.scheduler.next_progress(&before, rating, now);
            after.version = expected.map_or(0, |v| v + 1);
            let event = RatingEvent::from_transition(&before, &after, rating, now);

            if self.db.apply_rating(
                &after,
                expected,
                &event,
                day,
                introduced_new,
                completed_review,
                session_token,
            )? {
                applied = Some(after);
                break;
            }
            if attempt == 0 {
                debug!(
                    "Rating for learner {learner_id} card {card_id} lost a version race; retrying"
                );
            }
        }
        let after = applied.ok_or_else(|| CoreError::RatingConflict {
            learner_id: learner_id.to_string(),
            card_id: card_id.to_string(),
        })?;
        debug!(
            "Learner {} rated card {} '{}': now {} due {}",
            learner_id,
            card_id,
            rating,
            after.state.as_str(),
            after.due_at
        );

        // Rebuild over the recorded scope so the caller learns whether the
        // session continues without another round trip.
        let counters = self
            .db
            .session_day(learner_id, day)?
            .unwrap_or_else(|| DailyCounters::start(learner_id, day));
        let (session, _, _) = self.open_queue(&learner, day, &selector, &counters, now)?;

        Ok(RatingOutcome {
            card_id: card_id.to_string(),
            state: after.state,
            due_at: after.due_at,
            interval_min: after.interval_min,
            ease: after.ease,
            session_continues: !session.queue.is_empty(),
            limit_reached: session.limit_reached,
        })
    }

    // === Decks and hierarchy ===

    /// Recompute derived membership for every subject-rooted deck on the
    /// subtree of `subject_id`, and refresh the subject's own snapshot.
    /// Idempotent: resolving twice without structural changes rewrites the
    /// same sets.
    pub fn resolve_deck(&self, subject_id: &str) -> Result<DeckResolution> {
        let now = Utc::now();
        let subject = self.require_subject(subject_id)?;

        let subtree = self.db.subjects_under_path(&subject.path)?;
        let subtree_ids: Vec<&str> = subtree.iter().map(|s| s.id.as_str()).collect();
        let decks = self.db.decks_for_subjects(&subtree_ids)?;

        let mut refreshed = 0usize;
        for deck in &decks {
            let Some(root_id) = deck.subject_id.as_deref() else {
                continue;
            };
            let Some(root) = subtree.iter().find(|s| s.id == root_id) else {
                continue;
            };
            let snapshot = self
                .resolver
                .refresh(root_id, now, || Ok(self.db.card_ids_under_path(&root.path)?))?;
            self.db.replace_deck_membership(&deck.id, &snapshot.card_ids)?;
            refreshed += 1;
        }

        let snapshot = self
            .resolver
            .refresh(subject_id, now, || {
                Ok(self.db.card_ids_under_path(&subject.path)?)
            })?;
        info!(
            "Resolved subject {subject_id}: {refreshed} deck(s) rewritten, {} member card(s)",
            snapshot.len()
        );

        Ok(DeckResolution {
            subject_id: subject_id.to_string(),
            decks_refreshed: refreshed,
            member_cards: snapshot.len(),
        })
    }

    // === Analytics ===

    /// Difficulty report over the half-open event window, hardest first.
    pub fn problem_scores(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProblemScore>> {
        let events = self.db.rating_events_between(since, until)?;
        let mut scores: Vec<ProblemScore> =
            self.analyzer.compute(events.iter()).into_values().collect();
        scores.sort_by(|a, b| {
            b.lapse_rate
                .partial_cmp(&a.lapse_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.card_id.cmp(&b.card_id))
        });
        Ok(scores)
    }

    // === Catalog curation ===

    /// Create a subject, optionally under a parent.
    pub fn create_subject(&self, title: &str, parent_id: Option<&str>) -> Result<Subject> {
        let subject = match parent_id {
            Some(pid) => Subject::new_child(&self.require_subject(pid)?, title),
            None => Subject::new_root(title),
        };
        self.db.insert_subject(&subject)?;
        Ok(subject)
    }

    /// Reparent a subject (`None` promotes it to a root), rewriting the
    /// paths of its whole subtree and invalidating every membership
    /// snapshot along both the old and the new ancestry.
    pub fn move_subject(&self, subject_id: &str, new_parent_id: Option<&str>) -> Result<Subject> {
        let now = Utc::now();
        let subject = self.require_subject(subject_id)?;
        let new_parent = match new_parent_id {
            Some(pid) => Some(self.require_subject(pid)?),
            None => None,
        };
        if let Some(parent) = &new_parent {
            if parent.id == subject.id || subject.is_ancestor_of(parent) {
                return Err(CoreError::InvalidMove {
                    subject_id: subject.id.clone(),
                    target_id: parent.id.clone(),
                });
            }
        }

        let moved = self.db.move_subject(&subject, new_parent.as_ref())?;
        self.resolver.invalidate_subject(&subject, now);
        self.resolver.invalidate_subject(&moved, now);
        info!("Moved subject {} to parent {:?}", subject.id, new_parent_id);
        Ok(moved)
    }

    /// Create a card under a subject. The subject's ancestry snapshots are
    /// invalidated, since derived memberships grew.
    pub fn create_card(
        &self,
        subject_id: &str,
        front: &str,
        back: &str,
        position: i64,
        author: Option<String>,
    ) -> Result<CardTemplate> {
        let subject = self.require_subject(subject_id)?;
        let mut card = CardTemplate::new(subject_id, front, back, position);
        card.author = author;
        self.db.insert_card(&card)?;
        self.resolver.invalidate_subject(&subject, Utc::now());
        Ok(card)
    }

    /// Hide or unhide a card. Takes effect on the next queue build; derived
    /// memberships keep the card, so no snapshot is invalidated.
    pub fn set_card_hidden(&self, card_id: &str, hidden: bool) -> Result<()> {
        self.require_card(card_id)?;
        self.db.set_card_visibility(card_id, !hidden)?;
        Ok(())
    }

    /// Flag a card as held for curator review, or clear the flag.
    pub fn set_card_flagged(&self, card_id: &str, flagged: bool) -> Result<()> {
        self.require_card(card_id)?;
        self.db.set_card_flagged(card_id, flagged)?;
        Ok(())
    }

    /// Reassign a card to another subject, invalidating the snapshots of
    /// both the source and the target ancestry.
    pub fn move_card(&self, card_id: &str, subject_id: &str) -> Result<CardTemplate> {
        let now = Utc::now();
        let card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| CoreError::UnknownCard(card_id.to_string()))?;
        let target = self.require_subject(subject_id)?;
        let source = self.db.get_subject(&card.subject_id)?;

        self.db.set_card_subject(card_id, subject_id)?;
        if let Some(source) = &source {
            self.resolver.invalidate_subject(source, now);
        }
        self.resolver.invalidate_subject(&target, now);
        self.db
            .get_card(card_id)?
            .ok_or_else(|| CoreError::UnknownCard(card_id.to_string()))
    }

    /// Create a deck. With a subject id the membership is derived and
    /// resolved immediately; without one the deck starts empty and is
    /// managed through [`StudyService::set_deck_cards`].
    pub fn create_deck(&self, name: &str, subject_id: Option<&str>) -> Result<Deck> {
        if let Some(sid) = subject_id {
            self.require_subject(sid)?;
        }
        let deck = Deck::new(name, subject_id.map(String::from));
        self.db.insert_deck(&deck)?;
        if let Some(sid) = deck.subject_id.as_deref() {
            self.resolve_deck(sid)?;
        }
        Ok(deck)
    }

    /// Replace a manual deck's member list. Duplicate ids collapse.
    pub fn set_deck_cards(&self, deck_id: &str, card_ids: &[String]) -> Result<usize> {
        let deck = self
            .db
            .get_deck(deck_id)?
            .ok_or_else(|| CoreError::UnknownDeck(deck_id.to_string()))?;
        if deck.subject_id.is_some() {
            warn!("Deck {deck_id} is subject-derived; the next resolve overwrites this membership");
        }
        let mut members = BTreeSet::new();
        for card_id in card_ids {
            self.require_card(card_id)?;
            members.insert(card_id.clone());
        }
        let count = members.len();
        self.db.replace_deck_membership(deck_id, &members)?;
        Ok(count)
    }

    // === Learners ===

    /// Register a learner. The tier string is validated at the boundary.
    pub fn create_learner(&self, name: &str, tier: &str, tz_offset_min: i32) -> Result<Learner> {
        let tier = StudyTier::from_str(tier)?;
        let learner = Learner::new(name, tier, tz_offset_min);
        self.db.insert_learner(&learner)?;
        info!(
            "Created learner {} ({}) on tier {}",
            learner.id, learner.name, learner.tier
        );
        Ok(learner)
    }

    /// Change a learner's tier. Applies from the next queue build; counters
    /// already accumulated today are kept.
    pub fn set_learner_tier(&self, learner_id: &str, tier: &str) -> Result<Learner> {
        let tier = StudyTier::from_str(tier)?;
        self.require_learner(learner_id)?;
        self.db.set_learner_tier(learner_id, tier)?;
        self.require_learner(learner_id)
    }

    /// Corpus-wide totals.
    pub fn stats(&self) -> Result<StudyStats> {
        Ok(self.db.stats_all()?)
    }

    // === Internals ===

    /// Materialize the cards a selector covers, joined with subject paths.
    fn scope_cards(&self, selector: &DeckSelector, now: DateTime<Utc>) -> Result<Vec<ScopedCard>> {
        match selector {
            DeckSelector::Any => Ok(self.db.all_scoped_cards()?),
            DeckSelector::Subject(subject_id) => {
                let subject = self.require_subject(subject_id)?;
                let snapshot = self.resolver.resolve(subject_id, now, || {
                    Ok(self.db.card_ids_under_path(&subject.path)?)
                })?;
                Ok(self.db.scoped_cards_by_ids(snapshot.card_ids.iter())?)
            }
            DeckSelector::Decks(deck_ids) => {
                let mut members: BTreeSet<String> = BTreeSet::new();
                for deck_id in deck_ids {
                    if self.db.get_deck(deck_id)?.is_none() {
                        return Err(CoreError::UnknownDeck(deck_id.clone()));
                    }
                    members.extend(self.db.deck_membership(deck_id)?);
                }
                Ok(self.db.scoped_cards_by_ids(members.iter())?)
            }
        }
    }

    /// Scope + progress + quota state in, assembled queue out.
    fn open_queue(
        &self,
        learner: &Learner,
        day: NaiveDate,
        selector: &DeckSelector,
        counters: &DailyCounters,
        now: DateTime<Utc>,
    ) -> Result<(StudySession, HashMap<String, CardProgress>, Vec<ScopedCard>)> {
        let scoped = self.scope_cards(selector, now)?;
        let progress: HashMap<String, CardProgress> = self
            .db
            .progress_for_learner(&learner.id)?
            .into_iter()
            .map(|p| (p.card_id.clone(), p))
            .collect();
        let limits = self.quotas.limits_for(learner.tier);
        let session = self
            .builder
            .build(&learner.id, day, &scoped, &progress, &limits, counters, now);
        Ok((session, progress, scoped))
    }

    /// Join queue entries back with card content and subject titles.
    fn hydrate(
        &self,
        session: &StudySession,
        scoped: &[ScopedCard],
        progress: &HashMap<String, CardProgress>,
    ) -> Result<Vec<CardSummary>> {
        let titles: HashMap<String, String> = self
            .db
            .list_subjects()?
            .into_iter()
            .map(|s| (s.id, s.title))
            .collect();
        let by_id: HashMap<&str, &CardTemplate> = scoped
            .iter()
            .map(|s| (s.card.id.as_str(), &s.card))
            .collect();

        let summaries = session
            .queue
            .iter()
            .filter_map(|entry| {
                let card = by_id.get(entry.card_id.as_str())?;
                let state = progress
                    .get(&entry.card_id)
                    .map(|p| p.state)
                    .unwrap_or_default();
                Some(CardSummary {
                    card_id: entry.card_id.clone(),
                    front: card.front.clone(),
                    back: card.back.clone(),
                    subject_title: titles
                        .get(&card.subject_id)
                        .cloned()
                        .unwrap_or_else(|| card.subject_id.clone()),
                    state,
                    due_at: entry.due_at,
                    category: entry.category,
                })
            })
            .collect();
        Ok(summaries)
    }

    fn require_learner(&self, learner_id: &str) -> Result<Learner> {
        self.db
            .get_learner(learner_id)?
            .ok_or_else(|| CoreError::UnknownLearner(learner_id.to_string()))
    }

    fn require_subject(&self, subject_id: &str) -> Result<Subject> {
        self.db
            .get_subject(subject_id)?
            .ok_or_else(|| CoreError::UnknownSubject(subject_id.to_string()))
    }

    fn require_card(&self, card_id: &str) -> Result<()> {
        if self.db.get_card(card_id)?.is_none() {
            return Err(CoreError::UnknownCard(card_id.to_string()));
        }
        Ok(())
    }
}
