//! Four bounded sub-scores derived from GitHub evidence.
//!
//! Every function is pure and takes `now` explicitly. Each component is
//! clamped to `[0, 25]` on its own, so the overall score stays in `[0, 100]`.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::evidence::{EvidenceSnapshot, RepoMeta};

pub const MAX_COMPONENT_SCORE: u8 = 25;

const ACTIVITY_REPO_CAP: f64 = 20.0;
const ACTIVITY_REPO_WEIGHT: f64 = 8.0;
const ACTIVITY_COMMIT_CAP: f64 = 500.0;
const ACTIVITY_COMMIT_WEIGHT: f64 = 10.0;
const ACTIVITY_STAR_CAP: f64 = 50.0;
const ACTIVITY_STAR_WEIGHT: f64 = 7.0;

const CONSISTENCY_WINDOW_DAYS: i64 = 365;
const CONSISTENCY_MONTH_CAP: f64 = 12.0;
const CONSISTENCY_MONTH_WEIGHT: f64 = 15.0;
const CONSISTENCY_STEADY_MONTHS: usize = 6;
const CONSISTENCY_STEADY_BONUS: f64 = 5.0;

const DIVERSITY_LANGUAGE_CAP: f64 = 5.0;
const DIVERSITY_LANGUAGE_WEIGHT: f64 = 15.0;
const DIVERSITY_TOPIC_CAP: f64 = 8.0;
const DIVERSITY_TOPIC_WEIGHT: f64 = 10.0;

const COMMIT_SAMPLE_REPOS: usize = 10;
const COMMIT_FLOOR_PER_REPO: f64 = 5.0;
const COMMIT_MONTH_CAP: f64 = 24.0;
const COMMITS_PER_UNSAMPLED_REPO: u64 = 10;

// ── SkillMetrics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetrics {
    pub activity: u8,
    pub consistency: u8,
    pub recency: u8,
    pub diversity: u8,
}

impl SkillMetrics {
    /// Build from raw components, clamping each to `[0, 25]`.
    pub fn new(activity: u8, consistency: u8, recency: u8, diversity: u8) -> Self {
        Self {
            activity: activity.min(MAX_COMPONENT_SCORE),
            consistency: consistency.min(MAX_COMPONENT_SCORE),
            recency: recency.min(MAX_COMPONENT_SCORE),
            diversity: diversity.min(MAX_COMPONENT_SCORE),
        }
    }

    pub fn from_snapshot(snapshot: &EvidenceSnapshot, now: DateTime<Utc>) -> Self {
        Self::new(
            calculate_activity(snapshot),
            calculate_consistency(snapshot, now),
            calculate_recency(snapshot, now),
            calculate_diversity(snapshot),
        )
    }

    /// Sum of the four components, in `[0, 100]`.
    pub fn overall_score(&self) -> u8 {
        self.activity + self.consistency + self.recency + self.diversity
    }
}

// ── Sub-scores ───────────────────────────────────────────────────────────────

pub fn calculate_activity(snapshot: &EvidenceSnapshot) -> u8 {
    #[allow(clippy::cast_precision_loss)]
    let raw = ratio(snapshot.repo_count as f64, ACTIVITY_REPO_CAP) * ACTIVITY_REPO_WEIGHT
        + ratio(snapshot.total_commits_estimate as f64, ACTIVITY_COMMIT_CAP)
            * ACTIVITY_COMMIT_WEIGHT
        + ratio(snapshot.total_stars as f64, ACTIVITY_STAR_CAP) * ACTIVITY_STAR_WEIGHT;
    clamp_score(raw)
}

/// Month coverage over the trailing 12 months, plus steadiness and recent-push
/// bonuses. No pushes in the window scores exactly 0.
pub fn calculate_consistency(snapshot: &EvidenceSnapshot, now: DateTime<Utc>) -> u8 {
    let window_start = now - Duration::days(CONSISTENCY_WINDOW_DAYS);
    let months: BTreeSet<(i32, u32)> = snapshot
        .push_timestamps
        .iter()
        .filter(|ts| **ts >= window_start)
        .map(|ts| (ts.year(), ts.month()))
        .collect();

    if months.is_empty() {
        return 0;
    }

    #[allow(clippy::cast_precision_loss)]
    let mut raw = ratio(months.len() as f64, CONSISTENCY_MONTH_CAP) * CONSISTENCY_MONTH_WEIGHT;
    if months.len() >= CONSISTENCY_STEADY_MONTHS {
        raw += CONSISTENCY_STEADY_BONUS;
    }
    if let Some(last) = snapshot.last_push {
        raw += match days_since(last, now) {
            ..=30 => 5.0,
            31..=90 => 2.0,
            _ => 0.0,
        };
    }
    clamp_score(raw)
}

pub fn calculate_recency(snapshot: &EvidenceSnapshot, now: DateTime<Utc>) -> u8 {
    if snapshot.repo_count == 0 {
        return 0;
    }
    snapshot
        .last_push
        .map_or(0, |last| recency_for_days(days_since(last, now)))
}

/// Step function on days since the last push.
pub fn recency_for_days(days: i64) -> u8 {
    match days {
        ..=7 => 25,
        8..=30 => 22,
        31..=90 => 18,
        91..=180 => 12,
        181..=365 => 6,
        _ => 2,
    }
}

pub fn calculate_diversity(snapshot: &EvidenceSnapshot) -> u8 {
    #[allow(clippy::cast_precision_loss)]
    let raw = ratio(snapshot.languages.len() as f64, DIVERSITY_LANGUAGE_CAP)
        * DIVERSITY_LANGUAGE_WEIGHT
        + ratio(snapshot.topics.len() as f64, DIVERSITY_TOPIC_CAP) * DIVERSITY_TOPIC_WEIGHT;
    clamp_score(raw)
}

// ── Commit estimate ──────────────────────────────────────────────────────────

/// Approximate total commits. This is a monotonic proxy, not a real count:
/// the repos listing does not expose commit history.
///
/// The 10 most recently pushed repos contribute
/// `max(5, size/100 * min(age_months, 24) * activity_factor)` each; every
/// other repo adds a flat 10.
pub fn estimate_commits(repos: &[RepoMeta], now: DateTime<Utc>) -> u64 {
    let mut by_push: Vec<&RepoMeta> = repos.iter().collect();
    by_push.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));

    let sampled: f64 = by_push
        .iter()
        .take(COMMIT_SAMPLE_REPOS)
        .map(|repo| estimate_repo_commits(repo, now))
        .sum();
    let unsampled = repos.len().saturating_sub(COMMIT_SAMPLE_REPOS) as u64;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sampled = sampled.round() as u64;
    sampled + unsampled * COMMITS_PER_UNSAMPLED_REPO
}

fn estimate_repo_commits(repo: &RepoMeta, now: DateTime<Utc>) -> f64 {
    let age_days = repo
        .created_at
        .map_or(0, |created| days_since(created, now))
        .max(0);
    #[allow(clippy::cast_precision_loss)]
    let months = (age_days as f64 / 30.0).min(COMMIT_MONTH_CAP);
    #[allow(clippy::cast_precision_loss)]
    let size_factor = repo.size_kb as f64 / 100.0;
    let estimate = size_factor * months * activity_factor(repo.pushed_at, now);
    estimate.max(COMMIT_FLOOR_PER_REPO)
}

fn activity_factor(pushed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match pushed_at.map(|ts| days_since(ts, now)) {
        Some(..=30) => 1.0,
        Some(31..=90) => 0.7,
        Some(91..=365) => 0.4,
        _ => 0.2,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn ratio(value: f64, cap: f64) -> f64 {
    (value / cap).min(1.0)
}

fn clamp_score(raw: f64) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = raw.round().clamp(0.0, f64::from(MAX_COMPONENT_SCORE)) as u8;
    score
}

pub(crate) fn days_since(ts: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - ts).num_days()
}
