//! Free-text tag resolution.
//!
//! A requested name resolves to, in order of preference:
//!
//! 1. an exact case-insensitive match (soft-deleted matches are refused),
//! 2. the closest live tag when its trigram similarity is at least
//!    [`AUTO_ACCEPT_SIMILARITY`],
//! 3. a newly created tag, when nothing similar exists or the caller passed
//!    `force_create`.
//!
//! Otherwise the caller gets up to [`MAX_SUGGESTIONS`] similar tags back and
//! must confirm. Similarity scoring is Postgres `pg_trgm`; this module only
//! decides what to do with the scores.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_TAGS_PER_LISTING: usize = 5;
pub const MAX_TAG_NAME_LEN: usize = 50;
/// pg_trgm scores are `real`; thresholds are the widened `f32` values so a
/// score of exactly 0.7 compares equal after widening.
pub const AUTO_ACCEPT_SIMILARITY: f64 = 0.7_f32 as f64;
pub const MIN_SUGGESTION_SIMILARITY: f64 = 0.3_f32 as f64;
pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub tag_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub tag: Tag,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagSuggestion {
    pub tag_id: String,
    pub name: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagDecision {
    Existing(Tag),
    AutoCorrected { tag: Tag, similarity: f64 },
    Create { name: String },
    NeedsConfirmation { suggestions: Vec<TagSuggestion> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TagResolution {
    Existing {
        requested: String,
        tag: Tag,
    },
    AutoCorrected {
        requested: String,
        tag: Tag,
        similarity: f64,
    },
    Created {
        requested: String,
        tag: Tag,
    },
}

impl TagResolution {
    pub fn tag(&self) -> &Tag {
        match self {
            TagResolution::Existing { tag, .. }
            | TagResolution::AutoCorrected { tag, .. }
            | TagResolution::Created { tag, .. } => tag,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            TagResolution::Existing { .. } => "existing",
            TagResolution::AutoCorrected { .. } => "auto_corrected",
            TagResolution::Created { .. } => "created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConfirmation {
    pub requested: String,
    pub suggestions: Vec<TagSuggestion>,
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("invalid tag name: {0}")]
    InvalidName(String),
    #[error("tag `{0}` has been removed and cannot be reused")]
    Unavailable(String),
    #[error("at most {max} tags are allowed, got {given}")]
    TooMany { max: usize, given: usize },
    #[error("similar tags exist; pick a suggestion or force creation")]
    ConfirmationRequired(Vec<PendingConfirmation>),
    #[error(transparent)]
    Store(anyhow::Error),
}

/// Stores may report a [`TagError`] through `anyhow`; it is recovered here so
/// it keeps its own HTTP mapping instead of becoming a storage failure.
impl From<anyhow::Error> for TagError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TagError>() {
            Ok(tag_err) => tag_err,
            Err(err) => TagError::Store(err),
        }
    }
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// Case-insensitive lookup including soft-deleted rows.
    async fn find_exact(&self, name: &str) -> Result<Option<TagRecord>>;

    /// Live tags scoring at least `min_similarity`, best first.
    async fn find_similar(
        &self,
        name: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<TagSuggestion>>;

    async fn create(&self, name: &str, created_by: Option<&str>) -> Result<Tag>;
}

pub fn normalize_tag_name(raw: &str) -> Result<String, TagError> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(TagError::InvalidName("tag name is empty".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME_LEN {
        return Err(TagError::InvalidName(format!(
            "tag name exceeds {MAX_TAG_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(TagError::InvalidName(
            "tag name contains control characters".to_string(),
        ));
    }
    Ok(name)
}

fn by_similarity(a: &TagSuggestion, b: &TagSuggestion) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.name.cmp(&b.name))
}

/// Pure resolution step for one normalised name.
pub fn decide(
    name: &str,
    exact: Option<TagRecord>,
    similar: Vec<TagSuggestion>,
    force_create: bool,
) -> Result<TagDecision, TagError> {
    if let Some(record) = exact {
        if record.deleted {
            return Err(TagError::Unavailable(name.to_string()));
        }
        return Ok(TagDecision::Existing(record.tag));
    }

    let mut suggestions: Vec<TagSuggestion> = similar
        .into_iter()
        .filter(|candidate| candidate.similarity >= MIN_SUGGESTION_SIMILARITY)
        .collect();
    suggestions.sort_by(by_similarity);
    suggestions.truncate(MAX_SUGGESTIONS);

    let Some(best) = suggestions.first() else {
        return Ok(TagDecision::Create {
            name: name.to_string(),
        });
    };

    if best.similarity >= AUTO_ACCEPT_SIMILARITY {
        return Ok(TagDecision::AutoCorrected {
            tag: Tag {
                tag_id: best.tag_id.clone(),
                name: best.name.clone(),
            },
            similarity: best.similarity,
        });
    }

    if force_create {
        return Ok(TagDecision::Create {
            name: name.to_string(),
        });
    }

    Ok(TagDecision::NeedsConfirmation { suggestions })
}

/// Normalises and de-duplicates (case-insensitively) a batch of names.
pub fn normalize_tag_names(raw_names: &[String]) -> Result<Vec<String>, TagError> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for raw in raw_names {
        let name = normalize_tag_name(raw)?;
        if seen.insert(name.to_lowercase()) {
            names.push(name);
        }
    }
    if names.len() > MAX_TAGS_PER_LISTING {
        return Err(TagError::TooMany {
            max: MAX_TAGS_PER_LISTING,
            given: names.len(),
        });
    }
    Ok(names)
}

/// Resolves a listing's tag names.
///
/// Every name is decided before anything is written: when one of them needs
/// confirmation no tag is created and all pending names are reported
/// together. The result has at most one entry per tag id.
pub async fn resolve_tags<S: TagStore + ?Sized>(
    store: &S,
    raw_names: &[String],
    force_create: bool,
    created_by: Option<&str>,
) -> Result<Vec<TagResolution>, TagError> {
    let names = normalize_tag_names(raw_names)?;

    let mut decisions = Vec::with_capacity(names.len());
    let mut pending = Vec::new();
    for name in names {
        let exact = store.find_exact(&name).await?;
        let similar = if exact.is_none() {
            store
                .find_similar(&name, MIN_SUGGESTION_SIMILARITY, MAX_SUGGESTIONS)
                .await?
        } else {
            Vec::new()
        };
        match decide(&name, exact, similar, force_create)? {
            TagDecision::NeedsConfirmation { suggestions } => {
                pending.push(PendingConfirmation {
                    requested: name,
                    suggestions,
                });
            }
            decision => decisions.push((name, decision)),
        }
    }

    if !pending.is_empty() {
        return Err(TagError::ConfirmationRequired(pending));
    }

    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(decisions.len());
    for (requested, decision) in decisions {
        let resolution = match decision {
            TagDecision::Existing(tag) => TagResolution::Existing { requested, tag },
            TagDecision::AutoCorrected { tag, similarity } => TagResolution::AutoCorrected {
                requested,
                tag,
                similarity,
            },
            TagDecision::Create { name } => {
                let tag = store.create(&name, created_by).await?;
                TagResolution::Created { requested, tag }
            }
            TagDecision::NeedsConfirmation { .. } => continue,
        };
        if seen.insert(resolution.tag().tag_id.clone()) {
            resolved.push(resolution);
        }
    }

    Ok(resolved)
}

#[derive(Clone)]
pub struct PgTagStore {
    pool: Pool<Postgres>,
}

impl PgTagStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagStore for PgTagStore {
    async fn find_exact(&self, name: &str) -> Result<Option<TagRecord>> {
        let row = sqlx::query(
            "SELECT tag_id, name, deleted_at IS NOT NULL AS deleted \
             FROM mp.tags WHERE lower(name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(TagRecord {
            tag: Tag {
                tag_id: row.try_get("tag_id")?,
                name: row.try_get("name")?,
            },
            deleted: row.try_get("deleted")?,
        }))
    }

    async fn find_similar(
        &self,
        name: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<TagSuggestion>> {
        let rows = sqlx::query(
            "SELECT tag_id, name, similarity(name, $1) AS score \
             FROM mp.tags \
             WHERE deleted_at IS NULL AND similarity(name, $1) >= $2 \
             ORDER BY score DESC, name ASC \
             LIMIT $3",
        )
        .bind(name)
        .bind(min_similarity as f32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut suggestions = Vec::with_capacity(rows.len());
        for row in rows {
            let score: f32 = row.try_get("score")?;
            suggestions.push(TagSuggestion {
                tag_id: row.try_get("tag_id")?,
                name: row.try_get("name")?,
                similarity: f64::from(score),
            });
        }
        Ok(suggestions)
    }

    async fn create(&self, name: &str, created_by: Option<&str>) -> Result<Tag> {
        let tag_id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO mp.tags (tag_id, name, created_by) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING \
             RETURNING tag_id, name",
        )
        .bind(&tag_id)
        .bind(name)
        .bind(created_by)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            tracing::info!(tag_id = %tag_id, name = %name, "tag created");
            return Ok(Tag {
                tag_id: row.try_get("tag_id")?,
                name: row.try_get("name")?,
            });
        }

        // Lost a race with a concurrent insert of the same name.
        match self.find_exact(name).await? {
            Some(record) if !record.deleted => Ok(record.tag),
            Some(_) => Err(TagError::Unavailable(name.to_string()).into()),
            None => Err(anyhow!("tag `{name}` insert conflicted but no row was found")),
        }
    }
}


/// `PgTagStore` against a real database; skipped when `DATABASE_URL` is unset.
#[cfg(test)]
mod pg_store_tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::OnceCell;

    static MIGRATIONS: OnceCell<()> = OnceCell::const_new();

    async fn test_store() -> Option<PgTagStore> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping database test");
            return None;
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("connect database");
        MIGRATIONS
            .get_or_init(|| async {
                crate::migrations::run(&pool).await.expect("run migrations");
            })
            .await;
        Some(PgTagStore::new(pool))
    }

    /// Distinct random lowercase letters. Words built from them have no
    /// repeated trigrams, so pg_trgm scores follow from the word lengths.
    fn distinct_letters(count: usize) -> Vec<char> {
        loop {
            let mut letters = Vec::with_capacity(count);
            for byte in Uuid::new_v4()
                .as_bytes()
                .iter()
                .chain(Uuid::new_v4().as_bytes().iter())
            {
                let letter = (b'a' + byte % 26) as char;
                if !letters.contains(&letter) {
                    letters.push(letter);
                }
                if letters.len() == count {
                    return letters;
                }
            }
        }
    }

    fn word(letters: &[char]) -> String {
        letters.iter().collect()
    }

    // An 8 letter word and its 7 letter prefix share 7 of 10 distinct
    // trigrams, which pg_trgm reports as the `real` 0.7.
    #[tokio::test]
    async fn similarity_of_exactly_seven_tenths_is_auto_accepted() {
        let Some(store) = test_store().await else {
            return;
        };
        let letters = distinct_letters(8);
        let full = word(&letters);
        let typo = word(&letters[..7]);
        let tag = store.create(&full, None).await.expect("create tag");

        let similar = store
            .find_similar(&typo, MIN_SUGGESTION_SIMILARITY, MAX_SUGGESTIONS)
            .await
            .expect("find similar");
        assert_eq!(similar[0].tag_id, tag.tag_id);
        assert_eq!(similar[0].similarity, AUTO_ACCEPT_SIMILARITY);

        let resolved = resolve_tags(&store, &[typo.clone()], false, None)
            .await
            .expect("resolve");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].outcome(), "auto_corrected");
        assert_eq!(resolved[0].tag().tag_id, tag.tag_id);
    }

    // Sharing only the three leading trigrams out of 15 scores 0.2.
    #[tokio::test]
    async fn candidates_below_the_suggestion_floor_are_ignored() {
        let Some(store) = test_store().await else {
            return;
        };
        let letters = distinct_letters(13);
        let existing = word(&letters[..8]);
        let requested = word(&letters[..3]) + &word(&letters[8..]);
        let existing_tag = store.create(&existing, None).await.expect("create tag");

        let similar = store
            .find_similar(&requested, MIN_SUGGESTION_SIMILARITY, MAX_SUGGESTIONS)
            .await
            .expect("find similar");
        assert!(similar
            .iter()
            .all(|candidate| candidate.tag_id != existing_tag.tag_id));

        let resolved = resolve_tags(&store, &[requested.clone()], false, None)
            .await
            .expect("resolve");
        assert_eq!(resolved[0].outcome(), "created");
        assert_eq!(resolved[0].tag().name, requested);
    }

    #[tokio::test]
    async fn create_returns_the_existing_row_on_conflict() {
        let Some(store) = test_store().await else {
            return;
        };
        let name = word(&distinct_letters(10));
        let first = store.create(&name, None).await.expect("create tag");
        let second = store
            .create(&name.to_uppercase(), None)
            .await
            .expect("create again");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn soft_deleted_tags_are_unavailable() {
        let Some(store) = test_store().await else {
            return;
        };
        let name = word(&distinct_letters(10));
        let tag = store.create(&name, None).await.expect("create tag");
        sqlx::query("UPDATE mp.tags SET deleted_at = NOW() WHERE tag_id = $1")
            .bind(&tag.tag_id)
            .execute(&store.pool)
            .await
            .expect("soft delete");

        let err = resolve_tags(&store, &[name.to_uppercase()], true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::Unavailable(_)));

        // A racing insert that lands on the removed row keeps the typed error.
        let err = store.create(&name, None).await.unwrap_err();
        assert!(matches!(TagError::from(err), TagError::Unavailable(_)));
    }
}
