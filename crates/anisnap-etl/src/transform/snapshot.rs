//! Normalized snapshot record

use crate::error::{EtlError, Result};
use crate::extract::models::{Aired, Broadcast, Entity, Images, JikanAnime, TitleVariant, Trailer};
use crate::transform::text::clean_text;
use anisnap_common::{EntityRef, NaturalKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// One catalogue item as observed by one job on one date.
///
/// Nested structures are kept as plain serializable values; a `None` means
/// the source omitted the field, an empty list means it listed nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeSnapshot {
    pub source_id: i64,
    pub url: Option<String>,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub title_synonyms: Option<Vec<String>>,
    pub titles: Option<Vec<TitleVariant>>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub source: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    pub airing: Option<bool>,
    pub duration: Option<String>,
    pub rating: Option<String>,
    pub score: Option<f64>,
    pub scored_by: Option<i64>,
    pub rank: Option<i64>,
    pub popularity: Option<i64>,
    pub members: Option<i64>,
    pub favorites: Option<i64>,
    pub approved: Option<bool>,
    pub season: Option<String>,
    pub year: Option<i32>,
    pub aired: Option<Aired>,
    pub synopsis: Option<String>,
    pub background: Option<String>,
    pub images: Option<Images>,
    pub trailer: Option<Trailer>,
    pub broadcast: Option<Broadcast>,
    pub genres: Option<Vec<EntityRef>>,
    pub explicit_genres: Option<Vec<EntityRef>>,
    pub themes: Option<Vec<EntityRef>>,
    pub demographics: Option<Vec<EntityRef>>,
    pub studios: Option<Vec<EntityRef>>,
    pub producers: Option<Vec<EntityRef>>,
    pub licensors: Option<Vec<EntityRef>>,
    pub snapshot_type: String,
    pub snapshot_date: NaiveDate,
}

impl AnimeSnapshot {
    /// Flatten and validate one raw record
    pub fn from_raw(anime: &JikanAnime, snapshot_type: &str, snapshot_date: NaiveDate) -> Result<Self> {
        let snapshot = Self {
            source_id: anime.mal_id,
            url: anime.url.clone(),
            title: anime.title.trim().to_string(),
            title_english: anime.title_english.clone(),
            title_japanese: anime.title_japanese.clone(),
            title_synonyms: anime.title_synonyms.clone(),
            titles: anime.titles.clone(),
            kind: anime.kind.clone(),
            source: anime.source.clone(),
            episodes: anime.episodes,
            status: anime.status.clone(),
            airing: anime.airing,
            duration: anime.duration.clone(),
            rating: anime.rating.clone(),
            score: anime.score,
            scored_by: anime.scored_by,
            rank: anime.rank,
            popularity: anime.popularity,
            members: anime.members,
            favorites: anime.favorites,
            approved: anime.approved,
            season: anime.season.clone(),
            year: anime.year,
            aired: anime.aired.clone(),
            synopsis: clean_text(anime.synopsis.as_deref()),
            background: clean_text(anime.background.as_deref()),
            images: anime.images.clone(),
            trailer: anime.trailer.clone(),
            broadcast: anime.broadcast.clone(),
            genres: flatten_entities(anime.genres.as_deref()),
            explicit_genres: flatten_entities(anime.explicit_genres.as_deref()),
            themes: flatten_entities(anime.themes.as_deref()),
            demographics: flatten_entities(anime.demographics.as_deref()),
            studios: flatten_entities(anime.studios.as_deref()),
            producers: flatten_entities(anime.producers.as_deref()),
            licensors: flatten_entities(anime.licensors.as_deref()),
            snapshot_type: snapshot_type.to_string(),
            snapshot_date,
        };

        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_id <= 0 {
            return Err(EtlError::Validation(format!(
                "source_id must be positive, got {}",
                self.source_id
            )));
        }
        if self.title.is_empty() {
            return Err(EtlError::Validation("title cannot be empty".to_string()));
        }
        if let Some(score) = self.score {
            if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                return Err(EtlError::Validation(format!(
                    "score must be between {} and {}, got {}",
                    MIN_SCORE, MAX_SCORE, score
                )));
            }
        }
        if let Some(episodes) = self.episodes {
            if episodes < 0 {
                return Err(EtlError::Validation(format!(
                    "episodes cannot be negative, got {}",
                    episodes
                )));
            }
        }
        if self.snapshot_type.trim().is_empty() {
            return Err(EtlError::Validation("snapshot_type cannot be empty".to_string()));
        }

        Ok(())
    }

    pub fn key(&self) -> NaturalKey {
        NaturalKey::new(self.source_id, self.snapshot_type.clone(), self.snapshot_date)
    }
}

fn flatten_entities(entities: Option<&[Entity]>) -> Option<Vec<EntityRef>> {
    entities.map(|list| {
        list.iter()
            .map(|entity| EntityRef {
                id: entity.mal_id,
                kind: entity.kind.clone(),
                name: entity.name.clone(),
                url: entity.url.clone(),
            })
            .collect()
    })
}
