//! Response models for the Jikan v4 anime search endpoint
//!
//! Only `mal_id` and `title` are required; every other field may be absent
//! or `null` in real responses.

use serde::{Deserialize, Serialize};

/// One page of `GET /anime`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<JikanAnime>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub has_next_page: bool,
    #[serde(default)]
    pub last_visible_page: Option<u32>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub items: Option<PaginationItems>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationItems {
    pub count: u32,
    pub total: u32,
    pub per_page: u32,
}

/// Raw anime record as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JikanAnime {
    pub mal_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub images: Option<Images>,
    pub trailer: Option<Trailer>,
    pub approved: Option<bool>,
    pub titles: Option<Vec<TitleVariant>>,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub title_synonyms: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub source: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    pub airing: Option<bool>,
    pub aired: Option<Aired>,
    pub duration: Option<String>,
    pub rating: Option<String>,
    pub score: Option<f64>,
    pub scored_by: Option<i64>,
    pub rank: Option<i64>,
    pub popularity: Option<i64>,
    pub members: Option<i64>,
    pub favorites: Option<i64>,
    pub synopsis: Option<String>,
    pub background: Option<String>,
    pub season: Option<String>,
    pub year: Option<i32>,
    pub broadcast: Option<Broadcast>,
    pub producers: Option<Vec<Entity>>,
    pub licensors: Option<Vec<Entity>>,
    pub studios: Option<Vec<Entity>>,
    pub genres: Option<Vec<Entity>>,
    pub explicit_genres: Option<Vec<Entity>>,
    pub themes: Option<Vec<Entity>>,
    pub demographics: Option<Vec<Entity>>,
}

impl JikanAnime {
    /// Minimal record with only the required fields set
    pub fn new(mal_id: i64, title: impl Into<String>) -> Self {
        Self {
            mal_id,
            title: title.into(),
            url: None,
            images: None,
            trailer: None,
            approved: None,
            titles: None,
            title_english: None,
            title_japanese: None,
            title_synonyms: None,
            kind: None,
            source: None,
            episodes: None,
            status: None,
            airing: None,
            aired: None,
            duration: None,
            rating: None,
            score: None,
            scored_by: None,
            rank: None,
            popularity: None,
            members: None,
            favorites: None,
            synopsis: None,
            background: None,
            season: None,
            year: None,
            broadcast: None,
            producers: None,
            licensors: None,
            studios: None,
            genres: None,
            explicit_genres: None,
            themes: None,
            demographics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Images {
    pub jpg: Option<ImageUrls>,
    pub webp: Option<ImageUrls>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrls {
    pub image_url: Option<String>,
    pub small_image_url: Option<String>,
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trailer {
    pub youtube_id: Option<String>,
    pub url: Option<String>,
    pub embed_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleVariant {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
}

/// Air-date range with ISO timestamps and their broken-down parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aired {
    pub from: Option<String>,
    pub to: Option<String>,
    pub prop: Option<AiredProp>,
    pub string: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiredProp {
    pub from: Option<DateParts>,
    pub to: Option<DateParts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateParts {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub day: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub string: Option<String>,
}

/// Related entity (genre, studio, producer, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub mal_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub url: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_record_parses() {
        let json = r#"{"mal_id": 5, "title": "Cowboy Bebop: Tengoku no Tobira", "score": null}"#;
        let anime: JikanAnime = serde_json::from_str(json).unwrap();
        assert_eq!(anime, JikanAnime::new(5, "Cowboy Bebop: Tengoku no Tobira"));
    }

    #[test]
    fn test_missing_title_is_rejected() {
        let json = r#"{"mal_id": 5}"#;
        assert!(serde_json::from_str::<JikanAnime>(json).is_err());
    }

    #[test]
    fn test_search_page_parses() {
        let json = r#"{
            "pagination": {
                "last_visible_page": 1041,
                "has_next_page": true,
                "current_page": 1,
                "items": {"count": 1, "total": 26001, "per_page": 25}
            },
            "data": [{
                "mal_id": 1,
                "title": "Cowboy Bebop",
                "type": "TV",
                "episodes": 26,
                "score": 8.75,
                "aired": {
                    "from": "1998-04-03T00:00:00+00:00",
                    "to": "1999-04-24T00:00:00+00:00",
                    "prop": {
                        "from": {"day": 3, "month": 4, "year": 1998},
                        "to": {"day": 24, "month": 4, "year": 1999}
                    },
                    "string": "Apr 3, 1998 to Apr 24, 1999"
                },
                "genres": [
                    {"mal_id": 1, "type": "anime", "name": "Action",
                     "url": "https://myanimelist.net/anime/genre/1/Action"}
                ],
                "themes": []
            }]
        }"#;

        let page: SearchResponse = serde_json::from_str(json).unwrap();
        assert!(page.pagination.has_next_page);
        assert_eq!(page.pagination.items.as_ref().unwrap().per_page, 25);

        let anime = &page.data[0];
        assert_eq!(anime.kind.as_deref(), Some("TV"));
        assert_eq!(anime.genres.as_ref().unwrap()[0].name, "Action");
        assert_eq!(anime.themes, Some(vec![]));
        assert_eq!(anime.demographics, None);
        let from = anime.aired.as_ref().unwrap().prop.as_ref().unwrap().from.as_ref();
        assert_eq!(from.unwrap().year, Some(1998));
    }
}
