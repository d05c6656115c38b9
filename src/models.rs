use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

// Where a server URL points, as far as we can tell from the URL alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Direct,
    Embed,
    Iframe,
    Gdrive,
    Filehost,
}

impl ServerType {
    pub fn needs_resolution(self) -> bool {
        matches!(self, ServerType::Embed | ServerType::Iframe)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingServer {
    pub name: String,
    pub url: Url,
    pub quality: Option<String>,
    #[serde(rename = "type")]
    pub kind: ServerType,
}

impl StreamingServer {
    /// The same server pointing at its resolved media URL.
    pub fn resolved(&self, direct: Url) -> Self {
        Self {
            name: self.name.clone(),
            url: direct,
            quality: self.quality.clone(),
            kind: ServerType::Direct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hindi,
    English,
    Tamil,
    Telugu,
    Malayalam,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Hindi,
        Language::English,
        Language::Tamil,
        Language::Telugu,
        Language::Malayalam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Hindi => "hindi",
            Language::English => "english",
            Language::Tamil => "tamil",
            Language::Telugu => "telugu",
            Language::Malayalam => "malayalam",
        }
    }

    /// First language named anywhere in `text`.
    pub fn detect(text: &str) -> Option<Language> {
        let lower = text.to_lowercase();
        Self::ALL.into_iter().find(|lang| lower.contains(lang.as_str()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unsupported language '{}', expected one of: {}",
                    s,
                    Self::ALL.map(Language::as_str).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub title: String,
    pub url: Url,
    pub image: Option<Url>,
    pub quality: Option<String>,
    pub imdb: Option<String>,
    pub year: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub title: String,
    pub url: Url,
    pub image: Option<Url>,
    pub quality: Option<String>,
    pub imdb: Option<String>,
    pub year: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub seasons: Option<String>,
    pub episodes: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub url: Url,
    pub series_title: String,
    pub season: u32,
    pub episode_number: u32,
    pub description: Option<String>,
    pub image: Option<Url>,
    pub streaming_links: Vec<Url>,
    pub servers: Vec<StreamingServer>,
    pub duration: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anime {
    pub title: String,
    pub url: Url,
    pub image: Option<Url>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub language: Option<String>,
    pub year: Option<String>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeEpisode {
    pub title: String,
    pub url: Url,
    pub season: u32,
    pub episode_number: u32,
    pub image: Option<Url>,
    pub aired_date: Option<String>,
    pub servers: Vec<StreamingServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeSeriesDetail {
    pub title: String,
    pub url: Url,
    pub image: Option<Url>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub year: Option<String>,
    pub rating: Option<String>,
    pub quality: Option<String>,
    pub duration: Option<String>,
    pub seasons: Option<String>,
    pub episodes_count: Option<String>,
    pub cast: Vec<String>,
    pub episodes: Vec<AnimeEpisode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEpisode {
    pub title: String,
    pub url: Url,
    pub season: u32,
    pub episode_number: u32,
    pub image: Option<Url>,
    pub duration: Option<String>,
    pub language: Option<String>,
    pub servers: Vec<StreamingServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDetail {
    pub title: String,
    pub url: Url,
    pub image: Option<Url>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub year: Option<String>,
    pub imdb: Option<String>,
    pub quality: Option<String>,
    pub duration: Option<String>,
    pub seasons: Option<String>,
    pub episodes_count: Option<String>,
    pub cast: Vec<String>,
    pub episodes: Vec<SeriesEpisode>,
}

// Toonstream movie page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub title: String,
    pub url: Url,
    pub image: Option<Url>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub year: Option<String>,
    pub rating: Option<String>,
    pub quality: Option<String>,
    pub duration: Option<String>,
    pub director: Option<String>,
    pub cast: Vec<String>,
    pub streaming_links: Vec<Url>,
    pub servers: Vec<StreamingServer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: Option<u16>,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_type_serializes_lowercase() {
        let server = StreamingServer {
            name: "Server 1".into(),
            url: Url::parse("https://host.example/embed/1").unwrap(),
            quality: Some("720P".into()),
            kind: ServerType::Embed,
        };
        let json = serde_json::to_value(&server).unwrap();
        assert_eq!(json["type"], "embed");
        assert_eq!(json["url"], "https://host.example/embed/1");

        let direct = server.resolved(Url::parse("https://cdn.example/v.mp4").unwrap());
        assert_eq!(direct.kind, ServerType::Direct);
        assert_eq!(direct.name, "Server 1");
        assert_eq!(direct.quality.as_deref(), Some("720P"));
    }

    #[test]
    fn languages_parse_and_detect() {
        assert_eq!("Hindi".parse::<Language>(), Ok(Language::Hindi));
        assert!("french".parse::<Language>().unwrap_err().contains("malayalam"));
        assert_eq!(Language::detect("Watch in Tamil Dubbed"), Some(Language::Tamil));
        assert_eq!(Language::detect("no clue"), None);
    }
}
