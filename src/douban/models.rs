//! Records extracted from Douban pages.

use serde::{Deserialize, Serialize};

/// Category label for films.
pub const CATEGORY_MOVIE: &str = "电影";
/// Category label for TV series.
pub const CATEGORY_TV: &str = "电视剧";

/// A film or series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub sid: String,
    pub name: String,
    pub original_name: String,
    pub rating: f32,
    /// Poster URL.
    pub img: String,
    pub year: Option<i32>,
    pub director: String,
    pub writer: String,
    pub actor: String,
    /// Slash-separated genres, as shown on the page.
    pub genre: String,
    /// [`CATEGORY_MOVIE`] or [`CATEGORY_TV`].
    pub category: String,
    pub site: String,
    pub country: String,
    pub language: String,
    /// Release dates, e.g. `2002-01-26(中国大陆) / 2001-11-16(美国)`.
    pub screen: String,
    pub duration: String,
    pub subname: String,
    pub imdb: String,
    pub intro: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub celebrities: Vec<Celebrity>,
}

impl Subject {
    pub fn genres(&self) -> Vec<&str> {
        split_slashes(&self.genre)
    }

    /// Medium-size poster.
    pub fn img_middle(&self) -> String {
        self.img.replace("s_ratio_poster", "m")
    }

    /// First listed release date (`YYYY-MM-DD`), if well formed.
    pub fn release_date(&self) -> Option<&str> {
        let first = self.screen.split('/').next()?;
        let date = first.split('(').next()?.trim();
        let bytes = date.as_bytes();
        let well_formed = bytes.len() == 10
            && bytes.iter().enumerate().all(|(i, b)| match i {
                4 | 7 => *b == b'-',
                _ => b.is_ascii_digit(),
            });
        well_formed.then_some(date)
    }

    pub fn is_tv(&self) -> bool {
        self.category == CATEGORY_TV
    }

    /// Directors first (at most five), then everyone else with a name.
    pub fn credited_celebrities(&self) -> Vec<&Celebrity> {
        let named = || self.celebrities.iter().filter(|c| !c.name.is_empty());
        named()
            .filter(|c| c.is_director())
            .take(5)
            .chain(named().filter(|c| !c.is_director()))
            .collect()
    }
}

/// A person credited on a subject, or a person page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Celebrity {
    pub id: String,
    pub name: String,
    pub img: String,
    /// Character played, or the job when there is none.
    pub role: String,
    /// Credit group, e.g. `导演` or `演员`.
    pub role_type: String,
    pub intro: String,
    pub gender: String,
    pub constellation: String,
    pub birthdate: String,
    pub birthplace: String,
    pub nickname: String,
    pub family: String,
    pub imdb: String,
    pub site: String,
}

impl Celebrity {
    pub fn is_director(&self) -> bool {
        let field = if self.role_type.is_empty() {
            &self.role
        } else {
            &self.role_type
        };
        field.contains("导演")
    }
}

/// A wallpaper-type photo of a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub small: String,
    pub medium: String,
    pub large: String,
    /// Original upload. Only served with a Douban referer.
    pub raw: String,
    /// `WIDTHxHEIGHT` as shown on the page.
    pub size: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Photo {
    pub fn from_id(id: &str, size: &str) -> Self {
        let url = |kind: &str| format!("https://img2.doubanio.com/view/photo/{}/public/p{}.jpg", kind, id);
        let (width, height) = match size.split_once('x') {
            Some((w, h)) => (w.trim().parse().ok(), h.trim().parse().ok()),
            None => (None, None),
        };

        Self {
            id: id.to_string(),
            small: url("s"),
            medium: url("m"),
            large: url("l"),
            raw: url("raw"),
            size: size.to_string(),
            width,
            height,
        }
    }
}

fn split_slashes(s: &str) -> Vec<&str> {
    s.split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}
