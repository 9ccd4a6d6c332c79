//! Field extraction from Douban HTML.
//!
//! Pure functions from page body to records. Missing nodes produce empty
//! fields rather than errors; pages without their main container produce
//! `None`.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::models::{Celebrity, Photo, Subject, CATEGORY_MOVIE, CATEGORY_TV};

static ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+?)/").unwrap());
static SID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"sid: (\d+?),").unwrap());
static CATEGORY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(.+?)\]").unwrap());
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})").unwrap());
static ORIGINAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"原名[:：](.+?)\s*?/").unwrap());
/// Chinese title (optionally ending in a season marker), then the original title.
static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.+第\w季|[\w\x{ff1a}\x{ff01}\x{ff0c}\x{00b7}]+)\s*(.*)").unwrap()
});
static ROLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([饰配] (.+?)\)").unwrap());
static BACKGROUND_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"url\(([^)]+?)\)$").unwrap());
static IMDB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"IMDb: (tt\d+)").unwrap());
static CELEBRITY_IMDB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"imdb编号:\s+?(nm\d+)").unwrap());

/// Non-empty text between `start` and the next `end`, trimmed.
fn between(text: &str, start: &str, end: &str) -> String {
    text.find(start)
        .map(|i| &text[i + start.len()..])
        .and_then(|rest| rest.split_once(end))
        .map(|(value, _)| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// `label: value` line in a subject's `#info` block.
fn info_line(info: &str, label: &str) -> String {
    between(info, &format!("{}: ", label), "\n")
}

/// `label: \nvalue` line in a person's info block.
fn person_line(info: &str, label: &str) -> String {
    between(info, &format!("{}: \n", label), "\n")
}

fn capture(text: &str, pattern: &Regex) -> String {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn select_first<'a>(el: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    selector(css).and_then(|sel| el.select(&sel).next())
}

fn text(el: ElementRef<'_>, css: &str) -> String {
    select_first(el, css)
        .map(|node| node.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn attr(el: ElementRef<'_>, css: &str, name: &str) -> String {
    select_first(el, css)
        .and_then(|node| node.value().attr(name))
        .unwrap_or_default()
        .to_string()
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => document.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// First space-separated word when the name carries a translation.
fn first_word(name: &str) -> String {
    let parts: Vec<&str> = name.split(' ').collect();
    if parts.len() > 1 {
        parts[0].to_string()
    } else {
        name.to_string()
    }
}

/// Movie and TV results from the keyword search page.
pub fn search_results(body: &str) -> Vec<Subject> {
    let document = Html::parse_document(body);

    select_all(&document, "div.result-list .result")
        .into_iter()
        .filter_map(|item| {
            let category = capture(&text(item, "div.title>h3>span"), &CATEGORY);
            if category != CATEGORY_MOVIE && category != CATEGORY_TV {
                return None;
            }

            let name = text(item, "div.title a");
            let cast = text(item, "div.rating-info>.subject-cast");
            let original_name = capture(&cast, &ORIGINAL_NAME);

            Some(Subject {
                sid: capture(&attr(item, "div.title a", "onclick"), &SID),
                original_name: if original_name.is_empty() {
                    name.clone()
                } else {
                    original_name
                },
                name,
                rating: text(item, "div.rating-info>.rating_nums")
                    .parse()
                    .unwrap_or_default(),
                img: attr(item, "a.nbg>img", "src"),
                year: capture(&cast, &YEAR).parse().ok(),
                genre: category.clone(),
                category,
                intro: text(item, "div.content>p"),
                ..Default::default()
            })
        })
        .collect()
}

/// Subject detail page. `None` when the page has no `#content`.
pub fn subject(body: &str, sid: &str) -> Option<Subject> {
    let document = Html::parse_document(body);
    let content = select_all(&document, "#content").into_iter().next()?;

    let title = text(content, "h1>span:first-child");
    let (name, original_name) = match TITLE.captures(&title) {
        Some(c) => (
            c.get(1).map(|m| m.as_str().trim()).unwrap_or_default().to_string(),
            c.get(2).map(|m| m.as_str().trim()).unwrap_or_default().to_string(),
        ),
        None => (String::new(), String::new()),
    };

    let info = select_first(content, "#info")
        .map(|node| node.text().collect::<String>())
        .unwrap_or_default();
    let category = if select_first(content, "div.episode_list").is_some() {
        CATEGORY_TV
    } else {
        CATEGORY_MOVIE
    };

    let celebrities = selector("#celebrities li.celebrity")
        .map(|sel| {
            content
                .select(&sel)
                .map(|node| Celebrity {
                    id: capture(&attr(node, "div.info a.name", "href"), &ID),
                    name: text(node, "div.info a.name"),
                    img: capture(&attr(node, "div.avatar", "style"), &BACKGROUND_IMAGE),
                    role: text(node, "div.info span.role"),
                    ..Default::default()
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Subject {
        sid: sid.to_string(),
        name,
        original_name,
        rating: text(content, "div.rating_self strong.rating_num")
            .parse()
            .unwrap_or_default(),
        img: attr(content, "a.nbgnbg>img", "src"),
        year: capture(&text(content, "h1>span.year"), &YEAR).parse().ok(),
        director: info_line(&info, "导演"),
        writer: info_line(&info, "编剧"),
        actor: info_line(&info, "主演"),
        genre: info_line(&info, "类型"),
        category: category.to_string(),
        site: info_line(&info, "官方网站"),
        country: info_line(&info, "制片国家/地区"),
        language: info_line(&info, "语言"),
        screen: info_line(&info, "上映日期"),
        duration: info_line(&info, "片长"),
        subname: info_line(&info, "又名"),
        imdb: capture(&info, &IMDB),
        intro: text(content, "div.indent>span").replace("©豆瓣", "").trim().to_string(),
        celebrities,
    })
}

/// Directors, actors and voice actors from a subject's full credits page.
pub fn celebrities(body: &str) -> Vec<Celebrity> {
    let document = Html::parse_document(body);

    select_all(&document, "#content ul.celebrities-list li.celebrity")
        .into_iter()
        .filter_map(|node| {
            let role_text = text(node, "div.info span.role");
            let role_type = role_text
                .split_once(' ')
                .map(|(head, _)| head.to_string())
                .unwrap_or_default();
            if !matches!(role_type.as_str(), "导演" | "演员" | "配音") {
                return None;
            }

            let role = match capture(&role_text, &ROLE) {
                r if r.is_empty() => role_type.clone(),
                r => r,
            };

            Some(Celebrity {
                id: capture(&attr(node, "div.info a.name", "href"), &ID),
                name: first_word(&text(node, "div.info a.name")),
                img: capture(&attr(node, "div.avatar", "style"), &BACKGROUND_IMAGE),
                role,
                role_type,
                ..Default::default()
            })
        })
        .collect()
}

/// Person detail page. `None` when the page has no `#content`.
pub fn celebrity(body: &str, id: &str) -> Option<Celebrity> {
    let document = Html::parse_document(body);
    let content = select_all(&document, "#content").into_iter().next()?;

    let intro = match text(content, "#intro span.all") {
        i if i.is_empty() => text(content, "#intro div.bd"),
        i => i,
    };
    let info = select_first(content, "div.info")
        .map(|node| node.text().collect::<String>())
        .unwrap_or_default();
    let birthdate = match person_line(&info, "出生日期") {
        b if b.is_empty() => between(&info, "生卒日期: \n", " 至"),
        b => b,
    };

    Some(Celebrity {
        id: id.to_string(),
        name: first_word(&text(content, "h1")),
        img: attr(content, "#headline .nbg img", "src"),
        role: person_line(&info, "职业"),
        intro,
        gender: person_line(&info, "性别"),
        constellation: person_line(&info, "星座"),
        birthdate,
        birthplace: person_line(&info, "出生地"),
        nickname: person_line(&info, "更多外文名"),
        family: person_line(&info, "家庭成员"),
        imdb: capture(&info, &CELEBRITY_IMDB),
        ..Default::default()
    })
}

/// People from the celebrity search page.
pub fn celebrity_search(body: &str) -> Vec<Celebrity> {
    let document = Html::parse_document(body);

    select_all(&document, "div.article .result")
        .into_iter()
        .map(|item| Celebrity {
            id: capture(&attr(item, "h3>a", "href"), &ID),
            name: first_word(&text(item, "h3>a")),
            img: attr(item, "div.pic img", "src"),
            ..Default::default()
        })
        .collect()
}

/// Wallpaper photos from a subject's photo list.
pub fn photos(body: &str) -> Vec<Photo> {
    let document = Html::parse_document(body);

    select_all(&document, ".poster-col3>li")
        .into_iter()
        .map(|node| {
            let id = node.value().attr("data-id").unwrap_or_default();
            Photo::from_id(id, &text(node, "div.prop"))
        })
        .collect()
}
