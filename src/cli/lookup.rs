//! Lookup commands. Results go to stdout as JSON, status to stderr.

use console::style;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use metafetch::challenge::{digest_hex, solve};
use metafetch::{DoubanApi, LiveSettings};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_list<T: Serialize>(items: &[T], what: &str) -> anyhow::Result<()> {
    if items.is_empty() {
        eprintln!("{} No {} found", style("!").yellow(), what);
    }
    print_json(&items)
}

fn print_found<T: Serialize>(item: Option<T>, what: &str) -> anyhow::Result<()> {
    match item {
        Some(item) => print_json(&item),
        None => anyhow::bail!("{} not found", what),
    }
}

pub async fn cmd_search(
    settings: &LiveSettings,
    keyword: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let api = DoubanApi::new(settings.clone())?;
    let results = api.search(keyword, cancel).await?;
    print_list(&results, "subjects")
}

pub async fn cmd_subject(
    settings: &LiveSettings,
    sid: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let api = DoubanApi::new(settings.clone())?;
    print_found(api.get_subject(sid, cancel).await?, "Subject")
}

pub async fn cmd_celebrities(
    settings: &LiveSettings,
    sid: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let api = DoubanApi::new(settings.clone())?;
    let people = api.get_celebrities(sid, cancel).await?;
    print_list(&people, "celebrities")
}

pub async fn cmd_celebrity(
    settings: &LiveSettings,
    id: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let api = DoubanApi::new(settings.clone())?;
    print_found(api.get_celebrity(id, cancel).await?, "Celebrity")
}

pub async fn cmd_search_celebrity(
    settings: &LiveSettings,
    keyword: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let api = DoubanApi::new(settings.clone())?;
    let people = api.search_celebrity(keyword, cancel).await?;
    print_list(&people, "celebrities")
}

pub async fn cmd_photos(
    settings: &LiveSettings,
    sid: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let api = DoubanApi::new(settings.clone())?;
    let photos = api.get_photos(sid, cancel).await?;
    print_list(&photos, "photos")
}

#[derive(Serialize)]
struct Solution<'a> {
    seed: &'a str,
    difficulty: u32,
    nonce: u64,
    digest: String,
}

pub async fn cmd_solve(seed: &str, difficulty: u32, cancel: &CancellationToken) -> anyhow::Result<()> {
    eprintln!(
        "{} Solving {:?} at difficulty {}",
        style("→").dim(),
        seed,
        difficulty
    );
    let nonce = solve(seed, difficulty, cancel).await?;
    print_json(&Solution {
        seed,
        difficulty,
        nonce,
        digest: digest_hex(seed, nonce),
    })
}

/// Effective settings as TOML, cookie values redacted.
pub fn cmd_config(settings: &LiveSettings) -> anyhow::Result<()> {
    let mut current = settings.current();
    if current.douban.has_cookies() {
        current.douban.cookies = "<redacted>".to_string();
    }
    print!("{}", toml::to_string_pretty(&current)?);
    Ok(())
}
