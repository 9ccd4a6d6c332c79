//! End-to-end lookups against a mock origin.

use metafetch::{DoubanApi, LiveSettings, Settings};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PAGE: &str = r##"<html><body><div class="result-list">
<div class="result"><div class="content"><div class="title">
<h3><span>[电影]</span><a href="#" onclick="moreurl(this,{i: '0', sid: 1291546, qcat: '1002'})">霸王别姬</a></h3>
<div class="rating-info"><span class="rating_nums">9.6</span><span class="subject-cast">原名:霸王别姬 / 陈凯歌 / 1993</span></div>
</div></div></div>
</div></body></html>"##;

const SUBJECT_PAGE: &str = "<html><body><div id=\"content\">
<h1><span>霸王别姬</span><span class=\"year\">(1993)</span></h1>
<div id=\"info\">
<span class=\"pl\">导演</span>: 陈凯歌
<span class=\"pl\">类型:</span> 剧情 / 爱情 / 同性
</div>
</div></body></html>";

const CHALLENGE_PAGE: &str = r#"<html><body>
<form action="/c" method="post">
<input type="hidden" id="tok" name="tok" value="t0k">
<input type="hidden" id="cha" name="cha" value="seed-123">
<input type="hidden" id="difficulty" name="difficulty" value="1">
<input type="hidden" id="sol" name="sol" value="">
</form>
</body></html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

fn settings_for(server: &MockServer, cookies: &str) -> LiveSettings {
    let mut settings = Settings::default();
    settings.douban.base_url = server.uri();
    settings.douban.search_url = server.uri();
    settings.douban.challenge_url = server.uri();
    settings.douban.cookie_url = format!("{}/", server.uri());
    settings.douban.cookie_domain = String::new();
    settings.douban.cookies = cookies.to_string();
    settings.douban.anti_block = false;
    LiveSettings::new(settings)
}

#[tokio::test]
async fn search_is_fetched_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("cat", "1002"))
        .and(query_param("q", "霸王别姬"))
        .respond_with(html(SEARCH_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let api = DoubanApi::new(settings_for(&server, "")).unwrap();
    let cancel = CancellationToken::new();

    let results = api.search("霸王别姬", &cancel).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].sid, "1291546");
    assert_eq!(results[0].year, Some(1993));

    let again = api.search("霸王别姬", &cancel).await.unwrap();
    assert_eq!(again, results);
}

#[tokio::test]
async fn challenge_page_is_solved_and_request_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subject/1291546/"))
        .respond_with(html(CHALLENGE_PAGE))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/c"))
        .and(body_string_contains("tok=t0k"))
        .and(body_string_contains("cha=seed-123"))
        .and(body_string_contains("sol="))
        .respond_with(html("ok").insert_header("set-cookie", "clearance=ok; Path=/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subject/1291546/"))
        .and(header("cookie", "clearance=ok"))
        .respond_with(html(SUBJECT_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let api = DoubanApi::new(settings_for(&server, "")).unwrap();
    let subject = api
        .get_subject("1291546", &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(subject.name, "霸王别姬");
    assert_eq!(subject.director, "陈凯歌");
    assert_eq!(subject.genres(), vec!["剧情", "爱情", "同性"]);
}

#[tokio::test]
async fn configured_cookies_follow_live_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subject/1/"))
        .and(header("cookie", "bid=abc"))
        .respond_with(html(SUBJECT_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subject/2/"))
        .and(header("cookie", "bid=def"))
        .respond_with(html(SUBJECT_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server, "bid=abc");
    let api = DoubanApi::new(settings.clone()).unwrap();
    let cancel = CancellationToken::new();

    assert!(api.get_subject("1", &cancel).await.unwrap().is_some());

    settings.set_cookies("bid=def");
    assert!(api.get_subject("2", &cancel).await.unwrap().is_some());
    assert_eq!(api.session().generation(), 2);
}

#[tokio::test]
async fn server_errors_degrade_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/celebrity/9/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subject/9/photos"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let api = DoubanApi::new(settings_for(&server, "")).unwrap();
    let cancel = CancellationToken::new();

    assert_eq!(api.get_celebrity("9", &cancel).await.unwrap(), None);
    assert!(api.get_photos("9", &cancel).await.unwrap().is_empty());
}
