//! Page creation, composition, writes and unpublishing

use crate::common::*;

const HELLO: &str = "http://example.com/hello.html";

#[tokio::test]
async fn create_clones_every_referenced_instance() {
    let mut t = TestEngine::new();
    t.seed_site().await;
    let article = addr("components/article/instances/1");

    let created = t
        .engine
        .pages()
        .create(
            SITE,
            json!({
                "layout": addr("layouts/main"),
                "main": [article.clone()],
                "slug": "copy"
            }),
            &t.ctx(),
        )
        .await
        .unwrap();

    let page = created["_ref"].as_str().unwrap().to_string();
    assert!(page.starts_with(&addr("pages/")));
    assert_eq!(created["layout"], json!(addr("layouts/main")));

    let copy = created["main"][0].as_str().unwrap().to_string();
    assert_ne!(copy, article);
    assert!(copy.starts_with(&addr("components/article/instances/")));

    let copied = t.read(&copy).await;
    assert_eq!(copied["title"], "Hello");
    let body = copied["body"]["_ref"].as_str().unwrap();
    assert_ne!(body, addr("components/text/instances/1"));
    assert!(body.starts_with(&addr("components/text/instances/")));
    assert_eq!(t.read(body).await, json!({"text": "first"}));

    // originals are untouched
    assert_eq!(
        t.read(&article).await["body"]["_ref"],
        json!(addr("components/text/instances/1"))
    );

    let stored = t.read(&page).await;
    assert!(stored.get("_ref").is_none());
    assert_eq!(stored["main"], json!([copy]));

    let event = t.wait_for(EventKind::CreatePage).await;
    assert_eq!(event.uri, page);
}

#[tokio::test]
async fn create_without_a_layout_is_rejected() {
    let t = TestEngine::new();

    let err = t
        .engine
        .pages()
        .create(SITE, json!({"main": []}), &t.ctx())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Page must have a layout.");
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn compose_expands_every_address_field() {
    let t = TestEngine::new();
    t.seed_site().await;

    let composed = t.engine.pages().compose(&addr("pages/p"), &t.ctx()).await.unwrap();

    assert_eq!(
        composed,
        json!({
            "layout": {"_ref": addr("layouts/main"), "head": "Site"},
            "main": [{
                "_ref": addr("components/article/instances/1"),
                "title": "Hello",
                "body": {"_ref": addr("components/text/instances/1"), "text": "first"}
            }],
            "slug": "hello"
        })
    );
}

#[tokio::test]
async fn writing_the_published_version_publishes() {
    let t = TestEngine::new();
    t.seed_site().await;
    let latest = t.read(&addr("pages/p")).await;

    let mut data = latest.clone();
    data["slug"] = json!("direct");
    let published = t
        .engine
        .pages()
        .put(&addr("pages/p@published"), data, &t.ctx())
        .await
        .unwrap();

    assert_eq!(published["url"], "http://example.com/direct.html");
    assert_eq!(t.read(&addr("pages/p")).await, latest);
    assert!(t.exists(&addr("layouts/main@published")).await);
}

#[tokio::test]
async fn page_writes_need_a_layout() {
    let t = TestEngine::new();

    let err = t
        .engine
        .pages()
        .put(&addr("pages/p"), json!({"title": "x"}), &t.ctx())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
    assert_eq!(err.to_string(), "Page must have a layout.");

    t.engine
        .pages()
        .put(&addr("pages/p"), json!({"layout": addr("layouts/main")}), &t.ctx())
        .await
        .unwrap();
    assert_eq!(
        t.engine.pages().get(&addr("pages/p")).await.unwrap(),
        json!({"layout": addr("layouts/main")})
    );
}

#[tokio::test]
async fn unpublish_removes_the_page_and_its_url() {
    let mut t = TestEngine::new();
    t.seed_site().await;
    let pages = t.engine.pages();
    pages.publish(&addr("pages/p"), None, &t.ctx()).await.unwrap();

    let prior = pages.unpublish(&addr("pages/p"), &t.ctx()).await.unwrap();
    assert_eq!(prior["url"], HELLO);
    assert!(!t.exists(&addr("pages/p@published")).await);
    assert!(t.engine.uris().lookup(HELLO).await.unwrap_err().is_not_found());
    // latest copy and published components stay
    assert!(t.exists(&addr("pages/p")).await);
    assert!(t.exists(&addr("layouts/main@published")).await);

    let event = t.wait_for(EventKind::UnpublishPage).await;
    assert_eq!(event.uri, addr("pages/p@published"));
    assert_eq!(event.data, prior);
}

#[tokio::test]
async fn unpublishing_a_draft_is_not_found() {
    let t = TestEngine::new();
    t.seed_site().await;

    let err = t
        .engine
        .pages()
        .unpublish(&addr("pages/p"), &t.ctx())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
