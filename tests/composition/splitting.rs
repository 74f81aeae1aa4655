//! Cascading writes and the round trip back through the resolver

use crate::common::*;
use trellis::json::ref_addresses;

#[tokio::test]
async fn round_trip_restores_the_composed_document() {
    let t = TestEngine::new();
    let ctx = t.ctx();
    let root = addr("components/article/instances/1");
    let document = json!({
        "title": "Hello",
        "byline": {"_ref": addr("components/byline/instances/1"), "name": "Ed"},
        "body": [
            {"_ref": addr("components/text/instances/1"), "text": "one"},
            {
                "_ref": addr("components/quote/instances/1"),
                "cite": {"_ref": addr("components/text/instances/2"), "text": "two"}
            }
        ]
    });

    t.engine
        .components()
        .put_and_commit(&root, document.clone(), &ctx)
        .await
        .unwrap();

    let composed = t.engine.components().get_composed(&root, &ctx).await.unwrap();
    assert_eq!(composed, document);
}

#[tokio::test]
async fn every_record_lands_at_its_own_address() {
    let t = TestEngine::new();
    let ctx = t.ctx();
    let root = addr("components/article/instances/1");

    t.engine
        .components()
        .put_and_commit(
            &root,
            json!({
                "a": "b",
                "c": {"_ref": addr("components/d/instances/1"), "e": "f"}
            }),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(t.read(&addr("components/d/instances/1")).await, json!({"e": "f"}));
    assert_eq!(
        t.read(&root).await,
        json!({"a": "b", "c": {"_ref": addr("components/d/instances/1")}})
    );
    assert_eq!(t.store.len(), 2);
}

#[tokio::test]
async fn published_write_keeps_the_version_plane() {
    let t = TestEngine::new();
    let ctx = t.ctx();
    let root = addr("components/list/instances/1@published");

    t.engine
        .components()
        .put_and_commit(
            &root,
            json!({
                "items": [
                    {"_ref": addr("components/item/instances/1"), "n": 1},
                    {"_ref": addr("components/item/instances/2@draft"), "n": 2},
                    {"_ref": addr("components/footer")}
                ]
            }),
            &ctx,
        )
        .await
        .unwrap();

    let stored = t.read(&root).await;
    let addresses = ref_addresses(&stored);
    assert_eq!(addresses.len(), 3);
    for address in addresses {
        assert!(address.ends_with("@published"), "{} escaped the plane", address);
    }
    assert!(t.exists(&addr("components/item/instances/2@published")).await);
    assert!(!t.exists(&addr("components/item/instances/2")).await);
}

#[tokio::test]
async fn named_tags_are_written_but_not_propagated() {
    let t = TestEngine::new();
    let ctx = t.ctx();

    t.engine
        .components()
        .put_and_commit(
            &addr("components/card/instances/1@review"),
            json!({"media": {"_ref": addr("components/image/instances/1"), "src": "x.png"}}),
            &ctx,
        )
        .await
        .unwrap();

    assert!(t.exists(&addr("components/card/instances/1@review")).await);
    assert!(t.exists(&addr("components/image/instances/1")).await);
}

#[tokio::test]
async fn save_fires_an_event() {
    let mut t = TestEngine::new();
    let ctx = t.ctx();
    let root = addr("components/text/instances/9");

    t.engine
        .components()
        .put_and_commit(&root, json!({"text": "hi"}), &ctx)
        .await
        .unwrap();

    let event = t.next_event().await;
    assert_eq!(event.event, EventKind::Save);
    assert_eq!(event.uri, root);
    assert_eq!(event.data, json!({"text": "hi"}));
}

#[tokio::test]
async fn overly_deep_documents_are_rejected_before_writing() {
    let t = TestEngine::new();
    let ctx = t.ctx();
    let mut document = json!("leaf");
    for _ in 0..150 {
        document = json!({ "child": document });
    }

    let err = t
        .engine
        .components()
        .put_and_commit(&addr("components/deep/instances/1"), document, &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
    assert!(t.store.is_empty());
}
