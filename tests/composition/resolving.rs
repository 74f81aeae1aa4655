//! Reading composed documents

use crate::common::*;

#[tokio::test]
async fn fetched_record_merges_onto_the_placeholder() {
    let t = TestEngine::new();
    t.seed(&[("/c/b", json!({"g": "h"}))]).await;

    let composed = t
        .engine
        .resolve(json!({"a": {"_ref": "/c/b"}}), &t.ctx())
        .await
        .unwrap();
    assert_eq!(composed, json!({"a": {"_ref": "/c/b", "g": "h"}}));
}

#[tokio::test]
async fn failing_branch_is_named_in_the_error() {
    let t = TestEngine::new();
    t.seed(&[
        (
            &addr("components/article/instances/1"),
            json!({"related": [{"_ref": addr("components/teaser/instances/1")}]}),
        ),
        (
            &addr("components/teaser/instances/1"),
            json!({"image": {"_ref": addr("components/image/instances/404")}}),
        ),
    ])
    .await;

    let err = t
        .engine
        .resolve(
            json!({"main": [{"_ref": addr("components/article/instances/1")}]}),
            &t.ctx(),
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        err.reference_trail(),
        vec![
            addr("components/article/instances/1"),
            addr("components/teaser/instances/1"),
            addr("components/image/instances/404"),
        ]
    );
    let message = err.to_string();
    assert!(message.contains("components/image/instances/404"));
    assert!(message.contains("components/article/instances/1"));
}

#[tokio::test]
async fn reference_cycles_fail_fast() {
    let t = TestEngine::new();
    t.seed(&[
        (
            &addr("components/a/instances/1"),
            json!({"next": {"_ref": addr("components/b/instances/1")}}),
        ),
        (
            &addr("components/b/instances/1"),
            json!({"next": {"_ref": addr("components/c/instances/1")}}),
        ),
        (
            &addr("components/c/instances/1"),
            json!({"back": {"_ref": addr("components/a/instances/1")}}),
        ),
    ])
    .await;

    let err = t
        .engine
        .components()
        .get_composed(&addr("components/a/instances/1"), &t.ctx())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
    assert!(err.root_cause().to_string().starts_with("reference cycle detected"));
}

#[tokio::test]
async fn shared_record_in_sibling_branches_resolves_twice() {
    let t = TestEngine::new();
    t.seed(&[
        (&addr("components/ad"), json!({"slot": "top"})),
        (
            &addr("components/rail/instances/1"),
            json!({"ad": {"_ref": addr("components/ad")}}),
        ),
    ])
    .await;

    let composed = t
        .engine
        .resolve(
            json!({
                "rail": {"_ref": addr("components/rail/instances/1")},
                "ad": {"_ref": addr("components/ad")}
            }),
            &t.ctx(),
        )
        .await
        .unwrap();
    assert_eq!(composed["ad"]["slot"], "top");
    assert_eq!(composed["rail"]["ad"]["slot"], "top");
}

#[tokio::test]
async fn published_defaults_read_through_to_latest() {
    let t = TestEngine::new();
    t.seed(&[(&addr("components/nav"), json!({"links": ["home"]}))])
        .await;

    let composed = t
        .engine
        .resolve(
            json!({"nav": {"_ref": addr("components/nav@published")}}),
            &t.ctx(),
        )
        .await
        .unwrap();
    assert_eq!(composed["nav"]["links"], json!(["home"]));
}
