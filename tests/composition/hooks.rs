//! Per-type hooks on the read and write paths

use std::sync::Arc;

use async_trait::async_trait;
use trellis::{BatchOp, FormatHook, RecordHooks, Result, SaveOutcome};

use crate::common::*;

/// Stores a word count next to the text
struct Counted;

#[async_trait]
impl RecordHooks for Counted {
    async fn save(&self, _address: &str, mut data: Value, _ctx: &RequestContext) -> Result<SaveOutcome> {
        let words = data["text"]
            .as_str()
            .map(|text| text.split_whitespace().count())
            .unwrap_or(0);
        data["words"] = json!(words);
        Ok(SaveOutcome::Document(data))
    }

    async fn render(&self, _address: &str, mut data: Value, _ctx: &RequestContext) -> Result<Value> {
        data["rendered"] = json!(true);
        Ok(data)
    }
}

/// Keeps a tombstone instead of deleting
struct Tombstone;

#[async_trait]
impl RecordHooks for Tombstone {
    async fn del(&self, address: &str, prior: &Value, _ctx: &RequestContext) -> Result<Vec<BatchOp>> {
        Ok(vec![
            BatchOp::del(address),
            BatchOp::put_json(format!("{}@deleted", address), prior)?,
        ])
    }
}

/// Writes nothing for its own records
struct Silent;

#[async_trait]
impl RecordHooks for Silent {
    async fn save(&self, _address: &str, _data: Value, _ctx: &RequestContext) -> Result<SaveOutcome> {
        Ok(SaveOutcome::Operations(Vec::new()))
    }
}

struct Summary;

#[async_trait]
impl FormatHook for Summary {
    async fn format(&self, address: &str, data: Value, _ctx: &RequestContext) -> Result<Value> {
        Ok(json!({"address": address, "fields": data.as_object().map_or(0, |d| d.len())}))
    }
}

fn engine_with_hooks(store: &MemoryStore) -> Engine {
    Engine::builder()
        .storage(Arc::new(store.clone()))
        .config(test_config())
        .component_hooks("text", Arc::new(Counted))
        .component_hooks("note", Arc::new(Tombstone))
        .component_hooks("void", Arc::new(Silent))
        .format_hook("summary", Arc::new(Summary))
        .build()
        .unwrap()
}

#[tokio::test]
async fn save_hook_runs_for_nested_records_too() {
    let store = MemoryStore::new();
    let engine = engine_with_hooks(&store);
    let ctx = engine.context();

    engine
        .components()
        .put_and_commit(
            &addr("components/article/instances/1"),
            json!({"body": {"_ref": addr("components/text/instances/1"), "text": "a b c"}}),
            &ctx,
        )
        .await
        .unwrap();

    let text = store
        .get_json(&addr("components/text/instances/1"))
        .await
        .unwrap();
    assert_eq!(text, json!({"text": "a b c", "words": 3}));
}

#[tokio::test]
async fn render_hook_runs_during_composition() {
    let store = MemoryStore::new();
    let engine = engine_with_hooks(&store);
    let ctx = engine.context();
    store
        .put_json(
            &addr("components/article/instances/1"),
            &json!({"body": {"_ref": addr("components/text/instances/1")}}),
        )
        .await
        .unwrap();
    store
        .put_json(&addr("components/text/instances/1"), &json!({"text": "x"}))
        .await
        .unwrap();

    let composed = engine
        .components()
        .get_composed(&addr("components/article/instances/1"), &ctx)
        .await
        .unwrap();
    assert_eq!(composed["body"]["rendered"], true);
}

#[tokio::test]
async fn format_hook_follows_the_request_extension() {
    let store = MemoryStore::new();
    let engine = engine_with_hooks(&store);
    store
        .put_json(&addr("components/text/instances/1"), &json!({"text": "x"}))
        .await
        .unwrap();

    let summary = engine
        .components()
        .get(
            &addr("components/text/instances/1"),
            &engine.context().with_extension("summary"),
        )
        .await
        .unwrap();
    // render adds a field before the format hook sees the data
    assert_eq!(summary["fields"], 2);

    let unknown = engine
        .components()
        .get(
            &addr("components/text/instances/1"),
            &engine.context().with_extension("rss"),
        )
        .await
        .unwrap();
    assert_eq!(unknown, json!({"text": "x", "rendered": true}));
}

#[tokio::test]
async fn del_hook_replaces_the_default_delete() {
    let store = MemoryStore::new();
    let engine = engine_with_hooks(&store);
    let ctx = engine.context();
    let note = addr("components/note/instances/1");
    store.put_json(&note, &json!({"body": "remember"})).await.unwrap();

    let prior = engine.components().del(&note, &ctx).await.unwrap();
    assert_eq!(prior, json!({"body": "remember"}));
    assert!(store.get(&note).await.is_err());
    assert_eq!(
        store.get_json(&format!("{}@deleted", note)).await.unwrap(),
        json!({"body": "remember"})
    );
}

#[tokio::test]
async fn root_write_with_no_operations_is_a_defect() {
    let store = MemoryStore::new();
    let engine = engine_with_hooks(&store);

    let err = engine
        .components()
        .put_and_commit(
            &addr("components/void/instances/1"),
            json!({"a": 1}),
            &engine.context(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Defect);
    assert!(err.to_string().contains("components/void/instances/1"));
    assert!(store.is_empty());
}
