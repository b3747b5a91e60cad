//! Incremental behaviour: reuse, minimal updates, and idempotence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weft_conformance::auto_notify::{self, ClassKey};
use weft_conformance::inputs::{auto_notify_field, generated_method};
use weft_conformance::{auto_notify_generator, demo_driver, demo_snapshot, make_config, snapshot};
use weft_engine::{AdditionalText, Driver, FragmentKind, PipelineBuilder, SyntaxFragment};

/// The `_count` scenario: a bare field fragment in a class.
fn count_field(ty: &str) -> SyntaxFragment {
    SyntaxFragment::new("Counter._count", FragmentKind::Field, "AutoNotify.AutoNotifyAttribute")
        .with_property("class", "Counter")
        .with_property("name", "_count")
        .with_property("type", ty)
}

#[test]
fn count_field_generates_count_accessor() {
    let driver = Driver::new(auto_notify_generator().unwrap(), &make_config(true)).unwrap();
    let result = driver
        .evaluate(snapshot(vec![count_field("int")], vec![], &[]))
        .unwrap();

    assert_eq!(result.artifacts_added.len(), 1);
    let artifact = &result.artifacts_added[0];
    assert_eq!(artifact.name, "Counter_AutoNotify.g.cs");
    assert!(artifact.content.contains("public int Count"));
}

#[test]
fn changing_field_type_updates_exactly_one_artifact() {
    let driver = Driver::new(auto_notify_generator().unwrap(), &make_config(true)).unwrap();
    let first = driver
        .evaluate(snapshot(vec![count_field("int")], vec![], &[]))
        .unwrap();
    let second = driver
        .evaluate(snapshot(vec![count_field("long")], vec![], &[]))
        .unwrap();

    assert!(second.artifacts_added.is_empty());
    assert!(second.artifacts_removed.is_empty());
    assert_eq!(second.artifacts_updated.len(), 1);
    let updated = &second.artifacts_updated[0];
    assert_eq!(updated.name, first.artifacts_added[0].name);
    assert!(updated.content.contains("public long Count"));
    assert!(!updated.content.contains("public int Count"));
}

/// AutoNotify wired with a counter around class rendering.
fn counting_driver(renders: Arc<AtomicUsize>) -> Driver {
    let builder = PipelineBuilder::new();
    let classes = builder
        .syntax()
        .where_kind("field")
        .try_map(auto_notify::to_property_model)
        .group_by(|f| ClassKey {
            namespace: f.namespace.clone(),
            class: f.class.clone(),
        });
    builder.register_output(&classes, move |ctx, group| {
        renders.fetch_add(1, Ordering::SeqCst);
        ctx.add_artifact(
            auto_notify::artifact_name(&group.key),
            auto_notify::render_class(&group.key, &group.members),
        )?;
        Ok(())
    });
    Driver::new(builder.build().unwrap(), &make_config(true)).unwrap()
}

#[test]
fn unrelated_class_is_reused() {
    let renders = Arc::new(AtomicUsize::new(0));
    let driver = counting_driver(Arc::clone(&renders));
    let fields = |ty: &str| {
        vec![
            auto_notify_field("App", "Alpha", "_a", ty),
            auto_notify_field("App", "Beta", "_b", "int"),
            auto_notify_field("App", "Beta", "_c", "string"),
        ]
    };

    driver.evaluate(snapshot(fields("int"), vec![], &[])).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    let beta_before = driver.artifact("Beta_AutoNotify.g.cs").unwrap();

    let result = driver.evaluate(snapshot(fields("double"), vec![], &[])).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 3);
    let updated: Vec<&str> = result
        .artifacts_updated
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(updated, vec!["Alpha_AutoNotify.g.cs"]);
    assert_eq!(driver.artifact("Beta_AutoNotify.g.cs").unwrap(), beta_before);
}

#[test]
fn reordered_inputs_do_not_rerender() {
    let renders = Arc::new(AtomicUsize::new(0));
    let driver = counting_driver(Arc::clone(&renders));
    let a = auto_notify_field("App", "Alpha", "_a", "int");
    let a2 = auto_notify_field("App", "Alpha", "_a2", "string");
    let b = auto_notify_field("App", "Beta", "_b", "int");

    driver
        .evaluate(snapshot(vec![a.clone(), a2.clone(), b.clone()], vec![], &[]))
        .unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    let alpha = driver.artifact("Alpha_AutoNotify.g.cs").unwrap();

    // Across classes.
    let result = driver
        .evaluate(snapshot(vec![b.clone(), a.clone(), a2.clone()], vec![], &[]))
        .unwrap();
    assert!(result.is_unchanged());
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    // Within one class.
    let result = driver.evaluate(snapshot(vec![b, a2, a], vec![], &[])).unwrap();
    assert!(result.is_unchanged());
    assert!(result.artifacts_updated.is_empty());
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(driver.artifact("Alpha_AutoNotify.g.cs").unwrap(), alpha);
}

#[test]
fn unchanged_snapshot_is_idempotent() {
    let driver = demo_driver(&make_config(true));
    driver.evaluate(demo_snapshot()).unwrap();
    let result = driver.evaluate(demo_snapshot()).unwrap();

    assert!(result.is_unchanged());
    assert_eq!(result.generation, 2);
    assert_eq!(result.stats.recomputed, 0);
    assert_eq!(result.stats.inputs_unchanged, demo_snapshot().len());
}

#[test]
fn removing_inputs_removes_artifacts_and_evicts_entries() {
    let driver = demo_driver(&make_config(false));
    driver.evaluate(demo_snapshot()).unwrap();

    let trimmed = snapshot(
        vec![generated_method("GeneratedNamespace", "UserClass", "UserMethod")],
        vec![],
        &[("emit_log", "true")],
    );
    let result = driver.evaluate(trimmed).unwrap();

    assert_eq!(
        result.artifacts_removed,
        vec!["TextClass.g.cs".to_string(), "UserClass_AutoNotify.g.cs".to_string()]
    );
    assert!(result.artifacts_added.is_empty());
    assert!(result.stats.evicted > 0);
    assert_eq!(result.stats.inputs_removed, 4);
    assert!(driver.artifact("UserClass_UserMethod.g.cs").is_some());
}

#[test]
fn adding_a_text_adds_only_its_artifact() {
    let driver = demo_driver(&make_config(true));
    driver.evaluate(demo_snapshot()).unwrap();

    let mut items = demo_snapshot().items().to_vec();
    items.push(AdditionalText::new("More.txt", "class More {}").into());
    let result = driver
        .evaluate(weft_engine::InputSnapshot::new(items).unwrap())
        .unwrap();

    let added: Vec<&str> = result.artifacts_added.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(added, vec!["More.g.cs"]);
    assert!(result.artifacts_updated.is_empty());
}

#[test]
fn option_change_only_touches_option_outputs() {
    let driver = demo_driver(&make_config(false));
    driver.evaluate(demo_snapshot()).unwrap();

    let mut items: Vec<weft_engine::InputItem> = demo_snapshot()
        .items()
        .iter()
        .filter(|item| item.identity() != "option:emit_log")
        .cloned()
        .collect();
    items.push(weft_engine::InputItem::Option {
        key: "emit_log".into(),
        value: "false".into(),
    });
    let result = driver
        .evaluate(weft_engine::InputSnapshot::new(items).unwrap())
        .unwrap();

    assert!(result.is_unchanged());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message == "EmitLogging: false"));
    assert_eq!(result.stats.inputs_modified, 1);
}
