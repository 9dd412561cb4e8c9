//! Lookup, lazy loading and construction through the component registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use junifer::errors::RegistryError;
use junifer::pipeline::registry::{
    Component, ComponentClass, ComponentKind, ComponentParams, ComponentRef,
    PipelineComponentRegistry, Step,
};
use junifer::testkit::{MockMarker, MockStorage};
use junifer::{assert_contains_error, assert_result_err, assert_result_ok};
use pretty_assertions::assert_eq;
use serde_json::json;

static MARKER_LOADS: AtomicUsize = AtomicUsize::new(0);

fn load_mock_marker() -> ComponentClass {
    MARKER_LOADS.fetch_add(1, Ordering::SeqCst);
    MockMarker::class()
}

fn params(value: serde_json::Value) -> ComponentParams {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[test]
fn test_unknown_name_fails_and_leaves_registry_untouched() {
    let registry = PipelineComponentRegistry::new();
    let before = registry.components();

    let err = assert_result_err!(registry.get_class("marker", "NoSuchMarker"));
    assert!(matches!(err, RegistryError::InvalidName { .. }));
    assert!(err.to_string().contains("NoSuchMarker"));

    assert_eq!(registry.components(), before);
}

#[test]
fn test_unknown_step_lists_valid_steps() {
    let registry = PipelineComponentRegistry::new();
    let err = assert_contains_error!(registry.step_components("postprocess"), "Invalid step");
    assert!(err.to_string().contains("preprocessing"));
}

#[test]
fn test_deferred_class_loads_once() {
    let registry = PipelineComponentRegistry::new();
    assert_result_ok!(registry.register_deferred(
        "marker",
        "MockMarker",
        "junifer::testkit::MockMarker",
        load_mock_marker,
    ));
    assert_eq!(
        registry.components()[&Step::Marker]["MockMarker"],
        ComponentRef::Deferred("junifer::testkit::MockMarker".into())
    );

    let before = MARKER_LOADS.load(Ordering::SeqCst);
    let first = assert_result_ok!(registry.get_class("marker", "MockMarker"));
    let second = assert_result_ok!(registry.get_class("marker", "MockMarker"));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(MARKER_LOADS.load(Ordering::SeqCst), before + 1);
    assert_eq!(
        registry.components()[&Step::Marker]["MockMarker"],
        ComponentRef::Resolved("MockMarker".into())
    );
}

#[test]
fn test_build_checks_base_kind() {
    let registry = PipelineComponentRegistry::new();
    let storage = MockStorage::default();
    let impostor = ComponentClass::new("Impostor", move |_| {
        Ok(Component::Storage(Box::new(storage.clone())))
    });
    assert_result_ok!(registry.register("marker", impostor));

    let err = assert_result_err!(registry.build_component_instance(
        "marker",
        "Impostor",
        ComponentKind::Marker,
        None,
    ));
    match err {
        RegistryError::WrongBaseClass { expected, actual, .. } => {
            assert_eq!(expected, "Marker");
            assert_eq!(actual, "Storage");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_build_passes_params_and_wraps_constructor_errors() {
    let registry = PipelineComponentRegistry::new();
    assert_result_ok!(registry.register("marker", MockMarker::class()));

    let marker = assert_result_ok!(registry.build_component_instance(
        "marker",
        "MockMarker",
        ComponentKind::Marker,
        Some(&params(json!({"name": "fc", "on": ["BOLD", "VBM_GM"]}))),
    ))
    .into_marker()
    .unwrap();
    assert_eq!(marker.name(), "fc");
    assert_eq!(marker.on(), vec!["BOLD", "VBM_GM"]);

    let err = assert_result_err!(registry.build_component_instance(
        "marker",
        "MockMarker",
        ComponentKind::Marker,
        None,
    ));
    assert!(matches!(err, RegistryError::Construction { .. }));
    assert!(err.to_string().contains("requires a `name`"));
}

#[test]
fn test_default_datareader_rejects_unknown_params() {
    let registry = PipelineComponentRegistry::new();
    let err = assert_result_err!(registry.build_component_instance(
        "datareader",
        "DefaultDataReader",
        ComponentKind::DataReader,
        Some(&params(json!({"lazy": true}))),
    ));
    assert!(err.to_string().contains("unexpected keyword argument 'lazy'"));
}

#[test]
fn test_register_deregister_roundtrip() {
    let registry = PipelineComponentRegistry::new();
    let before = assert_result_ok!(registry.step_components("marker"));

    assert_result_ok!(registry.register("marker", MockMarker::class()));
    assert!(assert_result_ok!(registry.step_components("marker")).contains(&"MockMarker".into()));

    assert_result_ok!(registry.deregister("marker", "MockMarker"));
    assert_eq!(assert_result_ok!(registry.step_components("marker")), before);

    let err = assert_result_err!(registry.deregister("marker", "MockMarker"));
    assert!(matches!(err, RegistryError::InvalidName { .. }));
}
