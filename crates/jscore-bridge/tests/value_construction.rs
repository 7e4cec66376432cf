//! Value manufacture and marshaling through a live bridge

use jscore_bridge::{JsContext, JscError, StandaloneFrame, ValueKind, ValueOrigin};
use serde::{Deserialize, Serialize};
use serial_test::serial;

#[test]
#[serial]
fn numbers_round_trip_exactly() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();

    for n in [0.0, 1.5, -273.15, f64::MAX, f64::MIN_POSITIVE, f64::INFINITY, f64::NEG_INFINITY] {
        let value = ctx.make_number(n).unwrap();
        assert_eq!(value.kind(), ValueKind::Number);
        assert_eq!(value.to_number().unwrap(), n);
    }

    let negative_zero = ctx.make_number(-0.0).unwrap().to_number().unwrap();
    assert_eq!(negative_zero.to_bits(), (-0.0f64).to_bits());

    let nan = ctx.make_number(f64::NAN).unwrap();
    assert_eq!(nan.kind(), ValueKind::Number);
    assert!(nan.to_number().unwrap().is_nan());
}

#[test]
#[serial]
fn negative_zero_is_visible_to_script() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();
    let global = ctx.global_object().unwrap();

    global.set("z", &ctx.make_number(-0.0).unwrap()).unwrap();
    let is_negative_zero = ctx.evaluate_script("Object.is(z, -0)").unwrap();
    assert_eq!(is_negative_zero.as_bool(), Some(true));
}

#[test]
#[serial]
fn booleans_and_empty_values() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();

    let t = ctx.make_boolean(true).unwrap();
    assert_eq!(t.kind(), ValueKind::Boolean);
    assert_eq!(t.as_bool(), Some(true));
    assert_eq!(t.origin(), ValueOrigin::Made);
    assert_eq!(ctx.make_boolean(false).unwrap().as_bool(), Some(false));

    assert_eq!(ctx.make_undefined().unwrap().kind(), ValueKind::Undefined);
    assert_eq!(ctx.make_null().unwrap().kind(), ValueKind::Null);
}

#[test]
#[serial]
fn strings_survive_nul_and_non_ascii() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();

    for s in ["", "plain", "with\0nul", "日本語", "emoji 🦀", "\u{FEFF}bom"] {
        let value = ctx.make_string(s).unwrap();
        assert_eq!(value.kind(), ValueKind::String);
        assert_eq!(value.as_string().as_deref(), Some(s));
    }

    let global = ctx.global_object().unwrap();
    global.set("s", &ctx.make_string("a\0b").unwrap()).unwrap();
    assert_eq!(ctx.evaluate_script("s.length").unwrap().as_number(), Some(3.0));
}

#[test]
#[serial]
fn json_strings_become_values() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();

    let object = ctx.make_value_from_json_string(r#"{"a":1}"#).unwrap();
    assert_eq!(object.kind(), ValueKind::Object);
    assert_eq!(object.origin(), ValueOrigin::Json);
    let a = object.into_object().unwrap().get("a").unwrap();
    assert_eq!(a.as_number(), Some(1.0));

    assert!(ctx.make_value_from_json_string("[1,2]").unwrap().is_array());
    assert_eq!(
        ctx.make_value_from_json_string("\"text\"").unwrap().kind(),
        ValueKind::String
    );
}

#[test]
#[serial]
fn invalid_json_is_a_json_error() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();

    for input in ["not json", "{", "{'a': 1}", ""] {
        let err = ctx.make_value_from_json_string(input).unwrap_err();
        assert!(matches!(err, JscError::JsonParse { .. }), "{input:?}: {err}");
        assert!(!err.is_script_error());
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Record {
    id: String,
    active: bool,
    tags: Vec<String>,
}

#[test]
#[serial]
fn serde_values_cross_the_bridge() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();
    let record = Record {
        id: "p1".into(),
        active: true,
        tags: vec!["a".into(), "b".into()],
    };

    let value = ctx.make_value_from_serde(&record).unwrap();
    let global = ctx.global_object().unwrap();
    global.set("record", &value).unwrap();

    let updated = ctx
        .evaluate_script("record.tags.push('c'); record.active = false; record")
        .unwrap();
    let back: Record = updated.deserialize().unwrap();
    assert_eq!(back.id, "p1");
    assert!(!back.active);
    assert_eq!(back.tags, vec!["a", "b", "c"]);
}

#[test]
#[serial]
fn conversions_follow_script_semantics() {
    let frame = StandaloneFrame::new().unwrap();
    let ctx = JsContext::new(&frame).unwrap();

    assert!(!ctx.make_string("").unwrap().to_bool().unwrap());
    assert!(ctx.make_string("0").unwrap().to_bool().unwrap());
    assert!(ctx.make_undefined().unwrap().to_number().unwrap().is_nan());
    assert_eq!(ctx.make_null().unwrap().to_number().unwrap(), 0.0);
    assert_eq!(ctx.make_boolean(true).unwrap().to_string().unwrap(), "true");
    assert_eq!(ctx.evaluate_script("[1, [2, 3]]").unwrap().to_string().unwrap(), "1,2,3");
    assert_eq!(ctx.evaluate_script("({a: [1]})").unwrap().to_json().unwrap(), r#"{"a":[1]}"#);
}
