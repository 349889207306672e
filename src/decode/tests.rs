//! Tests for the decoder

use super::*;
use crate::mapping::{parse, DEMO_MAPPING};
use proptest::prelude::*;
use std::sync::Mutex;

fn msg(status: u8, data1: u8, data2: u8) -> MidiMessage {
    MidiMessage::new(status, data1, data2).unwrap()
}

fn mapping(controls: &[(&str, &str, u8, u8)], script: Option<&str>) -> MappingDefinition {
    let body: String = controls
        .iter()
        .map(|(group, key, status, note)| {
            format!(
                "<control><group>{}</group><key>{}</key><status>{}</status><midino>{}</midino></control>",
                group, key, status, note
            )
        })
        .collect();
    let xml = format!(
        "<preset><controller><controls>{}</controls></controller></preset>",
        body
    );
    parse(&xml, script).unwrap()
}

/// Records every call and answers with a fixed action list
#[derive(Default)]
struct RecordingEvaluator {
    calls: Mutex<Vec<(String, String, String, Option<u32>, bool)>>,
    fail: bool,
}

impl ScriptEvaluator for RecordingEvaluator {
    fn evaluate(&self, source: &str, ctx: &DecodeContext<'_>) -> anyhow::Result<Vec<Action>> {
        self.calls.lock().unwrap().push((
            source.to_string(),
            ctx.group().to_string(),
            ctx.key().to_string(),
            ctx.deck,
            ctx.down,
        ));
        if self.fail {
            anyhow::bail!("ReferenceError: jogWheel is not defined");
        }
        Ok(vec![Action::change(Control::Rate, ctx)])
    }
}

#[test]
fn test_play_down_and_up() {
    let definition = mapping(&[("[Channel1]", "play", 0x90, 0x20)], None);

    let actions = decode(&definition, &msg(0x90, 0x20, 0x7F));
    assert_eq!(
        actions,
        vec![Action {
            tag: ActionTag::Press,
            control: Control::Play,
            deck: Some(1),
            down: true,
            value: 0x7F,
        }]
    );

    let actions = decode(&definition, &msg(0x90, 0x20, 0x00));
    assert_eq!(actions.len(), 1);
    assert!(!actions[0].down);
    assert_eq!(actions[0].deck, Some(1));
    assert_eq!(actions[0].control, Control::Play);
}

#[test]
fn test_first_binding_wins() {
    let definition = mapping(
        &[
            ("[Channel1]", "play", 0x90, 0x20),
            ("[Channel2]", "cue_default", 0x90, 0x20),
        ],
        None,
    );

    for velocity in [0x00, 0x01, 0x40, 0x7F] {
        let actions = decode(&definition, &msg(0x90, 0x20, velocity));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].control, Control::Play);
        assert_eq!(actions[0].deck, Some(1));
    }
}

#[test]
fn test_shadowed_binding_even_when_first_is_unhandled() {
    // The first match is taken even if its key yields nothing
    let definition = mapping(
        &[
            ("[Channel1]", "not_a_control", 0x90, 0x20),
            ("[Channel1]", "play", 0x90, 0x20),
        ],
        None,
    );
    assert!(decode(&definition, &msg(0x90, 0x20, 0x7F)).is_empty());
}

#[test]
fn test_unmapped_message_is_noop() {
    let definition = parse(DEMO_MAPPING, None).unwrap();
    assert!(decode(&definition, &msg(0x90, 0x7E, 0x7F)).is_empty());
    // Same note, different channel
    assert!(decode(&definition, &msg(0x92, 0x20, 0x7F)).is_empty());
}

#[test]
fn test_master_group_has_no_deck() {
    let definition = parse(DEMO_MAPPING, None).unwrap();
    let actions = decode(&definition, &msg(0xB6, 31, 64));
    assert_eq!(
        actions,
        vec![Action {
            tag: ActionTag::Change,
            control: Control::Crossfader,
            deck: None,
            down: true,
            value: 64,
        }]
    );
}

#[test]
fn test_builtin_kinds_from_demo() {
    let definition = parse(DEMO_MAPPING, None).unwrap();

    let hotcue = decode(&definition, &msg(0x90, 36, 0x7F));
    assert_eq!(hotcue[0].control, Control::Hotcue { index: 1 });
    assert_eq!(hotcue[0].tag, ActionTag::Press);

    let volume = decode(&definition, &msg(0xB1, 19, 0));
    assert_eq!(volume[0].control, Control::Volume);
    assert_eq!(volume[0].tag, ActionTag::Change);
    assert_eq!(volume[0].deck, Some(2));
    assert_eq!(volume[0].value, 0);
    assert!(!volume[0].down);
}

#[test]
fn test_unknown_key_without_script_is_empty() {
    let definition = mapping(&[("[Channel1]", "DemoController.jogWheel", 0xB0, 34)], None);
    let evaluator = Arc::new(RecordingEvaluator::default());
    let decoder = Decoder::default().with_evaluator(evaluator.clone());

    assert!(decoder.decode(&definition, &msg(0xB0, 34, 65)).is_empty());
    assert!(evaluator.calls.lock().unwrap().is_empty());
}

#[test]
fn test_unknown_key_with_script_reaches_evaluator() {
    let definition = mapping(
        &[("[Channel2]", "DemoController.jogWheel", 0xB0, 34)],
        Some("var DemoController = {};"),
    );
    let evaluator = Arc::new(RecordingEvaluator::default());
    let decoder = Decoder::default().with_evaluator(evaluator.clone());

    let actions = decoder.decode(&definition, &msg(0xB0, 34, 65));
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].control, Control::Rate);
    assert_eq!(actions[0].deck, Some(2));

    let calls = evaluator.calls.lock().unwrap();
    assert_eq!(
        calls.as_slice(),
        &[(
            "var DemoController = {};".to_string(),
            "[Channel2]".to_string(),
            "DemoController.jogWheel".to_string(),
            Some(2),
            true,
        )]
    );
}

#[test]
fn test_scripted_key_without_evaluator_is_empty() {
    let definition = mapping(
        &[("[Channel1]", "DemoController.jogWheel", 0xB0, 34)],
        Some("var DemoController = {};"),
    );
    assert!(decode(&definition, &msg(0xB0, 34, 65)).is_empty());
}

#[test]
fn test_evaluator_error_is_swallowed() {
    let definition = mapping(
        &[("[Channel1]", "DemoController.jogWheel", 0xB0, 34)],
        Some("broken"),
    );
    let evaluator = Arc::new(RecordingEvaluator {
        fail: true,
        ..Default::default()
    });
    let decoder = Decoder::default().with_evaluator(evaluator.clone());

    assert!(decoder.decode(&definition, &msg(0xB0, 34, 1)).is_empty());
    assert_eq!(evaluator.calls.lock().unwrap().len(), 1);
}

#[test]
fn test_builtin_key_skips_evaluator() {
    let definition = mapping(&[("[Channel1]", "play", 0x90, 0x20)], Some("var x;"));
    let evaluator = Arc::new(RecordingEvaluator::default());
    let decoder = Decoder::default().with_evaluator(evaluator.clone());

    let actions = decoder.decode(&definition, &msg(0x90, 0x20, 0x7F));
    assert_eq!(actions[0].control, Control::Play);
    assert!(evaluator.calls.lock().unwrap().is_empty());
}

#[test]
fn test_custom_registry() {
    let mut registry = HandlerRegistry::new();
    registry.register("play", |ctx: &DecodeContext<'_>| {
        // Only react to presses
        if ctx.down {
            vec![Action::press(Control::Play, ctx)]
        } else {
            Vec::new()
        }
    });
    registry.register("loop_toggle", |_: &DecodeContext<'_>| Vec::new());
    assert_eq!(registry.len(), 2);
    assert!(!registry.contains("cue_default"));

    let decoder = Decoder::new(registry);
    let definition = mapping(
        &[
            ("[Channel1]", "play", 0x90, 0x20),
            ("[Channel1]", "cue_default", 0x90, 0x21),
        ],
        None,
    );

    assert_eq!(decoder.decode(&definition, &msg(0x90, 0x20, 0x7F)).len(), 1);
    assert!(decoder.decode(&definition, &msg(0x90, 0x20, 0x00)).is_empty());
    assert!(decoder.decode(&definition, &msg(0x90, 0x21, 0x7F)).is_empty());
}

#[test]
fn test_builtin_registry_contents() {
    let registry = HandlerRegistry::builtin();
    let keys = [
        "play",
        "cue_default",
        "sync_enabled",
        "pfl",
        "keylock",
        "volume",
        "rate",
        "crossfader",
    ];
    for key in keys {
        assert!(registry.contains(key), "missing {}", key);
    }
    assert!(registry.contains("hotcue_1_activate"));
    assert!(registry.contains("hotcue_8_activate"));
    assert!(!registry.contains("hotcue_9_activate"));
}

#[test]
fn test_action_json_shape() {
    let definition = mapping(&[("[Channel1]", "play", 0x90, 0x20)], None);
    let actions = decode(&definition, &msg(0x90, 0x20, 0x7F));

    let json = serde_json::to_value(&actions[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "tag": "press",
            "control": { "kind": "play" },
            "deck": 1,
            "down": true,
            "value": 127
        })
    );

    let hotcue = serde_json::to_value(Control::Hotcue { index: 3 }).unwrap();
    assert_eq!(hotcue, serde_json::json!({ "kind": "hotcue", "index": 3 }));
}

#[test]
fn test_shared_definition_across_threads() {
    let definition = Arc::new(parse(DEMO_MAPPING, None).unwrap());
    let decoder = Decoder::default();

    std::thread::scope(|scope| {
        for status in [0x90u8, 0x91] {
            let definition = Arc::clone(&definition);
            let decoder = decoder.clone();
            scope.spawn(move || {
                for _ in 0..100 {
                    let actions = decoder.decode(&definition, &msg(status, 0x20, 0x7F));
                    assert_eq!(actions.len(), 1);
                    assert_eq!(actions[0].control, Control::Play);
                }
            });
        }
    });
}

fn any_message() -> impl Strategy<Value = MidiMessage> {
    (0x80u8..0xF0, 0u8..0x80, 0u8..0x80).prop_map(|(s, d1, d2)| msg(s, d1, d2))
}

proptest! {
    #[test]
    fn prop_empty_mapping_decodes_nothing(message in any_message()) {
        let definition = MappingDefinition::default();
        prop_assert!(decode(&definition, &message).is_empty());
    }

    #[test]
    fn prop_decode_is_deterministic(message in any_message()) {
        let definition = parse(DEMO_MAPPING, None).unwrap();
        let first = decode(&definition, &message);
        let second = decode(&definition, &message);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_down_follows_velocity(velocity in 0u8..0x80) {
        let definition = mapping(&[("[Channel3]", "pfl", 0x92, 0x10)], None);
        let actions = decode(&definition, &msg(0x92, 0x10, velocity));
        prop_assert_eq!(actions.len(), 1);
        prop_assert_eq!(actions[0].down, velocity > 0);
        prop_assert_eq!(actions[0].deck, Some(3));
    }
}
