use gaze_contingent::gaze::units::Units;
use gaze_contingent::trial::{EventKind, ExperimentConfig, SessionEvent};

#[test]
fn pt_serialization_roundtrip() {
    let config = ExperimentConfig {
        sac_to_reward: [2, 4],
        units: Units::Pix,
        ..ExperimentConfig::default()
    };
    let encoded = serde_json::to_string(&config).expect("serialize config");
    let decoded: ExperimentConfig = serde_json::from_str(&encoded).expect("deserialize config");
    assert_eq!(decoded, config);

    let event = SessionEvent::now(
        3,
        120,
        EventKind::PursuitSaccade {
            count: 2,
            x: 0.5,
            y: -1.25,
        },
    );
    let encoded_event = serde_json::to_string(&event).expect("serialize event");
    let decoded_event: SessionEvent = serde_json::from_str(&encoded_event).expect("deserialize event");
    assert_eq!(decoded_event, event);
}

#[test]
fn config_file_may_omit_optional_sections() {
    let raw = r#"{
        "refreshRateHz": 60.0,
        "trackerRateHz": 120.0,
        "criterionSecs": 6.0,
        "fixRadiusDeg": 3.0,
        "sacToReward": [3, 5],
        "maxSacPerPursuit": 12,
        "blinkToleranceSecs": 0.2,
        "rewardDurationSecs": 2.5,
        "maxNrRewards": 1,
        "initBlockSecs": 1.0,
        "dataLagFrames": 14,
        "maxFixIntervalSecs": 2.0
    }"#;
    let config: ExperimentConfig = serde_json::from_str(raw).expect("deserialize config");
    let defaults = ExperimentConfig::default();
    assert_eq!(config.fixation, defaults.fixation);
    assert_eq!(config.target_agents, vec![0, 1]);
    assert_eq!(config.units, Units::Deg);
    assert_eq!(config.thresholds().max_trial_frames, 7200);
    assert!(config.validate().is_ok());
}

#[test]
fn event_kinds_use_tagged_camel_case() {
    let encoded = serde_json::to_value(EventKind::PhaseAdvanced { from: 3, to: 1 }).expect("serialize");
    assert_eq!(encoded["type"], "phaseAdvanced");
    assert_eq!(encoded["from"], 3);

    let divergence: EventKind = serde_json::from_str(
        r#"{"type": "replayDivergence", "expected": "Reward Off", "frame_offset": null}"#,
    )
    .expect("deserialize");
    assert_eq!(
        divergence,
        EventKind::ReplayDivergence {
            expected: "Reward Off".to_string(),
            frame_offset: None,
        }
    );
}
