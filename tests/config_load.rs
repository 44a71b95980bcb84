use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use headcount::config::HeadcountConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HEADCOUNT_CONFIG",
        "HEADCOUNT_BACKEND",
        "HEADCOUNT_MODEL_PATH",
        "HEADCOUNT_REFRESH_HZ",
        "HEADCOUNT_MIN_CONFIDENCE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "backend": "stub",
        "model_input_size": 320,
        "min_confidence": 0.25,
        "iou_threshold": 0.6,
        "refresh_hz": 30,
        "child_area_threshold": 12000.0
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("HEADCOUNT_CONFIG", file.path());
    std::env::set_var("HEADCOUNT_REFRESH_HZ", "24");
    std::env::set_var("HEADCOUNT_MIN_CONFIDENCE", "0.4");

    let cfg = HeadcountConfig::load().expect("load config");

    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.model_path, None);
    assert_eq!(cfg.model_input_size, 320);
    assert_eq!(cfg.min_confidence, 0.4);
    assert_eq!(cfg.iou_threshold, 0.6);
    assert_eq!(cfg.refresh_hz, 24);
    assert_eq!(cfg.child_area_threshold, 12000.0);

    let settings = cfg.loop_settings();
    assert_eq!(settings.refresh_hz, 24);
    assert_eq!(settings.child_area_threshold, 12000.0);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp toml config");
    let toml = "refresh_hz = 120\nchild_area_threshold = 9000.0\n";
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = HeadcountConfig::load_with(Some(file.path())).expect("load toml config");
    assert_eq!(cfg.refresh_hz, 120);
    assert_eq!(cfg.child_area_threshold, 9000.0);
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.min_confidence, 0.5);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADCOUNT_REFRESH_HZ", "sixty");
    let err = HeadcountConfig::load().unwrap_err();
    assert!(err.to_string().contains("HEADCOUNT_REFRESH_HZ"));

    std::env::set_var("HEADCOUNT_REFRESH_HZ", "0");
    let err = HeadcountConfig::load().unwrap_err();
    assert!(err.to_string().contains("refresh_hz"));
    std::env::remove_var("HEADCOUNT_REFRESH_HZ");

    std::env::set_var("HEADCOUNT_BACKEND", "tract");
    let err = HeadcountConfig::load().unwrap_err();
    assert!(err.to_string().contains("model_path"));

    clear_env();
}

#[test]
fn rejects_unknown_fields_and_backends() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "refresh": 30 }"#).expect("write config");
    let err = HeadcountConfig::load_with(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    std::env::set_var("HEADCOUNT_BACKEND", "opencv");
    let cfg = HeadcountConfig::load().expect("unknown names validate");
    let err = cfg.model_loader().err().expect("unknown backend rejected");
    assert!(err.to_string().contains("opencv"));

    clear_env();
}
