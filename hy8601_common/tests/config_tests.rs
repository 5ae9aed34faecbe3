//! Configuration file loading tests.
//!
//! Full `[shared]` + `[card]` files on disk, defaults, and validation
//! failures surfaced through `Hy8601Config::validate`.

use hy8601_common::config::{ConfigError, ConfigLoader, Hy8601Config};
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn full_file_round_trips_every_field() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[shared]
log_level = "warn"
service_name = "ioc-bl02"

[card]
port_name = "HY8601_2"
card = 3
carrier = 1
slot = 2
num_axes = 3
moving_poll_ms = 50
idle_poll_ms = 500
vector = 0xC0
use_encoder = 0b0100
encoder_ratios = [1.0, 2.0, 0.5]
queue_capacity = 16
reset_settle_ms = 0
"#,
    );

    let config = Hy8601Config::load(&path).unwrap();
    config.validate().unwrap();

    let card = &config.card;
    assert_eq!(card.card, 3);
    assert_eq!(card.carrier, 1);
    assert_eq!(card.slot, 2);
    assert_eq!(card.num_axes, 3);
    assert_eq!(card.moving_poll().as_millis(), 50);
    assert_eq!(card.idle_poll().as_millis(), 500);
    assert_eq!(card.masked_vector(), 0xC0);
    assert!(card.uses_encoder(2));
    assert!(!card.uses_encoder(0));
    assert_eq!(card.encoder_ratio(2), 0.5);
    assert_eq!(card.queue_capacity, 16);
    assert!(card.reset_settle().is_zero());
}

#[test]
fn minimal_card_section_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[shared]
service_name = "ioc"

[card]
port_name = "P"
"#,
    );

    let config = Hy8601Config::load(&path).unwrap();
    assert_eq!(config.card.num_axes, 4);
    assert_eq!(config.card.vector, 0x70);
    assert_eq!(config.card.queue_capacity, 100);
    assert!(config.card.encoder_ratios.is_empty());
}

#[test]
fn missing_card_section_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[shared]\nservice_name = \"ioc\"\n");
    assert!(matches!(
        Hy8601Config::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn zero_poll_period_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[shared]
service_name = "ioc"

[card]
port_name = "P"
moving_poll_ms = 0
"#,
    );

    let config = Hy8601Config::load(&path).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn empty_service_name_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[shared]
service_name = ""

[card]
port_name = "P"
"#,
    );

    let config = Hy8601Config::load(&path).unwrap();
    assert!(config.validate().is_err());
}
