use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn valid_settings() -> Settings {
    Settings {
        jwt_secret: "test-secret".to_string(),
        ..Settings::default()
    }
}

#[test]
fn test_settings_validation() {
    assert!(valid_settings().validate().is_ok());

    // Default has no secret
    assert!(Settings::default().validate().is_err());

    let mut invalid = valid_settings();
    invalid.log_level = "loud".to_string();
    assert!(invalid.validate().is_err());

    let mut invalid = valid_settings();
    invalid.outbound_buffer = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = valid_settings();
    invalid.realtime_roles.clear();
    assert!(invalid.validate().is_err());

    let mut invalid = valid_settings();
    invalid.max_failed_handshakes = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn test_load_from_toml_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
bind_addr = "0.0.0.0:9000"
jwt_secret = "from-file"
realtime_roles = ["User", "Admin", "Manager"]
outbound_buffer = 8
"#
    )
    .unwrap();

    let settings = Settings::load_from(file.path()).unwrap();
    assert_eq!(settings.bind_addr.to_string(), "0.0.0.0:9000");
    assert_eq!(settings.jwt_secret, "from-file");
    assert_eq!(
        settings.realtime_roles,
        vec![Role::User, Role::Admin, Role::Manager]
    );
    assert_eq!(settings.outbound_buffer, 8);
    // untouched keys keep their defaults
    assert_eq!(settings.counterpart_roles, vec![Role::User, Role::Admin]);
    assert_eq!(settings.log_level, "info");
}

#[test]
fn test_load_rejects_invalid_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "jwt_secret = \"s\"\noutbound_buffer = 0").unwrap();

    let err = Settings::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_rejects_unknown_role() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "jwt_secret = \"s\"\nrealtime_roles = [\"Intern\"]").unwrap();

    let err = Settings::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}
