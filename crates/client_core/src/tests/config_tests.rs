use super::*;

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("   "),
        SyncSettings::default().database_url
    );
}

#[test]
fn creates_parent_dir_for_prepared_url() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("planner.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.path().join("data").exists());
}

#[test]
fn file_overrides_apply_known_keys() {
    let mut settings = SyncSettings::default();
    apply_file_overrides(
        &mut settings,
        r#"
        api_url = "https://trips.example.com/rest/v1"
        api_key = "anon-key"
        autosave_delay_ms = 500
        request_timeout_secs = -4
        unrelated = true
        "#,
    );

    assert_eq!(
        settings.api_base_url.as_deref(),
        Some("https://trips.example.com/rest/v1")
    );
    assert_eq!(settings.service_api_key, "anon-key");
    assert_eq!(settings.autosave_delay(), Duration::from_millis(500));
    assert_eq!(settings.request_timeout_secs, 15);
}

#[test]
fn unparseable_settings_file_is_ignored() {
    let mut settings = SyncSettings::default();
    apply_file_overrides(&mut settings, "api_url = ");
    assert_eq!(settings, SyncSettings::default());
}

#[test]
fn api_url_is_validated_and_trimmed() {
    assert_eq!(
        normalize_api_base_url("https://trips.example.com/api/").expect("valid"),
        "https://trips.example.com/api"
    );
    assert!(normalize_api_base_url("ftp://trips.example.com").is_err());
    assert!(normalize_api_base_url("not a url").is_err());
}
