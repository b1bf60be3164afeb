use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(
        settings.uploads.max_request_bytes.get(),
        DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
    );
    assert_eq!(settings.site.url.as_str(), DEFAULT_SITE_URL);
    assert!(settings.auth.trusted_user_header.is_none());
    assert!(settings.cache.enabled);
    assert!(settings.cache.purge_url.is_none());
    assert_eq!(settings.stripe.api_base.as_str(), DEFAULT_STRIPE_API_BASE);
    assert_eq!(
        settings.key_verification.validity,
        Duration::from_secs(DEFAULT_KEY_VERIFICATION_VALIDITY_SECS)
    );
}

#[test]
fn site_url_gains_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.site.url = Some("https://example.com/blog".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.site.url.as_str(), "https://example.com/blog/");
}

#[test]
fn invalid_urls_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.purge_url = Some("not a url".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid purge url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.purge_url",
            ..
        }
    ));
}

#[test]
fn blank_values_count_as_unset() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    raw.auth.trusted_user_header = Some("".to_string());
    raw.cache.purge_url = Some(" ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert!(settings.auth.trusted_user_header.is_none());
    assert!(settings.cache.purge_url.is_none());
}

#[test]
fn trusted_header_is_lowercased() {
    let mut raw = RawSettings::default();
    raw.auth.trusted_user_header = Some("X-Quire-User".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.auth.trusted_user_header.as_deref(),
        Some("x-quire-user")
    );
}

#[test]
fn zero_limits_are_rejected() {
    let mut raw = RawSettings::default();
    raw.api_rate_limit.max_requests = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.key_verification.validity_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["quire"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_check_routes_arguments() {
    let args = CliArgs::parse_from(["quire", "check-routes", "/tmp/routes.yaml"]);
    match args.command.expect("check-routes command") {
        Command::CheckRoutes(check) => {
            assert_eq!(check.file, std::path::Path::new("/tmp/routes.yaml"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_issue_api_key_arguments() {
    let args = CliArgs::parse_from([
        "quire",
        "issue-api-key",
        "--database-url",
        "postgres://example",
        "--name",
        "deploy bot",
        "--expires-in-days",
        "30",
    ]);

    match args.command.expect("issue-api-key command") {
        Command::IssueApiKey(issue) => {
            assert_eq!(
                issue.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(issue.name, "deploy bot");
            assert_eq!(issue.expires_in_days, Some(30));
            assert!(issue.integration_id.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "quire",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--cache-purge-url",
        "http://frontend/purge",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(
                serve.overrides.cache_purge_url.as_deref(),
                Some("http://frontend/purge")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
