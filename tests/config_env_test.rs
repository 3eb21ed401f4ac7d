//! `PROVWATCH_` environment-variable overrides for settings.

use std::env;
use std::path::PathBuf;

use provwatch::Settings;

#[test]
fn env_vars_override_file_and_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provwatch.toml");
    std::fs::write(&path, "[watch]\ndebounce_ms = 250\n").unwrap();

    unsafe {
        // Double underscore separates nested levels; single underscores
        // stay part of the field name.
        env::set_var("PROVWATCH_WATCH__DEBOUNCE_MS", "125");
        env::set_var("PROVWATCH_GATEWAY__BASE_URL", "http://grafana:3000");
        env::set_var("PROVWATCH_IDENTITY__FILE", "/var/lib/provwatch/identity.json");
    }

    let settings = Settings::load(Some(&path));

    unsafe {
        env::remove_var("PROVWATCH_WATCH__DEBOUNCE_MS");
        env::remove_var("PROVWATCH_GATEWAY__BASE_URL");
        env::remove_var("PROVWATCH_IDENTITY__FILE");
    }

    let settings = settings.unwrap();

    // Env beats the file, which beats defaults.
    assert_eq!(settings.watch.debounce_ms, 125);
    assert_eq!(settings.gateway.base_url, "http://grafana:3000");
    assert_eq!(
        settings.identity.file,
        PathBuf::from("/var/lib/provwatch/identity.json")
    );

    // Untouched sections keep their defaults.
    assert_eq!(settings.logging.default, "info");
}
