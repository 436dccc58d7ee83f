//! Load a project `.env` and resolve typed runtime [`Settings`] from the
//! process environment, with priority: **existing env > .env**.
//!
//! Every tunable of the service lives in [`Settings`]; nothing else in the
//! workspace reads `std::env` directly.

mod dotenv;
mod settings;

use std::path::Path;
use thiserror::Error;

pub use settings::{EconomySettings, Settings};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Loads `.env` (current directory, or `override_dir` if given) and sets
/// environment variables only for keys that are **not** already set, so the
/// existing environment always wins.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;
    for (key, value) in map {
        if std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn existing_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "CFG_TEST_EXISTING=from_dotenv\n").unwrap();
        env::set_var("CFG_TEST_EXISTING", "from_env");
        load_and_apply(Some(dir.path())).unwrap();
        assert_eq!(env::var("CFG_TEST_EXISTING").as_deref(), Ok("from_env"));
        env::remove_var("CFG_TEST_EXISTING");
    }

    #[test]
    fn dotenv_applied_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "CFG_TEST_FRESH=from_dotenv\n").unwrap();
        env::remove_var("CFG_TEST_FRESH");
        load_and_apply(Some(dir.path())).unwrap();
        assert_eq!(env::var("CFG_TEST_FRESH").as_deref(), Ok("from_dotenv"));
        env::remove_var("CFG_TEST_FRESH");
    }

    #[test]
    fn missing_dotenv_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_and_apply(Some(dir.path())).is_ok());
    }
}
