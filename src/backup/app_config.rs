//! Application level configuration: tool locations, marker directory and the
//! notification transport.
//!
//! Loaded from a default file with an optional user file layered on top. Keys
//! of the user file override the default ones, nested mappings are merged.

use crate::backup::function_path;
use crate::backup::notifications::NotificationConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use crate::backup::validate::{
    validate_dir_exist, validate_dir_exist_or_created, validate_file_exist, validate_inner,
};
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use serde_yml::Value;
use std::env::consts::EXE_SUFFIX;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

pub const DEFAULT_OUTPUT_HISTORY_LINES: usize = 100;

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct AppConfig {
    /// Directory holding the `rsync` and `cygpath` executables.
    #[validate(custom(function = validate_cygwin_bin_path))]
    #[builder(into)]
    cygwin_bin_path: PathBuf,
    #[validate(custom(function = validate_file_exist))]
    #[builder(into)]
    vshadow_bin: PathBuf,
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    marker_dir: PathBuf,
    /// Number of recent sync tool output lines kept for statistics parsing.
    #[serde(default = "default_output_history_lines")]
    #[validate(range(min = 1))]
    #[builder(default = DEFAULT_OUTPUT_HISTORY_LINES)]
    output_history_lines: usize,
    #[validate(custom(function = validate_inner))]
    notification: Option<NotificationConfig>,
}

fn default_output_history_lines() -> usize {
    DEFAULT_OUTPUT_HISTORY_LINES
}

fn cygwin_tool(bin_path: &Path, name: &str) -> PathBuf {
    bin_path.join(format!("{name}{EXE_SUFFIX}"))
}

fn validate_cygwin_bin_path(dir: &PathBuf) -> std::result::Result<(), ValidationError> {
    validate_dir_exist(dir)?;
    validate_file_exist(cygwin_tool(dir, "rsync"))?;
    validate_file_exist(cygwin_tool(dir, "cygpath"))
}

impl AppConfig {
    /// Reads, merges and validates the configuration files.
    #[named]
    pub fn load<P1: AsRef<Path>, P2: AsRef<Path>>(
        default_path: P1,
        user_path: Option<P2>,
    ) -> Result<Self> {
        let default_path = default_path.as_ref();
        let mut merged = read_yaml(default_path).add_fn_name(function_path!())?;
        let source_path = match user_path {
            Some(user_path) => {
                let user_path = user_path.as_ref();
                merge_yaml(&mut merged, read_yaml(user_path).add_fn_name(function_path!())?);
                tracing::debug!("Merged user config {user_path:?} over {default_path:?}");
                user_path.to_path_buf()
            }
            None => default_path.to_path_buf(),
        };

        let config: AppConfig = serde_yml::from_value(merged)
            .map_err(|e| Error::config_parse(&source_path, e.to_string()))
            .add_fn_name(function_path!())?;
        config
            .validate()
            .map_err(|e| Error::config_parse(&source_path, e.to_string()))
            .add_fn_name(function_path!())?;
        Ok(config)
    }

    pub fn rsync_bin(&self) -> PathBuf {
        cygwin_tool(&self.cygwin_bin_path, "rsync")
    }

    pub fn cygpath_bin(&self) -> PathBuf {
        cygwin_tool(&self.cygwin_bin_path, "cygpath")
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let text =
        std::fs::read_to_string(path).map_err(|e| Error::config_parse(path, e.to_string()))?;
    serde_yml::from_str(&text).map_err(|e| Error::config_parse(path, e.to_string()))
}

/// Overlays `overlay` onto `base`. Mappings merge key by key, anything else
/// replaces. An empty overlay document leaves `base` untouched.
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::notifications::smtp::SmtpMode;
    use crate::backup::result_error::error::ErrorCategory;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let bin = temp_dir.path().join("cygwin").join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(cygwin_tool(&bin, "rsync"), "").unwrap();
            std::fs::write(cygwin_tool(&bin, "cygpath"), "").unwrap();
            std::fs::write(temp_dir.path().join("vshadow.exe"), "").unwrap();
            Self { temp_dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.temp_dir.path().join(name)
        }

        fn base_yaml(&self) -> String {
            format!(
                "cygwin_bin_path: {:?}\n\
                 vshadow_bin: {:?}\n\
                 marker_dir: {:?}\n",
                self.path("cygwin/bin"),
                self.path("vshadow.exe"),
                self.path("state/markers"),
            )
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.path(name);
            std::fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn test_load_default_only() {
        let fixture = Fixture::new();
        let default = fixture.write("default.yml", &fixture.base_yaml());

        let config = AppConfig::load(&default, None::<&Path>).unwrap();
        assert_eq!(*config.output_history_lines(), DEFAULT_OUTPUT_HISTORY_LINES);
        assert!(config.notification().is_none());
        assert!(fixture.path("state/markers").is_dir());
        assert_eq!(
            config.rsync_bin(),
            fixture.path("cygwin/bin").join(format!("rsync{EXE_SUFFIX}"))
        );
        assert_eq!(
            config.cygpath_bin(),
            fixture.path("cygwin/bin").join(format!("cygpath{EXE_SUFFIX}"))
        );
    }

    #[test]
    fn test_user_config_merges_recursively() {
        let fixture = Fixture::new();
        let default = fixture.write(
            "default.yml",
            &format!(
                "{}output_history_lines: 50\n\
                 notification:\n  \
                   type: smtp\n  \
                   host: smtp.example.com\n  \
                   smtp_mode: StartTls\n  \
                   from: josync@example.com\n  \
                   username: backup\n  \
                   password: default-password\n",
                fixture.base_yaml()
            ),
        );
        let user = fixture.write(
            "user.yml",
            "output_history_lines: 200\n\
             notification:\n  \
               host: mail.internal\n  \
               password: user-password\n",
        );

        let config = AppConfig::load(&default, Some(&user)).unwrap();
        assert_eq!(*config.output_history_lines(), 200);
        let Some(NotificationConfig::Smtp(smtp)) = config.notification() else {
            panic!("Expected smtp notification config");
        };
        assert_eq!(smtp.host(), "mail.internal");
        assert_eq!(smtp.username(), "backup");
        assert_eq!(smtp.smtp_mode(), &SmtpMode::StartTls);
        assert_eq!(smtp.password().inner(), "user-password");
    }

    #[test]
    fn test_empty_user_config_keeps_defaults() {
        let fixture = Fixture::new();
        let default = fixture.write("default.yml", &fixture.base_yaml());
        let user = fixture.write("user.yml", "");

        let config = AppConfig::load(&default, Some(&user)).unwrap();
        assert_eq!(config.vshadow_bin(), &fixture.path("vshadow.exe"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let fixture = Fixture::new();
        let err = AppConfig::load(fixture.path("nope.yml"), None::<&Path>).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedConfig);
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let fixture = Fixture::new();
        let default = fixture.write("default.yml", "cygwin_bin_path: [unterminated\n");
        let err = AppConfig::load(&default, None::<&Path>).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedConfig);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let fixture = Fixture::new();
        let default = fixture.write(
            "default.yml",
            &format!("{}rsync_flags: -h\n", fixture.base_yaml()),
        );
        let err = AppConfig::load(&default, None::<&Path>).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedConfig);
    }

    #[test]
    fn test_validation_failures_are_config_errors() {
        let fixture = Fixture::new();
        std::fs::remove_file(fixture.path("vshadow.exe")).unwrap();
        let default = fixture.write("default.yml", &fixture.base_yaml());
        let err = AppConfig::load(&default, None::<&Path>).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedConfig);
        assert!(err.to_string().contains("vshadow"));

        let fixture = Fixture::new();
        std::fs::remove_file(cygwin_tool(&fixture.path("cygwin/bin"), "cygpath")).unwrap();
        let default = fixture.write("default.yml", &fixture.base_yaml());
        assert!(AppConfig::load(&default, None::<&Path>).is_err());

        let fixture = Fixture::new();
        let default = fixture.write(
            "default.yml",
            &format!("{}output_history_lines: 0\n", fixture.base_yaml()),
        );
        assert!(AppConfig::load(&default, None::<&Path>).is_err());
    }

    #[test]
    fn test_merge_yaml_replaces_scalars_and_sequences() {
        let mut base: Value = serde_yml::from_str("a: 1\nb: [1, 2]\nc: {d: 1, e: 2}\n").unwrap();
        let overlay: Value = serde_yml::from_str("b: [3]\nc: {e: 5}\nf: x\n").unwrap();
        merge_yaml(&mut base, overlay);

        let expected: Value =
            serde_yml::from_str("a: 1\nb: [3]\nc: {d: 1, e: 5}\nf: x\n").unwrap();
        assert_eq!(base, expected);
    }
}
