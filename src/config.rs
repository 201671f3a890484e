//! Merge configuration (`miniapp-merge.toml`).
//!
//! Defines the typed configuration for a merge session: the trees involved,
//! the fixed file names the merge depends on, the identifiers used by the
//! entry-script bridge, and the debounce/copy tuning knobs. [`MergeOptions`]
//! is the runtime form that adds the caller-supplied hooks.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "miniapp-merge.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level merge configuration.
///
/// Parsed from `miniapp-merge.toml`. Missing fields use defaults; a missing
/// file yields all defaults, which still fail [`MergeConfig::validate`]
/// because `target` has no default.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Source tree root, used to remap markup/manifest/style notifications.
    #[serde(default = "default_input")]
    pub input: PathBuf,

    /// Primary compiled tree root.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Destination of the merged tree.
    #[serde(default)]
    pub target: PathBuf,

    /// Secondary compiled tree overlaid on top of the result.
    #[serde(default)]
    pub copy_dir: Option<PathBuf>,

    /// Pre-built bridge file used verbatim instead of patching.
    #[serde(default)]
    pub source_app: Option<PathBuf>,

    /// Kill switch: notifications pass straight through.
    #[serde(default)]
    pub is_close: bool,

    /// Glob patterns for source paths that are never copied.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Quiet period before a merge run fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Queue length at which a full-tree copy replaces per-file copies.
    #[serde(default = "default_full_copy_threshold")]
    pub full_copy_threshold: usize,

    /// Identifiers used by the entry-script bridge.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Fixed file names inside the trees.
    #[serde(default)]
    pub files: FileNames,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            target: PathBuf::new(),
            copy_dir: None,
            source_app: None,
            is_close: false,
            exclude: Vec::new(),
            debounce_ms: default_debounce_ms(),
            full_copy_threshold: default_full_copy_threshold(),
            bridge: BridgeConfig::default(),
            files: FileNames::default(),
        }
    }
}

fn default_input() -> PathBuf {
    PathBuf::from("src")
}

fn default_output() -> PathBuf {
    PathBuf::from("dist")
}

const fn default_debounce_ms() -> u64 {
    500
}

const fn default_full_copy_threshold() -> usize {
    5
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Identifiers the entry-script bridge is built from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// The host runtime's global registration function.
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Name of the bridge entry point that original call sites are renamed to.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Host global object carrying the pre-launch hook.
    #[serde(default = "default_host_global")]
    pub host_global: String,

    /// Property on the host global looked up before `onLaunch`.
    #[serde(default = "default_pre_launch_hook")]
    pub pre_launch_hook: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            entry_point: default_entry_point(),
            host_global: default_host_global(),
            pre_launch_hook: default_pre_launch_hook(),
        }
    }
}

fn default_registration() -> String {
    "App".to_owned()
}

fn default_entry_point() -> String {
    "WepyApp".to_owned()
}

fn default_host_global() -> String {
    "wx".to_owned()
}

fn default_pre_launch_hook() -> String {
    "__beforeOnLaunch__".to_owned()
}

// ---------------------------------------------------------------------------
// FileNames
// ---------------------------------------------------------------------------

/// Fixed relative file names the merge reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileNames {
    /// Entry script, in every tree (`app.js`).
    #[serde(default = "default_entry_script")]
    pub entry_script: String,

    /// Manifest, in every tree (`app.json`).
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Secondary manifest already present in the target (`uni-app.json`).
    #[serde(default = "default_secondary_manifest")]
    pub secondary_manifest: String,

    /// Bridge output written into the target (`wepy-app.js`).
    #[serde(default = "default_bridge_output")]
    pub bridge_output: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            entry_script: default_entry_script(),
            manifest: default_manifest(),
            secondary_manifest: default_secondary_manifest(),
            bridge_output: default_bridge_output(),
        }
    }
}

fn default_entry_script() -> String {
    "app.js".to_owned()
}

fn default_manifest() -> String {
    "app.json".to_owned()
}

fn default_secondary_manifest() -> String {
    "uni-app.json".to_owned()
}

fn default_bridge_output() -> String {
    "wepy-app.js".to_owned()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or validating a merge configuration.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl MergeConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError::invalid(message)
        })
    }

    /// Check the invariants a merge session relies on.
    ///
    /// # Errors
    /// Returns `ConfigError` when a required path is empty, the output and
    /// target trees coincide, the threshold is zero, or an exclude pattern
    /// does not compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::invalid("`output` must not be empty"));
        }
        if self.target.as_os_str().is_empty() {
            return Err(ConfigError::invalid("`target` must be set"));
        }
        if self.output == self.target {
            return Err(ConfigError::invalid(
                "`output` and `target` must be different directories",
            ));
        }
        if self.full_copy_threshold == 0 {
            return Err(ConfigError::invalid(
                "`full_copy_threshold` must be at least 1",
            ));
        }
        let identifiers = [
            ("bridge.registration", &self.bridge.registration),
            ("bridge.entry_point", &self.bridge.entry_point),
            ("bridge.host_global", &self.bridge.host_global),
            ("bridge.pre_launch_hook", &self.bridge.pre_launch_hook),
        ];
        for (field, ident) in identifiers {
            if !is_js_identifier(ident) {
                return Err(ConfigError::invalid(format!(
                    "`{field}` = '{ident}' is not a JavaScript identifier"
                )));
            }
        }
        if self.bridge.registration == self.bridge.entry_point {
            return Err(ConfigError::invalid(
                "`bridge.entry_point` must differ from `bridge.registration`",
            ));
        }
        self.exclude_patterns().map(|_| ())
    }

    /// Compile the `exclude` globs.
    ///
    /// # Errors
    /// Returns `ConfigError` naming the first pattern that fails to compile.
    pub fn exclude_patterns(&self) -> Result<Vec<glob::Pattern>, ConfigError> {
        self.exclude
            .iter()
            .map(|raw| {
                glob::Pattern::new(raw)
                    .map_err(|e| ConfigError::invalid(format!("exclude pattern '{raw}': {e}")))
            })
            .collect()
    }

    /// The debounce delay as a [`std::time::Duration`].
    #[must_use]
    pub const fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }

    /// Resolve every tree path against the working directory.
    ///
    /// Hosts report absolute paths, so relative trees would never match them.
    ///
    /// # Errors
    /// Returns `ConfigError` if the working directory cannot be read.
    pub fn into_absolute(self) -> Result<Self, ConfigError> {
        Ok(Self {
            input: absolute(&self.input)?,
            output: absolute(&self.output)?,
            target: absolute(&self.target)?,
            copy_dir: self.copy_dir.as_deref().map(absolute).transpose()?,
            source_app: self.source_app.as_deref().map(absolute).transpose()?,
            ..self
        })
    }

    /// `<output>/<entry_script>`.
    #[must_use]
    pub fn primary_entry(&self) -> PathBuf {
        self.output.join(&self.files.entry_script)
    }

    /// `<output>/<manifest>`.
    #[must_use]
    pub fn primary_manifest(&self) -> PathBuf {
        self.output.join(&self.files.manifest)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| {
        ConfigError::invalid(format!("cannot resolve '{}': {e}", path.display()))
    })
}

/// ASCII identifier check: `[A-Za-z_$][A-Za-z0-9_$]*`.
fn is_js_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ---------------------------------------------------------------------------
// MergeOptions: config plus caller hooks
// ---------------------------------------------------------------------------

/// Copy predicate: `(source, destination) -> true` excludes the path.
pub type PathFilter = Box<dyn Fn(&Path, &Path) -> bool>;

/// Manifest post-processor: `(merged, primary, secondary)`.
///
/// Returning `None` or a falsy JSON value keeps the default merge.
pub type ManifestHook = Box<dyn Fn(&Value, &Value, &Value) -> Option<Value>>;

/// Immutable per-session options: the validated config plus caller hooks.
pub struct MergeOptions {
    pub config: MergeConfig,
    excludes: Vec<glob::Pattern>,
    filter: Option<PathFilter>,
    filter_json: Option<ManifestHook>,
}

impl MergeOptions {
    /// Validate `config`, resolve its trees to absolute paths and compile its
    /// exclude patterns.
    ///
    /// # Errors
    /// Returns `ConfigError` if [`MergeConfig::validate`] fails or a path
    /// cannot be resolved.
    pub fn new(config: MergeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = config.into_absolute()?;
        if config.output == config.target {
            return Err(ConfigError::invalid(
                "`output` and `target` must be different directories",
            ));
        }
        let excludes = config.exclude_patterns()?;
        Ok(Self {
            config,
            excludes,
            filter: None,
            filter_json: None,
        })
    }

    /// Add a copy predicate, checked after the configured globs.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&Path, &Path) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Add a manifest post-processor for the overlay merge.
    #[must_use]
    pub fn with_filter_json(
        mut self,
        hook: impl Fn(&Value, &Value, &Value) -> Option<Value> + 'static,
    ) -> Self {
        self.filter_json = Some(Box::new(hook));
        self
    }

    /// Whether `src` (copied to `dest`) is excluded by the globs or the
    /// caller's predicate.
    #[must_use]
    pub fn is_excluded(&self, src: &Path, dest: &Path) -> bool {
        self.excludes.iter().any(|p| p.matches_path(src))
            || self.filter.as_ref().is_some_and(|f| f(src, dest))
    }

    /// The manifest post-processor, if any.
    #[must_use]
    pub fn filter_json(&self) -> Option<&ManifestHook> {
        self.filter_json.as_ref()
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("config", &self.config)
            .field("filter", &self.filter.is_some())
            .field("filter_json", &self.filter_json.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = MergeConfig::default();
        assert_eq!(cfg.input, PathBuf::from("src"));
        assert_eq!(cfg.output, PathBuf::from("dist"));
        assert!(cfg.target.as_os_str().is_empty());
        assert_eq!(cfg.copy_dir, None);
        assert_eq!(cfg.source_app, None);
        assert!(!cfg.is_close);
        assert_eq!(cfg.debounce_ms, 500);
        assert_eq!(cfg.full_copy_threshold, 5);
        assert_eq!(cfg.bridge.registration, "App");
        assert_eq!(cfg.bridge.entry_point, "WepyApp");
        assert_eq!(cfg.bridge.host_global, "wx");
        assert_eq!(cfg.bridge.pre_launch_hook, "__beforeOnLaunch__");
        assert_eq!(cfg.files.entry_script, "app.js");
        assert_eq!(cfg.files.manifest, "app.json");
        assert_eq!(cfg.files.secondary_manifest, "uni-app.json");
        assert_eq!(cfg.files.bridge_output, "wepy-app.js");
    }

    #[test]
    fn parse_full_config() {
        let cfg = MergeConfig::parse(
            r#"
input = "app/src"
output = "app/dist"
target = "miniprogram"
copy_dir = "unpackage/dist/dev/mp-weixin"
is_close = false
exclude = ["**/*.map"]
debounce_ms = 200

[bridge]
entry_point = "LegacyApp"

[files]
bridge_output = "legacy-app.js"
"#,
        )
        .unwrap();
        assert_eq!(cfg.output, PathBuf::from("app/dist"));
        assert_eq!(
            cfg.copy_dir,
            Some(PathBuf::from("unpackage/dist/dev/mp-weixin"))
        );
        assert_eq!(cfg.debounce(), std::time::Duration::from_millis(200));
        assert_eq!(cfg.bridge.entry_point, "LegacyApp");
        assert_eq!(cfg.bridge.registration, "App");
        assert_eq!(cfg.files.bridge_output, "legacy-app.js");
        assert_eq!(cfg.primary_entry(), PathBuf::from("app/dist/app.js"));
    }

    #[test]
    fn unknown_key_reports_line() {
        let err = MergeConfig::parse("target = \"out\"\nbogus = 1\n").unwrap_err();
        assert!(err.message.contains("line 2"), "got: {}", err.message);
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MergeConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, MergeConfig::default());
    }

    #[test]
    fn validate_requires_target() {
        let err = MergeConfig::default().validate().unwrap_err();
        assert!(err.message.contains("target"));
    }

    #[test]
    fn validate_rejects_same_output_and_target() {
        let cfg = MergeConfig {
            target: PathBuf::from("dist"),
            ..MergeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_glob() {
        let cfg = MergeConfig {
            target: PathBuf::from("out"),
            exclude: vec!["[".to_owned()],
            ..MergeConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.message.contains("exclude pattern"));
    }

    #[test]
    fn validate_rejects_bad_bridge_identifier() {
        let mut cfg = MergeConfig {
            target: PathBuf::from("out"),
            ..MergeConfig::default()
        };
        cfg.bridge.entry_point = "Wepy App".to_owned();
        let err = cfg.validate().unwrap_err();
        assert!(err.message.contains("bridge.entry_point"));

        cfg.bridge.entry_point = "App".to_owned();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn js_identifiers() {
        assert!(is_js_identifier("App"));
        assert!(is_js_identifier("__beforeOnLaunch__"));
        assert!(is_js_identifier("$wx"));
        assert!(!is_js_identifier(""));
        assert!(!is_js_identifier("1App"));
        assert!(!is_js_identifier("a.b"));
    }

    #[test]
    fn options_resolve_relative_trees() {
        let cwd = std::env::current_dir().unwrap();
        let cfg = MergeConfig {
            target: PathBuf::from("out"),
            source_app: Some(PathBuf::from("vendor/bridge.js")),
            ..MergeConfig::default()
        };
        let opts = MergeOptions::new(cfg).unwrap();
        assert_eq!(opts.config.input, cwd.join("src"));
        assert_eq!(opts.config.output, cwd.join("dist"));
        assert_eq!(opts.config.target, cwd.join("out"));
        assert_eq!(opts.config.copy_dir, None);
        assert_eq!(opts.config.source_app, Some(cwd.join("vendor/bridge.js")));
    }

    #[test]
    fn options_reject_trees_that_resolve_to_the_same_directory() {
        let cwd = std::env::current_dir().unwrap();
        let cfg = MergeConfig {
            output: PathBuf::from("dist"),
            target: cwd.join("dist"),
            ..MergeConfig::default()
        };
        assert!(MergeOptions::new(cfg).is_err());
    }

    #[test]
    fn options_combine_globs_and_predicate() {
        let cfg = MergeConfig {
            target: PathBuf::from("out"),
            exclude: vec!["**/*.map".to_owned()],
            ..MergeConfig::default()
        };
        let opts = MergeOptions::new(cfg)
            .unwrap()
            .with_filter(|src, _| src.ends_with("secret.txt"));
        let dest = Path::new("out/x");
        assert!(opts.is_excluded(Path::new("/p/dist/a.js.map"), dest));
        assert!(opts.is_excluded(Path::new("/p/dist/secret.txt"), dest));
        assert!(!opts.is_excluded(Path::new("/p/dist/a.js"), dest));
    }
}
