//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".numbered-bookmarks/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub navigation: Navigation,
    #[serde(default)]
    pub persistence: Persistence,
    #[serde(default)]
    pub sticky: Sticky,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Navigation {
    #[serde(default)]
    policy: Option<String>,
    #[serde(default)]
    show_not_defined_warning: Option<bool>,
}

impl Navigation {
    /// Raw policy identifier; parsed by the session on every use.
    pub fn policy(&self) -> &str {
        self.policy.as_deref().unwrap_or("strict")
    }

    pub fn show_not_defined_warning(&self) -> bool {
        self.show_not_defined_warning.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Persistence {
    #[serde(default)]
    save_in_project: Option<bool>,
    #[serde(default)]
    project_file: Option<String>,
}

impl Persistence {
    fn default_project_file() -> &'static str {
        ".vscode/numbered-bookmarks.json"
    }

    pub fn save_in_project(&self) -> bool {
        self.save_in_project.unwrap_or(false)
    }

    pub fn project_file(&self) -> PathBuf {
        PathBuf::from(
            self.project_file
                .as_deref()
                .unwrap_or_else(|| Self::default_project_file()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Sticky {
    #[serde(default)]
    keep_on_line_delete: Option<bool>,
}

impl Sticky {
    pub fn keep_on_line_delete(&self) -> bool {
        self.keep_on_line_delete.unwrap_or(false)
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    policy: Option<String>,
    save_in_project: Option<bool>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            policy: env::var("NUMBERED_BOOKMARKS_POLICY").ok(),
            save_in_project: env::var("NUMBERED_BOOKMARKS_SAVE_IN_PROJECT")
                .ok()
                .and_then(|value| parse_flag(&value)),
        }
    }

    #[cfg(test)]
    fn for_tests(policy: &str, save_in_project: bool) -> Self {
        Self {
            policy: Some(policy.to_owned()),
            save_in_project: Some(save_in_project),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, the workspace at `workspace_root`,
    /// and env overrides.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = Some(workspace_root.join(DEFAULT_WORKSPACE_CONFIG_PATH));
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            navigation: Navigation {
                policy: other.navigation.policy.or(self.navigation.policy),
                show_not_defined_warning: other
                    .navigation
                    .show_not_defined_warning
                    .or(self.navigation.show_not_defined_warning),
            },
            persistence: Persistence {
                save_in_project: other
                    .persistence
                    .save_in_project
                    .or(self.persistence.save_in_project),
                project_file: other
                    .persistence
                    .project_file
                    .or(self.persistence.project_file),
            },
            sticky: Sticky {
                keep_on_line_delete: other
                    .sticky
                    .keep_on_line_delete
                    .or(self.sticky.keep_on_line_delete),
            },
        }
    }

    /// Override the navigation policy for this process only.
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.navigation.policy = Some(policy.into());
        self
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("numbered-bookmarks/config.toml"))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(policy) = env.policy {
        config.navigation.policy = Some(policy);
    }
    if let Some(save_in_project) = env.save_in_project {
        config.persistence.save_in_project = Some(save_in_project);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_uses_defaults_when_no_files() {
        let config = Config::load_with_layers(None, None, EnvOverrides::default())
            .expect("load default config");
        assert_eq!(config.navigation.policy(), "strict");
        assert!(config.navigation.show_not_defined_warning());
        assert!(!config.persistence.save_in_project());
        assert_eq!(
            config.persistence.project_file(),
            PathBuf::from(".vscode/numbered-bookmarks.json")
        );
        assert!(!config.sticky.keep_on_line_delete());
    }

    #[test]
    fn merge_global_and_workspace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let global = temp.path().join("config.toml");
        fs::write(
            &global,
            r#"
[navigation]
policy = "replace"
[sticky]
keep_on_line_delete = true
"#,
        )?;

        let workspace_dir = temp.path().join("repo");
        fs::create_dir_all(workspace_dir.join(".numbered-bookmarks"))?;
        fs::write(
            workspace_dir.join(".numbered-bookmarks/config.toml"),
            r#"
[navigation]
show_not_defined_warning = false
[persistence]
save_in_project = true
"#,
        )?;

        let config = Config::load_with_layers(
            Some(global),
            Some(workspace_dir.join(DEFAULT_WORKSPACE_CONFIG_PATH)),
            EnvOverrides::default(),
        )?;

        assert_eq!(config.navigation.policy(), "replace");
        assert!(!config.navigation.show_not_defined_warning());
        assert!(config.persistence.save_in_project());
        assert!(config.sticky.keep_on_line_delete());

        Ok(())
    }

    #[test]
    fn workspace_layer_can_reset_global_value() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let global = temp.path().join("global.toml");
        fs::write(&global, "[navigation]\npolicy = \"replace\"\n")?;
        let workspace = temp.path().join("workspace.toml");
        fs::write(&workspace, "[navigation]\npolicy = \"strict\"\n")?;

        let config =
            Config::load_with_layers(Some(global), Some(workspace), EnvOverrides::default())?;

        assert_eq!(config.navigation.policy(), "strict");
        Ok(())
    }

    #[test]
    fn env_overrides_take_precedence() -> Result<()> {
        let overrides = EnvOverrides::for_tests("allowDuplicates", true);
        let config = Config::load_with_layers(None, None, overrides)?;
        assert_eq!(config.navigation.policy(), "allowDuplicates");
        assert!(config.persistence.save_in_project());
        Ok(())
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn invalid_config_returns_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("broken.toml");
        fs::write(&file, "this is not toml")?;
        let result = Config::from_file(&file);
        assert!(result.is_err());
        Ok(())
    }
}
