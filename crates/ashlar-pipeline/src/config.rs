//! Pipeline configuration.

use std::path::{Path, PathBuf};

/// Environment variable that selects the build profile.
pub const PROFILE_ENV: &str = "NODE_ENV";

/// Build profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Source maps, no minification
    #[default]
    Development,

    /// Minified output, no source maps
    Production,
}

impl Profile {
    /// Pick the profile from a `NODE_ENV` value. Unset, empty or
    /// `development` select development; anything else is production.
    pub fn from_node_env(value: Option<&str>) -> Self {
        match value {
            None | Some("") | Some("development") => Profile::Development,
            Some(_) => Profile::Production,
        }
    }

    /// Read the profile from the process environment.
    pub fn from_env() -> Self {
        Self::from_node_env(std::env::var(PROFILE_ENV).ok().as_deref())
    }

    pub fn is_production(self) -> bool {
        self == Profile::Production
    }
}

/// Locations and profile shared by every task.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Project root; source and build directories are resolved against it
    pub root: PathBuf,

    /// Source tree, relative to the root
    pub source_dir: PathBuf,

    /// Output tree, relative to the root
    pub build_dir: PathBuf,

    /// Selected build profile
    pub profile: Profile,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            source_dir: PathBuf::from("app"),
            build_dir: PathBuf::from("build"),
            profile: Profile::Development,
        }
    }
}

impl PipelineConfig {
    /// Default layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Replace the profile.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Absolute (or root-relative) source tree.
    pub fn source(&self) -> PathBuf {
        self.root.join(&self.source_dir)
    }

    /// Absolute (or root-relative) build tree.
    pub fn build(&self) -> PathBuf {
        self.root.join(&self.build_dir)
    }

    /// A path inside the source tree.
    pub fn source_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.source().join(relative)
    }

    /// A path inside the build tree.
    pub fn build_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.build().join(relative)
    }
}
