// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use vesuv_platform::WindowSpec;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML settings file; missing means defaults
    #[arg(long, default_value = "vesuv.toml")]
    pub config: PathBuf,

    /// Enable the Khronos validation layer
    #[arg(long)]
    pub validation: bool,

    /// Force FIFO presentation even if MAILBOX is available
    #[arg(long)]
    pub fifo: bool,

    /// Image file sampled by the demo geometry
    #[arg(long)]
    pub texture: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let spec = WindowSpec::default();
        Self {
            width: spec.width,
            height: spec.height,
            title: spec.title,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RenderCfg {
    pub prefer_mailbox: bool,
    pub validation: bool,
    /// None (or an unreadable file) uses the built-in checkerboard.
    pub texture: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            prefer_mailbox: true,
            validation: cfg!(debug_assertions),
            texture: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl AppCfg {
    /// Parses `text`, falling back to defaults (with a warning) when malformed.
    pub fn parse_or_default(text: &str, origin: &Path) -> Self {
        match toml::from_str::<AppCfg>(text) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("ignoring malformed {}: {e}", origin.display());
                AppCfg::default()
            }
        }
    }

    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => Self::parse_or_default(&s, path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no {} found, using defaults", path.display());
                AppCfg::default()
            }
            Err(e) => {
                warn!("cannot read {}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        }
    }

    /// Command-line switches win over the file.
    pub fn apply_args(mut self, args: &Args) -> Self {
        if args.validation {
            self.render.validation = true;
        }
        if args.fifo {
            self.render.prefer_mailbox = false;
        }
        if let Some(path) = &args.texture {
            self.render.texture = Some(path.clone());
        }
        self
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.window.title.clone(),
            width: self.window.width.max(1),
            height: self.window.height.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["vesuv-app"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppCfg::parse_or_default("", Path::new("vesuv.toml"));
        assert_eq!(cfg, AppCfg::default());
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        assert!(cfg.render.prefer_mailbox);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppCfg::parse_or_default(
            "[window]\ntitle = \"demo\"\n[render]\nprefer_mailbox = false\n",
            Path::new("vesuv.toml"),
        );
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.width, 800);
        assert!(!cfg.render.prefer_mailbox);
    }

    #[test]
    fn malformed_file_falls_back() {
        let cfg = AppCfg::parse_or_default("[window\nwidth = ", Path::new("bad.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = AppCfg::load(Path::new("definitely/not/here/vesuv.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn flags_override_file() {
        let cfg = AppCfg::parse_or_default(
            "[render]\nprefer_mailbox = true\nvalidation = false\n",
            Path::new("vesuv.toml"),
        )
        .apply_args(&args(&["--fifo", "--validation"]));
        assert!(!cfg.render.prefer_mailbox);
        assert!(cfg.render.validation);
    }

    #[test]
    fn texture_from_file_or_flag() {
        let cfg = AppCfg::parse_or_default(
            "[render]\ntexture = \"assets/stone.png\"\n",
            Path::new("vesuv.toml"),
        );
        assert_eq!(cfg.render.texture, Some(PathBuf::from("assets/stone.png")));
        assert_eq!(AppCfg::default().render.texture, None);

        let cfg = cfg.apply_args(&args(&["--texture", "other.jpg"]));
        assert_eq!(cfg.render.texture, Some(PathBuf::from("other.jpg")));
    }

    #[test]
    fn default_config_path() {
        assert_eq!(args(&[]).config, PathBuf::from("vesuv.toml"));
    }

    #[test]
    fn zero_window_size_is_clamped() {
        let mut cfg = AppCfg::default();
        cfg.window.width = 0;
        assert_eq!(cfg.window_spec().width, 1);
    }
}
