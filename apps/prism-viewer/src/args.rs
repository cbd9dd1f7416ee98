//! Command line options.

use std::path::PathBuf;

use anyhow::{bail, Context};
use prism_scene::SceneConfig;

/// Largest accepted grid factor.
const MAX_GRID_FACTOR: u32 = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerArgs {
    pub scene: SceneConfig,
    /// Seed for the sphere material draw; random when absent
    pub seed: Option<u64>,
    pub assets: PathBuf,
    pub vsync: bool,
    pub validation: bool,
    pub help: bool,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            seed: None,
            assets: PathBuf::from("assets"),
            vsync: false,
            validation: false,
            help: false,
        }
    }
}

impl ViewerArgs {
    /// Parse the process arguments.
    pub fn from_args() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse options, without the program name.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--spheres-grid" => {
                    parsed.scene.a = grid_factor(&arg, args.next())?;
                    parsed.scene.b = grid_factor(&arg, args.next())?;
                }
                "--cubes-grid" => {
                    parsed.scene.c = grid_factor(&arg, args.next())?;
                    parsed.scene.d = grid_factor(&arg, args.next())?;
                }
                "--seed" => {
                    let value = value(&arg, args.next())?;
                    parsed.seed = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid seed: {value}"))?,
                    );
                }
                "--assets" => parsed.assets = PathBuf::from(value(&arg, args.next())?),
                "--vsync" => parsed.vsync = true,
                "--validation" => parsed.validation = true,
                "-h" | "--help" => parsed.help = true,
                other => bail!("unknown option: {other} (see --help)"),
            }
        }

        Ok(parsed)
    }
}

fn value(flag: &str, next: Option<String>) -> anyhow::Result<String> {
    next.with_context(|| format!("{flag} expects a value"))
}

fn grid_factor(flag: &str, next: Option<String>) -> anyhow::Result<u32> {
    let raw = value(flag, next)?;
    let factor: u32 = raw
        .parse()
        .with_context(|| format!("{flag}: invalid grid factor {raw}"))?;
    if factor > MAX_GRID_FACTOR {
        bail!("{flag}: grid factor {factor} exceeds {MAX_GRID_FACTOR}");
    }
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ViewerArgs> {
        ViewerArgs::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args, ViewerArgs::default());
        assert_eq!(args.scene, SceneConfig::new(4, 4, 4, 4));
        assert_eq!(args.assets, PathBuf::from("assets"));
    }

    #[test]
    fn grids_and_flags() {
        let args = parse(&[
            "--spheres-grid",
            "1",
            "2",
            "--cubes-grid",
            "3",
            "1",
            "--seed",
            "7",
            "--vsync",
            "--assets",
            "/tmp/textures",
        ])
        .unwrap();
        assert_eq!(args.scene, SceneConfig::new(1, 2, 3, 1));
        assert_eq!(args.seed, Some(7));
        assert!(args.vsync);
        assert!(!args.validation);
        assert_eq!(args.assets, PathBuf::from("/tmp/textures"));
    }

    #[test]
    fn help() {
        assert!(parse(&["-h"]).unwrap().help);
        assert!(parse(&["--help"]).unwrap().help);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--spheres-grid", "1"]).is_err());
        assert!(parse(&["--cubes-grid", "x", "1"]).is_err());
        assert!(parse(&["--cubes-grid", "65", "1"]).is_err());
        assert!(parse(&["--seed"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
    }
}
