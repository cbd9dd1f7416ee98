//! Prism Viewer
//!
//! Renders a scene of procedural spheres and textured cubes with hardware ray
//! tracing: reflections, refraction with optional dispersion, and soft
//! shadows from two lights.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p prism-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--spheres-grid <A> <B>`: Spiral of `(2A)(2B)` spheres (default: 4 4)
//! - `--cubes-grid <C> <D>`: Pyramid of `(2C)(2D)` cubes (default: 4 4)
//! - `--seed <N>`: Seed for the sphere material draw (default: random)
//! - `--assets <DIR>`: Texture directory (default: `assets`)
//! - `--vsync`: Enable vsync
//! - `--validation`: Enable Vulkan validation layers
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod args;
mod controls;

use prism_app::{run_app, AppConfig};

use crate::app::Viewer;
use crate::args::ViewerArgs;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
pub const TITLE: &str = "Prism - Ray Traced Instances";

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::from_args()?;
    if args.help {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(
        AppConfig::new(TITLE)
            .with_size(WIDTH, HEIGHT)
            .with_vsync(args.vsync)
            .with_validation(args.validation || cfg!(debug_assertions))
            .with_ray_tracing(true),
    )
}

fn print_help() {
    eprintln!(
        "Prism Viewer - hardware ray traced instance scene

USAGE:
    cargo run -p prism-viewer -- [OPTIONS]

SCENE OPTIONS:
    --spheres-grid <A> <B>  Spiral of (2A)(2B) spheres (default: 4 4)
    --cubes-grid <C> <D>    Pyramid of (2C)(2D) cubes (default: 4 4)
    --seed <N>              Seed for the sphere material draw (default: random)
    --assets <DIR>          Texture directory (default: assets)

OTHER:
    --vsync                 Enable vsync
    --validation            Enable Vulkan validation layers
    -h, --help              Print this help message

CONTROLS:
    W/A/S/D, Q/E            Move (Shift x5, Ctrl x10)
    Left mouse drag         Look around
    1 / 2                   Fewer / more active spheres
    3 / 4                   Fewer / more active cubes
    5 / 6                   Lower / raise recursion depth
    7 / 8                   Lower / raise shadow quality

EXAMPLES:
    # Small scene: 4 spheres and 4 cubes
    cargo run -p prism-viewer -- --spheres-grid 1 1 --cubes-grid 1 1

    # Reproducible sphere materials
    cargo run -p prism-viewer -- --seed 7

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
