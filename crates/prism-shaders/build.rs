//! Build script to compile GLSL shaders to SPIR-V.

use shaderc::{Compiler, IncludeType, ResolvedInclude, ShaderKind};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Source file, stage kind and output name of every compiled shader.
const SHADERS: &[(&str, ShaderKind, &str)] = &[
    ("main.rgen", ShaderKind::RayGeneration, "main_rgen.spv"),
    ("primary.rmiss", ShaderKind::Miss, "primary_rmiss.spv"),
    ("shadow.rmiss", ShaderKind::Miss, "shadow_rmiss.spv"),
    ("cube_primary.rchit", ShaderKind::ClosestHit, "cube_primary_rchit.spv"),
    ("ground.rchit", ShaderKind::ClosestHit, "ground_rchit.spv"),
    ("glass_primary.rchit", ShaderKind::ClosestHit, "glass_primary_rchit.spv"),
    ("sphere_primary.rchit", ShaderKind::ClosestHit, "sphere_primary_rchit.spv"),
    ("sphere_diffuse.rchit", ShaderKind::ClosestHit, "sphere_diffuse_rchit.spv"),
    ("sphere_glass.rchit", ShaderKind::ClosestHit, "sphere_glass_rchit.spv"),
    ("sphere.rint", ShaderKind::Intersection, "sphere_rint.spv"),
    ("blit.vert", ShaderKind::Vertex, "blit_vert.spv"),
    ("blit.frag", ShaderKind::Fragment, "blit_frag.spv"),
];

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let shader_dir = Path::new("shaders");

    // Rerun if shaders change
    println!("cargo:rerun-if-changed=shaders/");

    let compiler = Compiler::new().expect("Failed to create shader compiler");

    for &(source, kind, output) in SHADERS {
        compile_shader(
            &compiler,
            shader_dir,
            source,
            out_dir.join(output),
            kind,
        );
    }
}

fn compile_shader(
    compiler: &Compiler,
    shader_dir: &Path,
    file_name: &str,
    output: impl AsRef<Path>,
    kind: ShaderKind,
) {
    let input_path = shader_dir.join(file_name);
    let output_path = output.as_ref();

    let source = fs::read_to_string(&input_path)
        .unwrap_or_else(|e| panic!("Failed to read shader {:?}: {}", input_path, e));

    let mut options = shaderc::CompileOptions::new().expect("Failed to create compile options");
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    options.set_target_spirv(shaderc::SpirvVersion::V1_6);
    options.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let include_dir = shader_dir.to_path_buf();
    options.set_include_callback(move |name, include_type, _requester, _depth| {
        if let IncludeType::Standard = include_type {
            return Err(format!("Only relative includes are supported: {name}"));
        }
        let path = include_dir.join(name);
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read include {:?}: {}", path, e))?;
        Ok(ResolvedInclude {
            resolved_name: path.display().to_string(),
            content,
        })
    });

    let result = compiler
        .compile_into_spirv(&source, kind, file_name, "main", Some(&options))
        .unwrap_or_else(|e| panic!("Failed to compile shader {:?}: {}", input_path, e));

    if result.get_num_warnings() > 0 {
        println!(
            "cargo:warning=Shader warnings in {:?}: {}",
            input_path,
            result.get_warning_messages()
        );
    }

    fs::write(
        output_path,
        bytemuck::cast_slice::<u32, u8>(result.as_binary()),
    )
    .unwrap_or_else(|e| panic!("Failed to write shader {:?}: {}", output_path, e));
}
