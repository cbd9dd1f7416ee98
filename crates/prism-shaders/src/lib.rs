//! SPIR-V for the ray tracing demo.
//!
//! GLSL sources live in `shaders/` and are compiled at build time with
//! shaderc (Vulkan 1.3, SPIR-V 1.6). Each getter converts the embedded bytes
//! to aligned words once.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    macro_rules! spirv {
        ($name:ident, $file:literal) => {
            pub static $name: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/", $file));
        };
    }

    spirv!(MAIN_RGEN, "main_rgen.spv");
    spirv!(PRIMARY_RMISS, "primary_rmiss.spv");
    spirv!(SHADOW_RMISS, "shadow_rmiss.spv");
    spirv!(CUBE_PRIMARY_RCHIT, "cube_primary_rchit.spv");
    spirv!(GROUND_RCHIT, "ground_rchit.spv");
    spirv!(GLASS_PRIMARY_RCHIT, "glass_primary_rchit.spv");
    spirv!(SPHERE_PRIMARY_RCHIT, "sphere_primary_rchit.spv");
    spirv!(SPHERE_DIFFUSE_RCHIT, "sphere_diffuse_rchit.spv");
    spirv!(SPHERE_GLASS_RCHIT, "sphere_glass_rchit.spv");
    spirv!(SPHERE_RINT, "sphere_rint.spv");
    spirv!(BLIT_VERT, "blit_vert.spv");
    spirv!(BLIT_FRAG, "blit_frag.spv");
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be 4-byte aligned"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

macro_rules! shader_getter {
    ($(#[$doc:meta])* $fn_name:ident, $bytes:ident) => {
        $(#[$doc])*
        pub fn $fn_name() -> &'static [u32] {
            static SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
            SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::$bytes))
        }
    };
}

shader_getter!(
    /// Ray generation: one primary ray per pixel.
    main_rgen, MAIN_RGEN
);
shader_getter!(
    /// Sky color for primary rays.
    primary_miss, PRIMARY_RMISS
);
shader_getter!(
    /// Marks shadow rays as lit.
    shadow_miss, SHADOW_RMISS
);
shader_getter!(
    /// Textured opaque cube.
    cube_primary_hit, CUBE_PRIMARY_RCHIT
);
shader_getter!(ground_hit, GROUND_RCHIT);
shader_getter!(
    /// Refractive cube.
    glass_primary_hit, GLASS_PRIMARY_RCHIT
);
shader_getter!(
    /// Reflective sphere.
    sphere_primary_hit, SPHERE_PRIMARY_RCHIT
);
shader_getter!(sphere_diffuse_hit, SPHERE_DIFFUSE_RCHIT);
shader_getter!(
    /// Refractive sphere with optional dispersion.
    sphere_glass_hit, SPHERE_GLASS_RCHIT
);
shader_getter!(
    /// Analytic sphere inside its bounding box.
    sphere_intersection, SPHERE_RINT
);
shader_getter!(blit_vertex, BLIT_VERT);
shader_getter!(blit_fragment, BLIT_FRAG);

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn all_shaders_load() {
        let shaders = [
            main_rgen(),
            primary_miss(),
            shadow_miss(),
            cube_primary_hit(),
            ground_hit(),
            glass_primary_hit(),
            sphere_primary_hit(),
            sphere_diffuse_hit(),
            sphere_glass_hit(),
            sphere_intersection(),
            blit_vertex(),
            blit_fragment(),
        ];
        for shader in shaders {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn getters_return_cached_words() {
        assert!(std::ptr::eq(main_rgen(), main_rgen()));
    }

    #[test]
    fn byte_conversion_is_little_endian() {
        assert_eq!(bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07]), vec![SPIRV_MAGIC]);
    }
}
