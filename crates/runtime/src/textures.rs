//! Image upload for textures that reference a file through their `source`
//! annotation. Runs after a reload completes; every texture is independent,
//! so a missing or undecodable file only skips that one texture.

use catalog::TextureReference;
use image::imageops::FilterType;
use tracing::{error, info};

use crate::Runtime;

impl Runtime {
    /// Decodes and uploads the image file behind every realised texture
    /// with a `source` annotation, resizing when the file's dimensions do
    /// not match the declaration.
    pub fn load_textures(&mut self) {
        info!("loading image files for textures");

        let catalog = self.shared.catalog();
        for texture in &catalog.textures {
            if texture.handle.is_none() || texture.impl_reference != TextureReference::None {
                continue;
            }
            let source = texture.annotations.string("source");
            if source.is_empty() {
                continue;
            }

            let path = self
                .settings
                .texture_search_paths
                .iter()
                .map(|search_path| search_path.join(source))
                .find(|candidate| candidate.exists());
            let Some(path) = path else {
                error!(
                    texture = %texture.unique_name,
                    source,
                    "source image not found in any texture search path"
                );
                continue;
            };

            let decoded = match image::open(&path) {
                Ok(decoded) => decoded.to_rgba8(),
                Err(err) => {
                    error!(
                        texture = %texture.unique_name,
                        path = %path.display(),
                        error = %err,
                        "source image could not be loaded"
                    );
                    continue;
                }
            };

            if decoded.dimensions() != (texture.width, texture.height) {
                info!(
                    texture = %texture.unique_name,
                    from = ?decoded.dimensions(),
                    to = ?(texture.width, texture.height),
                    "resizing image data for texture"
                );
                let resized = image::imageops::resize(
                    &decoded,
                    texture.width,
                    texture.height,
                    FilterType::Triangle,
                );
                self.backend.update_texture(texture, resized.as_raw());
            } else {
                self.backend.update_texture(texture, decoded.as_raw());
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_runtime;
    use catalog::{Module, TextureHandle, TextureInfo};
    use image::{ImageBuffer, Rgba};
    use std::path::Path;

    fn write_image(path: &Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba([200, 100, 50, 255]));
        img.save(path).unwrap();
    }

    fn sourced_texture(name: &str, width: u32, height: u32, source: &str) -> TextureInfo {
        let mut info = TextureInfo {
            unique_name: name.to_string(),
            width,
            height,
            levels: 1,
            ..TextureInfo::default()
        };
        info.annotations.insert("source", source);
        info
    }

    #[test]
    fn uploads_matching_and_resized_images() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("exact.png"), 4, 4);
        write_image(&dir.path().join("scaled.png"), 8, 8);

        let (mut runtime, _pump, log) = test_runtime(dir.path());
        runtime.settings_mut().texture_search_paths = vec![dir.path().to_path_buf()];

        {
            let mut catalog = runtime.catalog();
            catalog.publish_module(
                Path::new("a.fx"),
                Module {
                    textures: vec![
                        sourced_texture("Exact", 4, 4, "exact.png"),
                        sourced_texture("Scaled", 4, 4, "scaled.png"),
                        sourced_texture("Missing", 4, 4, "absent.png"),
                    ],
                    ..Module::default()
                },
                String::new(),
            );
            for texture in &mut catalog.textures {
                texture.handle = TextureHandle::new(7);
            }
        }

        runtime.load_textures();

        let updated = log.updated.lock().unwrap();
        assert_eq!(updated.len(), 2, "the missing file skips only its texture");
        assert!(updated.contains(&("Exact".to_string(), 4 * 4 * 4)));
        assert!(
            updated.contains(&("Scaled".to_string(), 4 * 4 * 4)),
            "8x8 source resized to the declared 4x4"
        );
    }

    #[test]
    fn skips_unrealised_and_reference_textures() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("tex.png"), 4, 4);

        let (mut runtime, _pump, log) = test_runtime(dir.path());
        runtime.settings_mut().texture_search_paths = vec![dir.path().to_path_buf()];

        {
            let mut catalog = runtime.catalog();
            let mut color = TextureInfo {
                unique_name: "Color".to_string(),
                semantic: "COLOR".to_string(),
                ..TextureInfo::default()
            };
            color.annotations.insert("source", "tex.png");
            catalog.publish_module(
                Path::new("a.fx"),
                Module {
                    textures: vec![
                        sourced_texture("NotCompiled", 4, 4, "tex.png"),
                        color,
                    ],
                    ..Module::default()
                },
                String::new(),
            );
            // "Color" gets a handle but is a runtime reference; the plain
            // texture stays without backend objects.
            catalog.textures[1].handle = TextureHandle::new(3);
        }

        runtime.load_textures();
        assert!(log.updated.lock().unwrap().is_empty());
    }
}
