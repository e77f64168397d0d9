//! Screenshot capture: the backend copies the frame into an RGBA buffer,
//! the image crate streams it to disk, and, when configured, the active
//! preset and the configuration are snapshotted next to it under the same
//! timestamped base name.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use image::codecs::bmp::BmpEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use settings::ScreenshotFormat;
use tracing::{error, info};

use crate::Runtime;

impl Runtime {
    /// Captures the current frame into `<stem> YYYY-MM-DD HH-MM-SS.<ext>`
    /// under the configured screenshot path. Snapshot files are only
    /// written when the image itself succeeded.
    pub fn save_screenshot(&mut self) {
        let mut data = vec![0u8; self.width as usize * self.height as usize * 4];
        self.backend.capture_frame(&mut data);

        let base = self.screenshot_base_name();
        let target = self
            .settings
            .screenshot_path
            .join(format!("{base}.{}", self.settings.screenshot_format.extension()));

        info!(path = %target.display(), "saving screenshot");
        if let Err(err) = write_image(
            &target,
            self.settings.screenshot_format,
            &data,
            self.width,
            self.height,
        ) {
            error!(path = %target.display(), error = %err, "failed to write screenshot");
            return;
        }

        if self.settings.screenshot_include_preset {
            if let Some(preset_file) = self.settings.current_preset_file().map(Path::to_path_buf) {
                let stem = preset_file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let snapshot = self
                    .settings
                    .screenshot_path
                    .join(format!("{base} {stem}.ini"));
                self.save_preset_as(&preset_file, &snapshot);
            }
        }
        if self.settings.screenshot_include_configuration {
            let snapshot = self.settings.screenshot_path.join(format!("{base}.ini"));
            if let Err(err) = self.config.save_as(&snapshot, &self.settings) {
                error!(path = %snapshot.display(), error = %err, "failed to snapshot configuration");
            }
        }
    }

    /// `<executable stem> YYYY-MM-DD HH-MM-SS`, from the date sampled at
    /// the top of the frame.
    fn screenshot_base_name(&self) -> String {
        let stem = self
            .executable_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hour = self.date[3] / 3600;
        let minute = (self.date[3] - hour * 3600) / 60;
        let second = self.date[3] - hour * 3600 - minute * 60;
        format!(
            "{stem} {:04}-{:02}-{:02} {:02}-{:02}-{:02}",
            self.date[0], self.date[1], self.date[2], hour, minute, second
        )
    }
}

fn write_image(
    path: &Path,
    format: ScreenshotFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        ScreenshotFormat::Bmp => BmpEncoder::new(&mut writer)
            .write_image(data, width, height, ExtendedColorType::Rgba8)
            .context("encoding bmp")?,
        ScreenshotFormat::Png => PngEncoder::new(&mut writer)
            .write_image(data, width, height, ExtendedColorType::Rgba8)
            .context("encoding png")?,
    }
    Ok(())
}
