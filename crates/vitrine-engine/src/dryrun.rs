use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use vitrine_contracts::{
    extract_swatches, BackendError, BackendOperation, GenerationSettings, ReferenceImage,
    StylePreset,
};

use crate::backend::{PromptSynthesis, StudioBackend};

const DOMINANT_COLORS_PER_IMAGE: usize = 3;
const OUTPUT_SIZE: u32 = 64;

/// Offline backend: analyses real pixels, writes template prompts and
/// renders solid-color placeholder images.
///
/// Output is a pure function of the inputs, which makes it the backend of
/// choice for tests and demos.
#[derive(Debug, Clone)]
pub struct DryrunBackend {
    variants: usize,
}

impl DryrunBackend {
    pub fn new(variants: usize) -> Self {
        Self {
            variants: variants.max(1),
        }
    }

    fn analyze(images: &[ReferenceImage]) -> Result<String> {
        let mut lines = Vec::with_capacity(images.len() + 1);
        let mut palette = Vec::new();
        for (idx, reference) in images.iter().enumerate() {
            let decoded = image::load_from_memory(reference.bytes())
                .with_context(|| format!("failed to decode {}", reference.file_name))?;
            let (width, height) = decoded.dimensions();
            let colors = dominant_colors(&decoded, DOMINANT_COLORS_PER_IMAGE);
            let fingerprint = hex::encode(&Sha256::digest(reference.bytes())[..4]);
            lines.push(format!(
                "Reference {} ({}, {}x{}, sha256 {}): dominant colors {}.",
                idx + 1,
                reference.file_name,
                width,
                height,
                fingerprint,
                colors.join(", ")
            ));
            palette.extend(colors);
        }
        lines.push(format!(
            "Overall palette: {}. Studio product shot, keep materials and proportions true to the references.",
            palette.join(", ")
        ));
        Ok(lines.join("\n"))
    }

    fn synthesize(
        &self,
        analysis: &str,
        existing_prompt: &str,
        style_preset: StylePreset,
        settings: &GenerationSettings,
    ) -> String {
        let mut sections = Vec::new();
        let direction = existing_prompt.trim();
        if !direction.is_empty() {
            sections.push(format!("{direction}."));
        }
        sections.push(format!(
            "{} product photograph: {}.",
            style_preset.label(),
            style_preset.direction()
        ));
        sections.push(format!(
            "Mode: {}. Aspect ratio {}.",
            settings.mode.direction(),
            settings.aspect_ratio
        ));
        let palette = extract_swatches(analysis)
            .into_iter()
            .map(|swatch| swatch.hex)
            .collect::<Vec<String>>();
        if !palette.is_empty() {
            sections.push(format!("Color palette: {}.", palette.join(", ")));
        }
        sections.push(format!(
            "Match the reference product closely (reference strength {:.2}, guidance {:.0}).",
            settings.reference_strength(),
            settings.guidance_strength()
        ));
        if let Some(seed) = settings.seed() {
            sections.push(format!("Seed {seed}."));
        }
        sections.join(" ")
    }

    fn render(&self, prompt: &str, images: &[ReferenceImage]) -> Result<Vec<String>> {
        (0..self.variants)
            .map(|idx| {
                let color = color_for_variant(prompt, images, idx as u64);
                let png = solid_png(OUTPUT_SIZE, OUTPUT_SIZE, color)?;
                Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
            })
            .collect()
    }
}

#[async_trait]
impl StudioBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn analyze_images(&self, images: &[ReferenceImage]) -> Result<String, BackendError> {
        // Decoding and histogramming are CPU bound.
        let owned = images.to_vec();
        tokio::task::spawn_blocking(move || Self::analyze(&owned))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|analysis| analysis)
            .map_err(|err| {
                BackendError::from_anyhow(self.name(), BackendOperation::AnalyzeImages, &err)
            })
    }

    async fn generate_final_prompt(
        &self,
        analysis: &str,
        existing_prompt: &str,
        style_preset: StylePreset,
        settings: &GenerationSettings,
    ) -> Result<PromptSynthesis, BackendError> {
        Ok(PromptSynthesis {
            prompt: self.synthesize(analysis, existing_prompt, style_preset, settings),
        })
    }

    async fn generate_images(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
    ) -> Result<Vec<String>, BackendError> {
        self.render(prompt, images)
            .map_err(|err| {
                BackendError::from_anyhow(self.name(), BackendOperation::GenerateImages, &err)
            })
    }
}

/// Most common colors of an image, as `#RRGGBB`, most frequent first.
///
/// Pixels are grouped into coarse buckets (3 bits per channel) and each
/// bucket reports its mean color.
pub fn dominant_colors(image: &DynamicImage, limit: usize) -> Vec<String> {
    let (width, height) = image.dimensions();
    let sample = if width > 64 || height > 64 {
        image.thumbnail(64, 64).to_rgb8()
    } else {
        image.to_rgb8()
    };
    let mut buckets: BTreeMap<(u8, u8, u8), (u64, [u64; 3])> = BTreeMap::new();
    for pixel in sample.pixels() {
        let [r, g, b] = pixel.0;
        let entry = buckets.entry((r >> 5, g >> 5, b >> 5)).or_insert((0, [0; 3]));
        entry.0 += 1;
        entry.1[0] += u64::from(r);
        entry.1[1] += u64::from(g);
        entry.1[2] += u64::from(b);
    }

    let mut ranked: Vec<(u64, [u64; 3])> = buckets.into_values().collect();
    ranked.sort_by(|left, right| right.0.cmp(&left.0));
    ranked
        .into_iter()
        .take(limit)
        .map(|(count, sums)| {
            format!(
                "#{:02X}{:02X}{:02X}",
                sums[0] / count,
                sums[1] / count,
                sums[2] / count
            )
        })
        .collect()
}

pub(crate) fn solid_png(width: u32, height: u32, color: (u8, u8, u8)) -> Result<Vec<u8>> {
    let (r, g, b) = color;
    let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode png")?;
    Ok(out.into_inner())
}

fn color_for_variant(prompt: &str, images: &[ReferenceImage], idx: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    for image in images {
        hasher.update(image.bytes());
    }
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
