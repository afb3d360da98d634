use vitrine_contracts::{GenerationSettings, StylePreset};

pub const PROMPT_SYSTEM_INSTRUCTION: &str = "You are an art director writing prompts for an \
image model that produces e-commerce product photography. Reply with a JSON object \
{\"prompt\": string} and nothing else.";

pub fn analysis_instruction(image_count: usize) -> String {
    let subject = if image_count == 1 {
        "this reference image".to_string()
    } else {
        format!("these {image_count} reference images")
    };
    format!(
        "Describe the product shown in {subject} for a photographer who has to reshoot it. \
Cover the product type, materials, finish, shape, proportions, branding and any details \
that must survive a restyle. List the dominant colors as hex codes written like #RRGGBB."
    )
}

pub fn prompt_instruction(
    analysis: &str,
    existing_prompt: &str,
    style_preset: StylePreset,
    settings: &GenerationSettings,
) -> String {
    let mut lines = vec![
        "Write one image generation prompt for a product photo.".to_string(),
        format!("Product analysis:\n{}", analysis.trim()),
    ];
    let direction = existing_prompt.trim();
    if !direction.is_empty() {
        lines.push(format!(
            "The user's own direction, keep its intent:\n{direction}"
        ));
    }
    lines.push(format!(
        "Style: {} ({}).",
        style_preset.label(),
        style_preset.direction()
    ));
    lines.push(format!(
        "Mode: {} ({}).",
        settings.mode.label(),
        settings.mode.direction()
    ));
    lines.push(format!("Aspect ratio: {}.", settings.aspect_ratio));
    lines.push(format!(
        "Stay faithful to the reference product (reference strength {:.2} of 1, guidance {:.0} of 100).",
        settings.reference_strength(),
        settings.guidance_strength()
    ));
    lines.push("Mention the key colors as hex codes.".to_string());
    lines.join("\n\n")
}
