//! Model catalog
//!
//! The upstream routes by model list rather than by name: a single known
//! text model id goes up as `[model]`, anything else rides the mixture
//! list. Image and video ids select the corresponding generation flows.

pub const TEXT_MODELS: &[&str] = &[
    "gpt-5-pro",
    "gpt-5.1-low",
    "gpt-5.2",
    "gpt-5.2-pro",
    "o1",
    "o3-pro",
    "o3-mini-high",
    "claude-sonnet-4-6",
    "claude-sonnet-4-5",
    "claude-opus-4-6",
    "claude-opus-4-5",
    "claude-4-5-haiku",
    "deep-seek-r1",
    "gemini-2.5-pro",
    "gemini-3-flash-preview",
    "gemini-3.1-pro-preview",
    "gemini-3-pro-preview",
    "grok-4-0709",
];

/// Models sent together when the requested id is not a known text model
pub const MIXTURE_MODELS: &[&str] = &["gpt-5.1-low", "claude-sonnet-4-5", "gemini-3-pro-preview"];

pub const IMAGE_MODELS: &[&str] = &[
    "dalle-3",
    "nano-banana-pro",
    "nano-banana-2",
    "fal-ai/flux-2",
    "fal-ai/flux-2-pro",
    "fal-ai/z-image/turbo",
    "fal-ai/gpt-image-1.5",
    "recraft-v3",
    "ideogram/V_3",
    "qwen-image",
];

pub const VIDEO_MODELS: &[&str] = &[
    "gemini/veo3.1",
    "gemini/veo3",
    "sora-2",
    "sora-2-pro",
    "kling/v3",
    "wan/v2.6",
    "vidu/q3",
    "runway/gen4_turbo",
];

pub fn is_text_model(model: &str) -> bool {
    TEXT_MODELS.contains(&model)
}

pub fn is_image_model(model: &str) -> bool {
    IMAGE_MODELS.contains(&model)
}

pub fn is_video_model(model: &str) -> bool {
    VIDEO_MODELS.contains(&model)
}

/// Every id advertised by `GET /v1/models`, `-search` variants excluded
pub fn all_models() -> impl Iterator<Item = &'static str> {
    TEXT_MODELS
        .iter()
        .chain(IMAGE_MODELS.iter())
        .chain(VIDEO_MODELS.iter())
        .copied()
}

/// Rewrite client-facing aliases to the ids the upstream knows.
///
/// `deepseek*` maps onto the upstream's `deep-seek*` family and the
/// OpenAI `dall-e-3` id onto `dalle-3`.
pub fn dealias(model: &str) -> String {
    if let Some(rest) = model.strip_prefix("deepseek") {
        return format!("deep-seek{rest}");
    }
    if model == "dall-e-3" {
        return "dalle-3".to_string();
    }
    model.to_string()
}
