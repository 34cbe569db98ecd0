use indexmap::IndexMap;
use serde::Serialize;

pub const DEFAULT_STYLE: &str = "realistic";

/// An artistic preset: a display name plus the fragments sent to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub key: &'static str,
    pub name: &'static str,
    pub prompt: &'static str,
    pub negative: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StyleSummary {
    pub key: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StyleName {
    pub name: &'static str,
}

static STYLES: [Style; 8] = [
    Style {
        key: "realistic",
        name: "Realism",
        prompt: "photorealistic, highly detailed, 8k resolution, professional photography, natural lighting, sharp focus",
        negative: "cartoon, anime, drawing, painting, artificial, blurry, low quality",
    },
    Style {
        key: "anime",
        name: "Anime",
        prompt: "anime style, manga illustration, vibrant colors, cel shading, detailed linework",
        negative: "realistic, photo, 3d render",
    },
    Style {
        key: "oil_painting",
        name: "Oil painting",
        prompt: "oil painting style, impasto technique, rich textures, classical art, museum quality",
        negative: "photo, realistic, digital art, cartoon, anime",
    },
    Style {
        key: "cyberpunk",
        name: "Cyberpunk",
        prompt: "cyberpunk city, neon lights, futuristic, sci-fi, android, holographic displays",
        negative: "natural, peaceful, daylight, vintage, medieval",
    },
    Style {
        key: "watercolor",
        name: "Watercolor",
        prompt: "watercolor painting, soft edges, fluid colors, artistic, delicate, whimsical",
        negative: "sharp, digital, 3d, realistic, dark, heavy",
    },
    Style {
        key: "fantasy",
        name: "Fantasy",
        prompt: "fantasy art, magical, enchanted, mystical creatures, epic scene",
        negative: "modern, realistic, urban, technology, sci-fi",
    },
    Style {
        key: "portrait",
        name: "Portrait",
        prompt: "professional portrait, studio lighting, sharp details, natural skin texture",
        negative: "blurry, cartoon, anime, distorted, low quality",
    },
    Style {
        key: "landscape",
        name: "Landscape",
        prompt: "breathtaking landscape, dramatic lighting, golden hour, atmospheric",
        negative: "urban, city, building, indoor, artificial",
    },
];

pub fn get(key: &str) -> Option<&'static Style> {
    STYLES.iter().find(|style| style.key == key)
}

/// Looks up `key`, falling back to the default style for unknown keys.
pub fn resolve(key: &str) -> &'static Style {
    get(key.trim()).unwrap_or(&STYLES[0])
}

pub fn summaries() -> Vec<StyleSummary> {
    STYLES
        .iter()
        .map(|style| StyleSummary {
            key: style.key,
            name: style.name,
        })
        .collect()
}

/// Catalog order preserved, shaped as `{key: {name}}`.
pub fn name_map() -> IndexMap<&'static str, StyleName> {
    STYLES
        .iter()
        .map(|style| (style.key, StyleName { name: style.name }))
        .collect()
}

impl Style {
    pub fn compose(&self, prompt: &str) -> String {
        format!("{prompt}, {}", self.prompt)
    }
}
