use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::SettingsError;

pub const GUIDANCE_RANGE: (f64, f64) = (0.0, 100.0);
pub const UNIT_RANGE: (f64, f64) = (0.0, 1.0);

pub const SETTING_KEYS: &[&str] = &[
    "aspect_ratio",
    "style",
    "mode",
    "variants",
    "seed",
    "guidance",
    "reference_strength",
    "temperature",
];

/// Declares a closed set of labelled choices with lenient parsing.
///
/// Parsing accepts the label, the identifier, or any spelling that matches
/// once case, spaces, dashes and underscores are ignored.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = SettingsError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let wanted = fold_label(raw);
                $(
                    if fold_label($label) == wanted || fold_label(stringify!($variant)) == wanted {
                        return Ok($name::$variant);
                    }
                )+
                Err(SettingsError::InvalidValue {
                    field: $field,
                    value: raw.to_string(),
                    expected: $name::ALL
                        .iter()
                        .map(|item| item.label())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
        }
    };
}

labelled_enum!(AspectRatio, "aspect_ratio" {
    Portrait9x16 => "9:16",
    Portrait3x4 => "3:4",
    Portrait4x5 => "4:5",
    Square => "1:1",
    Landscape16x9 => "16:9",
    Custom => "Custom",
});

labelled_enum!(StylePreset, "style" {
    PinterestMinimalStudio => "Pinterest Minimal Studio",
    SoftPastelAesthetic => "Soft Pastel Aesthetic",
    LuxuryEditorial => "Luxury Editorial",
    OutdoorLifestyle => "Outdoor Lifestyle",
    HighFashionRunway => "High Fashion Runway",
    CleanFlatlay => "Clean Flatlay",
    JewelryMacro => "Jewelry Macro",
});

labelled_enum!(Mode, "mode" {
    ProductOnly => "Product Only",
    ModelWearing => "Model Wearing",
    Mixed => "Mixed (dynamic)",
});

fn fold_label(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == ':')
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

impl StylePreset {
    /// Short art direction used when a backend has to expand the preset.
    pub fn direction(&self) -> &'static str {
        match self {
            Self::PinterestMinimalStudio => {
                "seamless neutral backdrop, soft diffused key light, generous negative space"
            }
            Self::SoftPastelAesthetic => {
                "pastel color blocking, airy high-key light, gentle shadows"
            }
            Self::LuxuryEditorial => {
                "dramatic directional light, rich textures, magazine cover composition"
            }
            Self::OutdoorLifestyle => "natural daylight, real-world location, candid framing",
            Self::HighFashionRunway => {
                "runway lighting, bold poses, high contrast, fashion week atmosphere"
            }
            Self::CleanFlatlay => "top-down flat lay, even shadowless light, tidy arrangement",
            Self::JewelryMacro => {
                "macro lens detail, sparkling highlights, shallow depth of field"
            }
        }
    }
}

impl Mode {
    pub fn direction(&self) -> &'static str {
        match self {
            Self::ProductOnly => "show the product on its own, no people",
            Self::ModelWearing => "show the product worn or held by a model",
            Self::Mixed => "mix product-only and on-model shots",
        }
    }
}

/// Number of variants a generation shows. Only 1, 2 and 4 exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantCount {
    One,
    Two,
    Four,
}

impl VariantCount {
    pub const ALL: &'static [VariantCount] = &[Self::One, Self::Two, Self::Four];

    pub fn get(&self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

impl TryFrom<u64> for VariantCount {
    type Error = SettingsError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            other => Err(SettingsError::InvalidValue {
                field: "variants",
                value: other.to_string(),
                expected: "1, 2, 4".to_string(),
            }),
        }
    }
}

impl FromStr for VariantCount {
    type Err = SettingsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parsed = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| SettingsError::InvalidValue {
                field: "variants",
                value: raw.to_string(),
                expected: "1, 2, 4".to_string(),
            })?;
        Self::try_from(parsed)
    }
}

impl fmt::Display for VariantCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl Serialize for VariantCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.get() as u64)
    }
}

/// Current generation configuration.
///
/// Numeric fields are private so every write goes through a checked setter;
/// a value outside its domain is refused and the previous value is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSettings {
    pub aspect_ratio: AspectRatio,
    pub style_preset: StylePreset,
    pub mode: Mode,
    pub variant_count: VariantCount,
    seed: Option<i64>,
    guidance_strength: f64,
    reference_strength: f64,
    temperature: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Portrait9x16,
            style_preset: StylePreset::PinterestMinimalStudio,
            mode: Mode::ProductOnly,
            variant_count: VariantCount::One,
            seed: None,
            guidance_strength: 70.0,
            reference_strength: 0.8,
            temperature: 0.75,
        }
    }
}

impl GenerationSettings {
    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    pub fn guidance_strength(&self) -> f64 {
        self.guidance_strength
    }

    pub fn reference_strength(&self) -> f64 {
        self.reference_strength
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_seed(&mut self, seed: Option<i64>) {
        self.seed = seed;
    }

    pub fn set_guidance_strength(&mut self, value: f64) -> Result<(), SettingsError> {
        self.guidance_strength = checked("guidance", value, GUIDANCE_RANGE)?;
        Ok(())
    }

    pub fn set_reference_strength(&mut self, value: f64) -> Result<(), SettingsError> {
        self.reference_strength = checked("reference_strength", value, UNIT_RANGE)?;
        Ok(())
    }

    pub fn set_temperature(&mut self, value: f64) -> Result<(), SettingsError> {
        self.temperature = checked("temperature", value, UNIT_RANGE)?;
        Ok(())
    }

    /// Applies a textual `key value` update, as typed by a user.
    ///
    /// `seed` accepts `none`, `random` or an empty value to clear it.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "aspect_ratio" | "aspect" | "ratio" => self.aspect_ratio = value.parse()?,
            "style" | "style_preset" | "preset" => self.style_preset = value.parse()?,
            "mode" => self.mode = value.parse()?,
            "variants" | "variant_count" | "n" => self.variant_count = value.parse()?,
            "seed" => self.seed = parse_seed(value)?,
            "guidance" | "guidance_strength" => {
                self.set_guidance_strength(parse_number("guidance", value)?)?
            }
            "reference_strength" | "reference" => {
                self.set_reference_strength(parse_number("reference_strength", value)?)?
            }
            "temperature" | "temp" => self.set_temperature(parse_number("temperature", value)?)?,
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

fn checked(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<f64, SettingsError> {
    if !value.is_finite() || value < min || value > max {
        return Err(SettingsError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, SettingsError> {
    raw.parse::<f64>().map_err(|_| SettingsError::InvalidValue {
        field,
        value: raw.to_string(),
        expected: "a number".to_string(),
    })
}

fn parse_seed(raw: &str) -> Result<Option<i64>, SettingsError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("random") {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| SettingsError::InvalidValue {
            field: "seed",
            value: raw.to_string(),
            expected: "an integer or 'none'".to_string(),
        })
}
