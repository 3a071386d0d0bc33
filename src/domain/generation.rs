use serde::Serialize;
use thiserror::Error;

pub const MAX_VARIATIONS: u32 = 10;

/// A video model and what it costs to run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct GenerationModel {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
    /// Credits per second of output, in tenths of a credit.
    pub tenths_per_second: u32,
    pub max_duration_seconds: u32,
}

pub const GENERATION_MODELS: &[GenerationModel] = &[
    GenerationModel {
        id: "kling-1.6",
        name: "Kling AI 1.6",
        provider: "Kling",
        tenths_per_second: 12,
        max_duration_seconds: 10,
    },
    GenerationModel {
        id: "runway-gen3",
        name: "Runway Gen-3 Alpha",
        provider: "Runway",
        tenths_per_second: 15,
        max_duration_seconds: 8,
    },
    GenerationModel {
        id: "veo-2",
        name: "Google Veo 2",
        provider: "Google",
        tenths_per_second: 13,
        max_duration_seconds: 8,
    },
    GenerationModel {
        id: "luma-dream",
        name: "Luma Dream Machine",
        provider: "Luma",
        tenths_per_second: 8,
        max_duration_seconds: 5,
    },
    GenerationModel {
        id: "pika-1.5",
        name: "Pika 1.5",
        provider: "Pika",
        tenths_per_second: 10,
        max_duration_seconds: 6,
    },
];

#[derive(Error, Debug, PartialEq)]
pub enum PricingError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Duration must be between 1 and {max} seconds")]
    InvalidDuration { max: u32 },
    #[error("Variations must be between 1 and {max}")]
    InvalidVariations { max: u32 },
}

pub fn find_model(id: &str) -> Option<&'static GenerationModel> {
    GENERATION_MODELS.iter().find(|m| m.id == id)
}

impl GenerationModel {
    /// Whole credits for one video, rounded up.
    pub fn cost_per_video(&self, duration_seconds: u32) -> Result<i64, PricingError> {
        if duration_seconds == 0 || duration_seconds > self.max_duration_seconds {
            return Err(PricingError::InvalidDuration {
                max: self.max_duration_seconds,
            });
        }
        let tenths = i64::from(self.tenths_per_second) * i64::from(duration_seconds);
        Ok(((tenths + 9) / 10).max(1))
    }
}

/// Total credits for a generation request.
pub fn quote(model_id: &str, duration_seconds: u32, variations: u32) -> Result<i64, PricingError> {
    let model = find_model(model_id).ok_or_else(|| PricingError::UnknownModel(model_id.to_string()))?;
    if variations == 0 || variations > MAX_VARIATIONS {
        return Err(PricingError::InvalidVariations { max: MAX_VARIATIONS });
    }
    Ok(model.cost_per_video(duration_seconds)? * i64::from(variations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn costs_round_up_to_whole_credits() {
        let kling = find_model("kling-1.6").unwrap();
        assert_eq!(kling.cost_per_video(5).unwrap(), 6);
        assert_eq!(kling.cost_per_video(10).unwrap(), 12);

        let veo = find_model("veo-2").unwrap();
        // 1.3 * 3 = 3.9
        assert_eq!(veo.cost_per_video(3).unwrap(), 4);

        let luma = find_model("luma-dream").unwrap();
        assert_eq!(luma.cost_per_video(1).unwrap(), 1);
    }

    #[test]
    fn duration_is_bounded_by_model() {
        let pika = find_model("pika-1.5").unwrap();
        assert_eq!(
            pika.cost_per_video(7),
            Err(PricingError::InvalidDuration { max: 6 })
        );
        assert!(pika.cost_per_video(0).is_err());
    }

    #[test]
    fn quote_multiplies_by_variations() {
        assert_eq!(quote("runway-gen3", 8, 3).unwrap(), 36);
        assert_eq!(
            quote("runway-gen3", 8, 11),
            Err(PricingError::InvalidVariations { max: 10 })
        );
        assert_eq!(
            quote("sora", 5, 1),
            Err(PricingError::UnknownModel("sora".to_string()))
        );
    }
}
