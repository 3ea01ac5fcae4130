use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Renderer configuration. Target sizes and sample counts are fixed when the
/// renderer is constructed; changing them means building a new renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_cascade_map_size")]
    pub cascade_map_size: u32,
    #[serde(default = "RenderSettings::default_environment_map_size")]
    pub environment_map_size: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "RenderSettings::default_blur_iterations")]
    pub blur_iterations: u32,
    #[serde(default = "RenderSettings::default_shadow_blur")]
    pub shadow_blur: bool,
    #[serde(default = "RenderSettings::default_bloom_strength")]
    pub bloom_strength: f32,
    #[serde(default = "RenderSettings::default_bloom_downscale")]
    pub bloom_downscale: u32,
    #[serde(default = "RenderSettings::default_cascade_split_lambda")]
    pub cascade_split_lambda: f32,
    #[serde(default = "RenderSettings::default_environment_faces_per_frame")]
    pub environment_faces_per_frame: u32,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_count: Self::default_sample_count(),
            shadow_map_size: Self::default_shadow_map_size(),
            cascade_map_size: Self::default_cascade_map_size(),
            environment_map_size: Self::default_environment_map_size(),
            resolution: Resolution::default(),
            blur_iterations: Self::default_blur_iterations(),
            shadow_blur: Self::default_shadow_blur(),
            bloom_strength: Self::default_bloom_strength(),
            bloom_downscale: Self::default_bloom_downscale(),
            cascade_split_lambda: Self::default_cascade_split_lambda(),
            environment_faces_per_frame: Self::default_environment_faces_per_frame(),
            present_mode: PresentModeSetting::default(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    /// Replaces values the renderer cannot work with by their defaults.
    pub fn validate(mut self) -> Self {
        if self.sample_count == 0 || !self.sample_count.is_power_of_two() {
            warn!(
                "Sample count {} is not a power of two. Using default value.",
                self.sample_count
            );
            self.sample_count = Self::default_sample_count();
        }

        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.cascade_map_size == 0 {
            warn!("Cascade map size must be greater than zero. Using default value.");
            self.cascade_map_size = Self::default_cascade_map_size();
        }

        if self.environment_map_size == 0 {
            warn!("Environment map size must be greater than zero. Using default value.");
            self.environment_map_size = Self::default_environment_map_size();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.bloom_downscale == 0 {
            warn!("Bloom downscale must be greater than zero. Using default value.");
            self.bloom_downscale = Self::default_bloom_downscale();
        }

        if !(0.0..=1.0).contains(&self.cascade_split_lambda) {
            warn!(
                "Cascade split lambda {} outside [0, 1]. Using default value.",
                self.cascade_split_lambda
            );
            self.cascade_split_lambda = Self::default_cascade_split_lambda();
        }

        if !self.bloom_strength.is_finite() || self.bloom_strength < 0.0 {
            warn!("Bloom strength must be a non-negative number. Using default value.");
            self.bloom_strength = Self::default_bloom_strength();
        }

        if self.environment_faces_per_frame == 0 || self.environment_faces_per_frame > 6 {
            warn!("Environment faces per frame must be in 1..=6. Using default value.");
            self.environment_faces_per_frame = Self::default_environment_faces_per_frame();
        }

        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    /// Size of the bloom ping-pong targets.
    pub fn post_resolution(&self) -> Resolution {
        Resolution {
            width: (self.resolution.width / self.bloom_downscale).max(1),
            height: (self.resolution.height / self.bloom_downscale).max(1),
        }
    }

    const fn default_sample_count() -> u32 {
        4
    }

    const fn default_shadow_map_size() -> u32 {
        1024
    }

    const fn default_cascade_map_size() -> u32 {
        1024
    }

    const fn default_environment_map_size() -> u32 {
        128
    }

    const fn default_blur_iterations() -> u32 {
        6
    }

    const fn default_shadow_blur() -> bool {
        true
    }

    const fn default_bloom_strength() -> f32 {
        0.1
    }

    const fn default_bloom_downscale() -> u32 {
        2
    }

    const fn default_cascade_split_lambda() -> f32 {
        0.5
    }

    const fn default_environment_faces_per_frame() -> u32 {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            sample_count: 3,
            shadow_map_size: 0,
            cascade_map_size: 0,
            environment_map_size: 0,
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            blur_iterations: 0,
            shadow_blur: false,
            bloom_strength: -1.0,
            bloom_downscale: 0,
            cascade_split_lambda: 2.0,
            environment_faces_per_frame: 9,
            present_mode: PresentModeSetting::Immediate,
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = RenderSettings::default();

        assert_eq!(validated.sample_count, defaults.sample_count);
        assert_eq!(validated.shadow_map_size, defaults.shadow_map_size);
        assert_eq!(validated.cascade_map_size, defaults.cascade_map_size);
        assert_eq!(validated.environment_map_size, defaults.environment_map_size);
        assert_eq!(validated.resolution, Resolution::default());
        assert_eq!(validated.bloom_downscale, defaults.bloom_downscale);
        assert_eq!(validated.bloom_strength, defaults.bloom_strength);
        assert_eq!(validated.cascade_split_lambda, defaults.cascade_split_lambda);
        assert_eq!(
            validated.environment_faces_per_frame,
            defaults.environment_faces_per_frame
        );
        // Zero blur iterations is a valid way to disable bloom blur.
        assert_eq!(validated.blur_iterations, 0);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            sample_count: 1,
            shadow_map_size: 2048,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            blur_iterations: 4,
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.sample_count, valid.sample_count);
        assert_eq!(validated.shadow_map_size, valid.shadow_map_size);
        assert_eq!(validated.resolution, valid.resolution);
        assert_eq!(validated.blur_iterations, 4);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "sample_count": 1 }"#).expect("parse settings");
        assert_eq!(settings.sample_count, 1);
        assert_eq!(settings.blur_iterations, 6);
        assert_eq!(settings.resolution, Resolution::default());
    }

    #[test]
    fn post_resolution_is_downscaled_and_never_zero() {
        let settings = RenderSettings {
            resolution: Resolution::new(1, 1),
            bloom_downscale: 4,
            ..RenderSettings::default()
        };
        assert_eq!(settings.post_resolution(), Resolution::new(1, 1));

        let settings = RenderSettings {
            resolution: Resolution::new(128, 64),
            ..RenderSettings::default()
        };
        assert_eq!(settings.post_resolution(), Resolution::new(64, 32));
    }

    #[test]
    fn present_mode_returns_desired_when_available() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }
}
