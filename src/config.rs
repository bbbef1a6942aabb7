use std::{env, fmt, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow, bail};

const DEFAULT_JPEG_QUALITY: f32 = 0.8;
const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(2_000);
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// How the stream request constrains resolution. Capture hardware differs a lot
/// in how it reacts to high-resolution requests, so this stays a knob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Let the device pick its own format.
    #[default]
    Native,
    /// Require exactly this size; fails as overconstrained otherwise.
    Fixed { width: u32, height: u32 },
    /// Prefer the closest supported size, falling back to native.
    Ideal { width: u32, height: u32 },
}

impl ResolutionPolicy {
    /// Drops any explicit size. Used when retrying after an overconstrained failure.
    pub fn relaxed(self) -> Self {
        ResolutionPolicy::Native
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPolicy::Native => f.write_str("native"),
            ResolutionPolicy::Fixed { width, height } => write!(f, "fixed:{width}x{height}"),
            ResolutionPolicy::Ideal { width, height } => write!(f, "ideal:{width}x{height}"),
        }
    }
}

impl FromStr for ResolutionPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value == "native" || value.is_empty() {
            return Ok(ResolutionPolicy::Native);
        }

        let (kind, size) = value
            .split_once(':')
            .ok_or_else(|| anyhow!("expected native, fixed:WxH or ideal:WxH, got {value:?}"))?;
        let (width, height) = parse_size(size)?;
        match kind {
            "fixed" => Ok(ResolutionPolicy::Fixed { width, height }),
            "ideal" => Ok(ResolutionPolicy::Ideal { width, height }),
            other => bail!("unknown resolution policy {other:?}"),
        }
    }
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("resolution must look like WIDTHxHEIGHT, got {size:?}"))?;
    let width = w
        .parse::<u32>()
        .with_context(|| format!("invalid width {w:?}"))?;
    let height = h
        .parse::<u32>()
        .with_context(|| format!("invalid height {h:?}"))?;
    if width == 0 || height == 0 {
        bail!("resolution must be non-zero, got {width}x{height}");
    }
    Ok((width, height))
}

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub resolution: ResolutionPolicy,
    /// JPEG quality on a 0..=1 scale.
    pub jpeg_quality: f32,
    pub autoplay: bool,
    pub device_poll_interval: Duration,
    pub analysis: AnalysisConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resolution: ResolutionPolicy::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            autoplay: true,
            device_poll_interval: DEFAULT_DEVICE_POLL_INTERVAL,
            analysis: AnalysisConfig {
                api_key: None,
                model: DEFAULT_GEMINI_MODEL.to_string(),
                endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
                timeout: DEFAULT_ANALYSIS_TIMEOUT,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(value) = lookup("UVC_HUD_RESOLUTION") {
            config.resolution = value
                .parse()
                .context("UVC_HUD_RESOLUTION is invalid")?;
        }

        if let Some(value) = lookup("UVC_HUD_JPEG_QUALITY") {
            let quality = value
                .trim()
                .parse::<f32>()
                .context("UVC_HUD_JPEG_QUALITY must be a number")?;
            if !(0.0..=1.0).contains(&quality) {
                bail!("UVC_HUD_JPEG_QUALITY must be within 0.0..=1.0, got {quality}");
            }
            config.jpeg_quality = quality;
        }

        if let Some(value) = lookup("UVC_HUD_ANALYSIS_TIMEOUT_SECS") {
            let secs = value
                .trim()
                .parse::<u64>()
                .context("UVC_HUD_ANALYSIS_TIMEOUT_SECS must be an integer")?;
            if secs == 0 {
                bail!("UVC_HUD_ANALYSIS_TIMEOUT_SECS must be at least 1");
            }
            config.analysis.timeout = Duration::from_secs(secs);
        }

        if let Some(value) = lookup("UVC_HUD_AUTOPLAY") {
            config.autoplay = parse_bool(&value).context("UVC_HUD_AUTOPLAY is invalid")?;
        }

        if let Some(value) = lookup("UVC_HUD_DEVICE_POLL_MS") {
            let millis = value
                .trim()
                .parse::<u64>()
                .context("UVC_HUD_DEVICE_POLL_MS must be an integer")?;
            config.device_poll_interval = Duration::from_millis(millis.max(100));
        }

        config.analysis.api_key = lookup("GEMINI_API_KEY").filter(|key| !key.trim().is_empty());
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.analysis.model = model;
        }
        if let Some(endpoint) = lookup("GEMINI_ENDPOINT") {
            config.analysis.endpoint = endpoint.trim_end_matches('/').to_string();
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
