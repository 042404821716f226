//! Text recognition: an external engine behind a trait, plus the parsing
//! rules that turn its raw output into typed, sentinel-safe values.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use regex::Regex;
use rten::Model;

use crate::game::{Mood, Turn};
use crate::logger;
use crate::platform::Device;
use crate::types::Region;

pub const DETECTION_MODEL: &str = "text-detection.rten";
pub const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Single-line text engine.
pub trait TextEngine: Send {
    fn read(&self, image: &GrayImage) -> Result<String>;
}

/// Paths of the detection and recognition models in `dir`, or an error
/// naming whichever is missing.
pub fn model_paths(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let detection = dir.join(DETECTION_MODEL);
    let recognition = dir.join(RECOGNITION_MODEL);
    for path in [&detection, &recognition] {
        if !path.is_file() {
            bail!(
                "OCR model {} not found; download {} and {} from the ocrs releases into {}",
                path.display(),
                DETECTION_MODEL,
                RECOGNITION_MODEL,
                dir.display()
            );
        }
    }
    Ok((detection, recognition))
}

/// In-process recognition with the `ocrs` models.
pub struct OcrsEngine {
    engine: OcrEngine,
}

impl OcrsEngine {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let (detection_path, recognition_path) = model_paths(model_dir)?;
        let detection_model = Model::load_file(&detection_path)
            .with_context(|| format!("loading {}", detection_path.display()))?;
        let recognition_model = Model::load_file(&recognition_path)
            .with_context(|| format!("loading {}", recognition_path.display()))?;
        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .context("starting OCR engine")?;
        logger::info_p("ocr", &format!("models loaded from {}", model_dir.display()));
        Ok(Self { engine })
    }
}

impl TextEngine for OcrsEngine {
    fn read(&self, image: &GrayImage) -> Result<String> {
        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())?;
        let input = self.engine.prepare_input(source)?;
        let words = self.engine.detect_words(&input)?;
        let lines = self.engine.find_text_lines(&input, &words);
        let text = self.engine.recognize_text(&input, &lines)?;
        Ok(text
            .iter()
            .filter_map(|line| line.as_ref())
            .flat_map(|line| line.words())
            .map(|word| word.to_string())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Digits only; 0 when none. Saturates instead of overflowing.
pub fn parse_number(text: &str) -> u32 {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u32, |acc, d| acc.saturating_mul(10).saturating_add(d))
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"failure\s+(\d{1,3})%").expect("static regex"))
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"failure\s+(\d+)").expect("static regex"))
}

/// Failure percent from text like "Failure 12%". `None` when the text does
/// not start with "failure" or no plausible percent can be recovered.
pub fn parse_failure(text: &str) -> Option<u32> {
    let text = text.trim().to_lowercase();
    if !text.starts_with("failure") {
        return None;
    }
    let value = if let Some(caps) = percent_re().captures(&text) {
        parse_number(&caps[1])
    } else {
        let caps = bare_number_re().captures(&text)?;
        let digits = &caps[1];
        // a lone "%" is often read as a trailing 9
        match digits.find('9') {
            Some(idx) if idx > 0 => parse_number(&digits[..idx]),
            _ => parse_number(digits),
        }
    };
    (value <= 100).then_some(value)
}

/// Turn counter. Literal states win over digits; common misreads of digits
/// as letters are mapped back before stripping.
pub fn parse_turn(text: &str) -> Turn {
    let lower = text.to_lowercase();
    if lower.contains("race day") {
        return Turn::RaceDay;
    }
    if lower.contains("goal") {
        return Turn::Goal;
    }
    let digits: String = text
        .chars()
        .map(|c| match c {
            'T' | 'I' => '1',
            'O' => '0',
            'S' => '5',
            other => other,
        })
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        Turn::Unknown
    } else {
        Turn::Remaining(parse_number(&digits))
    }
}

/// First vocabulary label found in the text, worst to best.
pub fn parse_mood(text: &str) -> Mood {
    let upper = text.to_uppercase();
    Mood::VOCABULARY
        .into_iter()
        .find(|m| upper.contains(m.label()))
        .unwrap_or(Mood::Unknown)
}

/// Enhanced capture + engine + parser. Never fails: an unavailable capture
/// or engine error reads as empty text.
pub struct TextRecognizer {
    engine: Box<dyn TextEngine>,
}

impl TextRecognizer {
    pub fn new(engine: Box<dyn TextEngine>) -> Self {
        Self { engine }
    }

    pub fn text(&self, device: &mut dyn Device, region: Region) -> String {
        let Some(image) = device.capture_enhanced(region) else {
            logger::debug_p("ocr", &format!("no capture for {:?}", region));
            return String::new();
        };
        match self.engine.read(&image) {
            Ok(text) => {
                let text = text.trim().to_string();
                logger::debug_p("ocr", &format!("{:?} -> {:?}", region, text));
                text
            }
            Err(e) => {
                logger::warn_p("ocr", &format!("{:#}", e));
                String::new()
            }
        }
    }

    pub fn number(&self, device: &mut dyn Device, region: Region) -> u32 {
        parse_number(&self.text(device, region))
    }

    pub fn failure(&self, device: &mut dyn Device, region: Region) -> Option<u32> {
        let text = self.text(device, region);
        let value = parse_failure(&text);
        if value.is_none() && !text.is_empty() {
            logger::debug_p("ocr", &format!("untrusted failure text {:?}", text));
        }
        value
    }

    pub fn turn(&self, device: &mut dyn Device, region: Region) -> Turn {
        parse_turn(&self.text(device, region))
    }

    pub fn mood(&self, device: &mut dyn Device, region: Region) -> Mood {
        parse_mood(&self.text(device, region))
    }
}
