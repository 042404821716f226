//! Template matching by normalized cross-correlation (zero-mean, summed over
//! RGB channels), with optional search-frame downscaling, polling, and two
//! duplicate-suppression strategies.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rayon::prelude::*;

use crate::logger;
use crate::platform::Device;
use crate::types::*;

/// Default minimum center distance between kept candidates.
pub const MIN_CENTER_DISTANCE: i32 = 5;
/// Default IoU above which two counted occurrences are the same icon.
pub const OVERLAP_THRESHOLD: f32 = 0.3;
/// Default cap on counted occurrences.
pub const MAX_MATCHES: usize = 10;
/// Default delay between polling attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest template side kept at the coarse level.
const COARSE_MIN_SIDE: u32 = 12;
const MAX_COARSE_FACTOR: u32 = 8;
/// Coarse placements within this much of the threshold are re-scored.
const COARSE_MARGIN: f32 = 0.3;
/// Best coarse placements always re-scored, whatever their score.
const COARSE_TOP: usize = 8;

/// Reference image, pre-centered for correlation.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    width: u32,
    height: u32,
    /// Interleaved RGB values minus the per-channel mean.
    centered: Vec<f32>,
    norm_sq: f64,
    /// Same template shrunk by `factor`, for the coarse pass.
    coarse: Option<Arc<Template>>,
    factor: u32,
}

/// Largest power of two the template can shrink by and keep
/// `COARSE_MIN_SIDE` pixels on its short side.
fn coarse_factor(width: u32, height: u32) -> u32 {
    let side = width.min(height);
    let mut k = 1;
    while k * 2 <= MAX_COARSE_FACTOR && side / (k * 2) >= COARSE_MIN_SIDE {
        k *= 2;
    }
    k
}

impl Template {
    pub fn from_rgb(name: &str, image: &RgbImage) -> Result<Self> {
        let mut template = Self::centered(name, image)?;
        let k = coarse_factor(template.width, template.height);
        if k > 1 {
            let small = imageops::resize(image, template.width / k, template.height / k, FilterType::Triangle);
            // a template that loses its contrast when shrunk is matched exhaustively
            template.coarse = Self::centered(name, &small).ok().map(Arc::new);
            template.factor = if template.coarse.is_some() { k } else { 1 };
        }
        Ok(template)
    }

    fn centered(name: &str, image: &RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("template {} is empty", name);
        }
        let n = (width * height) as f64;
        let mut means = [0f64; 3];
        for p in image.pixels() {
            for c in 0..3 {
                means[c] += p[c] as f64;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut centered = Vec::with_capacity(image.as_raw().len());
        let mut norm_sq = 0f64;
        for p in image.pixels() {
            for c in 0..3 {
                let v = p[c] as f64 - means[c];
                norm_sq += v * v;
                centered.push(v as f32);
            }
        }
        if norm_sq <= f64::EPSILON {
            bail!("template {} has no contrast", name);
        }
        Ok(Self { name: name.to_string(), width, height, centered, norm_sq, coarse: None, factor: 1 })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("loading template {}", path.display()))?
            .to_rgb8();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_rgb(&name, &image)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Visual variants of one logical UI element, tried in order.
#[derive(Debug, Clone, Default)]
pub struct TemplateChain {
    pub name: String,
    pub variants: Vec<Arc<Template>>,
}

impl TemplateChain {
    pub fn new(name: &str, variants: Vec<Template>) -> Self {
        Self { name: name.to_string(), variants: variants.into_iter().map(Arc::new).collect() }
    }

    pub fn single(template: Template) -> Self {
        Self { name: template.name.clone(), variants: vec![Arc::new(template)] }
    }

    pub fn first(&self) -> Option<&Template> {
        self.variants.first().map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Correlation score for every placement of a template in a search image.
pub struct ScoreMap {
    pub width: u32,
    pub height: u32,
    pub scores: Vec<f32>,
}

impl ScoreMap {
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.scores[(y * self.width + x) as usize]
    }

    /// Every placement scoring at least `threshold`.
    pub fn peaks(&self, threshold: f32) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
        self.scores
            .iter()
            .enumerate()
            .filter(move |(_, s)| **s >= threshold)
            .map(move |(i, s)| (i as u32 % self.width, i as u32 / self.width, *s))
    }

    pub fn best(&self) -> Option<(u32, u32, f32)> {
        self.scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, s)| (i as u32 % self.width, i as u32 / self.width, *s))
    }
}

/// Summed-area tables: one per channel, plus squares summed over channels.
struct Integral {
    stride: usize,
    sums: [Vec<u64>; 3],
    squares: Vec<u64>,
}

impl Integral {
    fn new(image: &RgbImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = [vec![0u64; stride * (h + 1)], vec![0u64; stride * (h + 1)], vec![0u64; stride * (h + 1)]];
        let mut squares = vec![0u64; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row = [0u64; 3];
            let mut row_sq = 0u64;
            for x in 0..w {
                let base = (y * w + x) * 3;
                for c in 0..3 {
                    let v = raw[base + c] as u64;
                    row[c] += v;
                    row_sq += v * v;
                }
                let at = (y + 1) * stride + x + 1;
                let above = y * stride + x + 1;
                for c in 0..3 {
                    sums[c][at] = sums[c][above] + row[c];
                }
                squares[at] = squares[above] + row_sq;
            }
        }
        Self { stride, sums, squares }
    }

    fn rect(&self, table: &[u64], x: usize, y: usize, w: usize, h: usize) -> u64 {
        let s = self.stride;
        (table[(y + h) * s + x + w] + table[y * s + x]) - (table[y * s + x + w] + table[(y + h) * s + x])
    }
}

/// Score of `template` with its top-left corner at (u, v).
fn score_at(raw: &[u8], iw: usize, integral: &Integral, template: &Template, u: usize, v: usize) -> f32 {
    let (tw, th) = (template.width as usize, template.height as usize);
    let row_len = tw * 3;
    let mut num = 0f64;
    for ty in 0..th {
        let start = ((v + ty) * iw + u) * 3;
        let window = &raw[start..start + row_len];
        let tmpl = &template.centered[ty * row_len..(ty + 1) * row_len];
        let partial: f32 = tmpl.iter().zip(window).map(|(t, &p)| t * p as f32).sum();
        num += partial as f64;
    }

    let n = (tw * th) as f64;
    let mut var = integral.rect(&integral.squares, u, v, tw, th) as f64;
    for c in 0..3 {
        let s = integral.rect(&integral.sums[c], u, v, tw, th) as f64;
        var -= s * s / n;
    }
    if var <= 1e-6 {
        return 0.0;
    }
    (num / (var * template.norm_sq).sqrt()).clamp(-1.0, 1.0) as f32
}

/// Zero-mean normalized cross-correlation of `template` at every placement.
/// `None` when the search image is smaller than the template.
pub fn score_map(image: &RgbImage, template: &Template) -> Option<ScoreMap> {
    let (iw, ih) = (image.width() as usize, image.height() as usize);
    let (tw, th) = (template.width as usize, template.height as usize);
    if iw < tw || ih < th {
        return None;
    }
    let out_w = iw - tw + 1;
    let out_h = ih - th + 1;
    let integral = Integral::new(image);
    let raw = image.as_raw();

    let rows: Vec<Vec<f32>> = (0..out_h)
        .into_par_iter()
        .map(|v| (0..out_w).map(|u| score_at(raw, iw, &integral, template, u, v)).collect())
        .collect();

    Some(ScoreMap { width: out_w as u32, height: out_h as u32, scores: rows.concat() })
}

/// Coarse-to-fine variant of `score_map`. The shrunk template is matched on
/// the shrunk image first; only placements near the best coarse scores, or
/// near any coarse score at or above `cutoff`, are scored at full
/// resolution. Every other placement reads -1.
pub fn refined_score_map(image: &RgbImage, template: &Template, cutoff: f32) -> Option<ScoreMap> {
    let Some(coarse_template) = template.coarse.as_deref() else {
        return score_map(image, template);
    };
    let (iw, ih) = image.dimensions();
    if iw < template.width || ih < template.height {
        return None;
    }
    let k = template.factor;
    let small = imageops::resize(image, (iw / k).max(1), (ih / k).max(1), FilterType::Triangle);
    let Some(coarse) = score_map(&small, coarse_template) else {
        return score_map(image, template);
    };

    let mut order: Vec<usize> = (0..coarse.scores.len()).collect();
    let top = COARSE_TOP.min(order.len());
    if top > 0 && top < order.len() {
        order.select_nth_unstable_by(top - 1, |a, b| coarse.scores[*b].total_cmp(&coarse.scores[*a]));
    }
    let seeds = order[..top]
        .iter()
        .copied()
        .chain((0..coarse.scores.len()).filter(|i| coarse.scores[*i] >= cutoff));

    let out_w = (iw - template.width + 1) as usize;
    let out_h = (ih - template.height + 1) as usize;
    let reach = k as usize;
    let mut wanted = vec![false; out_w * out_h];
    for i in seeds {
        let cx = (i % coarse.width as usize) * reach;
        let cy = (i / coarse.width as usize) * reach;
        for y in cy.saturating_sub(reach)..=(cy + reach).min(out_h - 1) {
            for x in cx.saturating_sub(reach)..=(cx + reach).min(out_w - 1) {
                wanted[y * out_w + x] = true;
            }
        }
    }

    let integral = Integral::new(image);
    let raw = image.as_raw();
    let placements: Vec<usize> = (0..wanted.len()).filter(|i| wanted[*i]).collect();
    let scored: Vec<(usize, f32)> = placements
        .par_iter()
        .map(|&i| (i, score_at(raw, iw as usize, &integral, template, i % out_w, i / out_w)))
        .collect();

    let mut scores = vec![-1.0f32; out_w * out_h];
    for (i, score) in scored {
        scores[i] = score;
    }
    Some(ScoreMap { width: out_w as u32, height: out_h as u32, scores })
}

/// Greedy suppression by center distance: candidates are taken in
/// descending score and kept only if every kept center is farther than
/// `min_distance` on at least one axis.
pub fn dedup_by_center(mut candidates: Vec<MatchCandidate>, min_distance: i32) -> Vec<MatchCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<MatchCandidate> = Vec::new();
    for c in candidates {
        let center = c.center();
        let clear = kept.iter().all(|k| {
            let kc = k.center();
            (center.x - kc.x).abs() > min_distance || (center.y - kc.y).abs() > min_distance
        });
        if clear {
            kept.push(c);
        }
    }
    kept
}

pub fn iou(a: &MatchCandidate, b: &MatchCandidate) -> f32 {
    let left = a.x.max(b.x) as i64;
    let top = a.y.max(b.y) as i64;
    let right = (a.x + a.width as i32).min(b.x + b.width as i32) as i64;
    let bottom = (a.y + a.height as i32).min(b.y + b.height as i32) as i64;
    if right <= left || bottom <= top {
        return 0.0;
    }
    let inter = (right - left) * (bottom - top);
    let union = a.width as i64 * a.height as i64 + b.width as i64 * b.height as i64 - inter;
    if union <= 0 {
        0.0
    } else {
        inter as f32 / union as f32
    }
}

/// Greedy non-maximum suppression by IoU.
pub fn suppress_overlaps(mut candidates: Vec<MatchCandidate>, overlap: f32) -> Vec<MatchCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<MatchCandidate> = Vec::new();
    for c in candidates {
        if kept.iter().all(|k| iou(&c, k) <= overlap) {
            kept.push(c);
        }
    }
    kept
}

#[derive(Debug, Clone)]
pub struct Matcher {
    /// Downscale applied to the search frame only, in (0, 1].
    pub scale: f32,
    pub min_distance: i32,
    pub overlap: f32,
    pub max_matches: usize,
    pub poll_interval: Duration,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Matcher {
    pub fn new(scale: f32) -> Self {
        Self {
            scale: scale.clamp(0.1, 1.0),
            min_distance: MIN_CENTER_DISTANCE,
            overlap: OVERLAP_THRESHOLD,
            max_matches: MAX_MATCHES,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Score map on the (possibly downscaled) frame, plus the factor that
    /// maps its coordinates back to the frame.
    fn scores(&self, frame: &Frame, template: &Template, threshold: f32) -> Option<(ScoreMap, f32)> {
        let search: Cow<'_, Frame> = if self.scale < 1.0 {
            Cow::Owned(frame.scaled(self.scale))
        } else {
            Cow::Borrowed(frame)
        };
        let map = refined_score_map(search.image(), template, threshold - COARSE_MARGIN)?;
        let back = frame.width() as f32 / search.width() as f32;
        Some((map, back))
    }

    fn candidate(template: &Template, x: u32, y: u32, score: f32, back: f32) -> MatchCandidate {
        MatchCandidate {
            x: (x as f32 * back) as i32,
            y: (y as f32 * back) as i32,
            width: (template.width as f32 * back).round() as u32,
            height: (template.height as f32 * back).round() as u32,
            score,
        }
    }

    fn raw_candidates(&self, frame: &Frame, template: &Template, threshold: f32) -> Vec<MatchCandidate> {
        let Some((map, back)) = self.scores(frame, template, threshold) else { return Vec::new() };
        map.peaks(threshold)
            .map(|(x, y, s)| Self::candidate(template, x, y, s, back))
            .collect()
    }

    /// All occurrences at or above `threshold`, one per element (center dedup).
    pub fn find_all(&self, frame: &Frame, template: &Template, threshold: f32) -> Vec<MatchCandidate> {
        dedup_by_center(self.raw_candidates(frame, template, threshold), self.min_distance)
    }

    /// Highest-scoring placement, if it reaches `threshold`.
    pub fn find_best(&self, frame: &Frame, template: &Template, threshold: f32) -> Option<MatchCandidate> {
        let (map, back) = self.scores(frame, template, threshold)?;
        let (x, y, score) = map.best()?;
        if score >= threshold {
            Some(Self::candidate(template, x, y, score, back))
        } else {
            logger::debug_p("match", &format!("{}: best {:.3} < {:.2}", template.name, score, threshold));
            None
        }
    }

    /// First variant of `chain` that matches.
    pub fn find_first(&self, frame: &Frame, chain: &TemplateChain, threshold: f32) -> Option<MatchCandidate> {
        chain.variants.iter().find_map(|t| self.find_best(frame, t, threshold))
    }

    /// Occurrences for counting: IoU suppression, capped at `max_matches`.
    pub fn find_counted(&self, frame: &Frame, template: &Template, threshold: f32) -> Vec<MatchCandidate> {
        let mut kept = suppress_overlaps(self.raw_candidates(frame, template, threshold), self.overlap);
        kept.truncate(self.max_matches);
        kept
    }

    /// Re-run `attempt` every `poll_interval` until it yields or `budget`
    /// runs out. Always makes at least one attempt.
    fn poll<T>(&self, budget: Duration, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + budget;
        loop {
            if let Some(found) = attempt() {
                return Some(found);
            }
            if Instant::now() + self.poll_interval > deadline {
                return None;
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Locate the first matching variant of `chain` on fresh captures.
    /// `None` on budget exhaustion is a normal "not present" answer.
    pub fn locate(
        &self,
        device: &mut dyn Device,
        chain: &TemplateChain,
        region: Option<Region>,
        threshold: f32,
        budget: Duration,
    ) -> Option<MatchCandidate> {
        if chain.is_empty() {
            return None;
        }
        let (dx, dy) = region.map_or((0, 0), |r| (r.x as i32, r.y as i32));
        let found = self.poll(budget, || {
            let frame = device.capture(region)?;
            self.find_first(&frame, chain, threshold)
        });
        match found {
            Some(m) => {
                logger::debug_p("match", &format!("{} at {:?} ({:.3})", chain.name, m.center(), m.score));
                Some(m.translated(dx, dy))
            }
            None => None,
        }
    }

    /// Every occurrence of `template` (IoU-suppressed, capped) on the first
    /// capture that shows any.
    pub fn locate_all(
        &self,
        device: &mut dyn Device,
        template: &Template,
        region: Option<Region>,
        threshold: f32,
        budget: Duration,
    ) -> Vec<MatchCandidate> {
        let (dx, dy) = region.map_or((0, 0), |r| (r.x as i32, r.y as i32));
        self.poll(budget, || {
            let frame = device.capture(region)?;
            let found = self.find_counted(&frame, template, threshold);
            (!found.is_empty()).then_some(found)
        })
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.translated(dx, dy))
        .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::platform::stub::StubDevice;
    use image::imageops::{self, FilterType};
    use image::Rgb;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Deterministic blocky noise so correlation peaks are sharp.
    pub(crate) fn noise(width: u32, height: u32, block: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let bw = width.div_ceil(block);
        let bh = height.div_ceil(block);
        let colors: Vec<[u8; 3]> = (0..bw * bh).map(|_| rng.gen()).collect();
        RgbImage::from_fn(width, height, |x, y| Rgb(colors[((y / block) * bw + x / block) as usize]))
    }

    pub(crate) fn paste(dst: &mut RgbImage, src: &RgbImage, x: u32, y: u32) {
        imageops::replace(dst, src, x as i64, y as i64);
    }

    fn cand(x: i32, y: i32, score: f32) -> MatchCandidate {
        MatchCandidate { x, y, width: 10, height: 10, score }
    }

    #[test]
    fn exact_patch_scores_one() {
        let img = noise(80, 60, 2, 1);
        let patch = imageops::crop_imm(&img, 37, 21, 12, 10).to_image();
        let t = Template::from_rgb("patch", &patch).unwrap();
        let m = Matcher::default().find_best(&Frame::from_rgb(img), &t, 0.9).unwrap();
        assert_eq!((m.x, m.y), (37, 21));
        assert!(m.score > 0.999);
    }

    #[test]
    fn score_ignores_brightness_and_contrast() {
        let img = noise(40, 40, 2, 2);
        let patch = imageops::crop_imm(&img, 5, 9, 10, 10).to_image();
        let dimmed = RgbImage::from_fn(10, 10, |x, y| {
            let p = patch.get_pixel(x, y);
            Rgb([p[0] / 2 + 20, p[1] / 2 + 20, p[2] / 2 + 20])
        });
        let t = Template::from_rgb("dim", &dimmed).unwrap();
        let map = score_map(&img, &t).unwrap();
        assert!(map.at(5, 9) > 0.99);
    }

    #[test]
    fn flat_template_is_rejected() {
        let flat = RgbImage::from_pixel(5, 5, Rgb([9, 9, 9]));
        assert!(Template::from_rgb("flat", &flat).is_err());
    }

    #[test]
    fn template_larger_than_frame_finds_nothing() {
        let t = Template::from_rgb("big", &noise(20, 20, 1, 3)).unwrap();
        let frame = Frame::from_rgb(noise(10, 30, 1, 4));
        assert!(Matcher::default().find_all(&frame, &t, 0.1).is_empty());
    }

    #[test]
    fn counts_repeated_icons_once_each() {
        let icon = noise(8, 8, 1, 5);
        let mut img = RgbImage::from_pixel(60, 60, Rgb([30, 30, 30]));
        for (x, y) in [(2, 2), (30, 5), (12, 40)] {
            paste(&mut img, &icon, x, y);
        }
        let t = Template::from_rgb("icon", &icon).unwrap();
        let frame = Frame::from_rgb(img);
        let m = Matcher::default();
        assert_eq!(m.find_counted(&frame, &t, 0.9).len(), 3);
        assert_eq!(m.find_all(&frame, &t, 0.9).len(), 3);
    }

    #[test]
    fn count_is_capped() {
        let icon = noise(4, 4, 1, 6);
        let mut img = RgbImage::from_pixel(80, 8, Rgb([0, 0, 0]));
        for i in 0..15 {
            paste(&mut img, &icon, i * 5, 2);
        }
        let t = Template::from_rgb("icon", &icon).unwrap();
        let mut m = Matcher::default();
        m.max_matches = 4;
        assert_eq!(m.find_counted(&Frame::from_rgb(img), &t, 0.95).len(), 4);
    }

    #[test]
    fn downscaled_search_maps_back_to_frame() {
        let small = noise(60, 40, 3, 7);
        let big = imageops::resize(&small, 120, 80, FilterType::Nearest);
        let patch = imageops::crop_imm(&small, 21, 12, 15, 12).to_image();
        let t = Template::from_rgb("patch", &patch).unwrap();
        let m = Matcher::new(0.5).find_best(&Frame::from_rgb(big), &t, 0.7).unwrap();
        assert!((m.x - 42).abs() <= 2 && (m.y - 24).abs() <= 2, "{:?}", m);
        assert_eq!((m.width, m.height), (30, 24));
    }

    #[test]
    fn locate_offsets_region_and_falls_back_to_variants() {
        let img = noise(100, 100, 2, 8);
        let present = Template::from_rgb("btn_2", &imageops::crop_imm(&img, 60, 70, 10, 10).to_image()).unwrap();
        let absent = Template::from_rgb("btn", &noise(10, 10, 1, 99)).unwrap();
        let chain = TemplateChain::new("btn", vec![absent, present]);
        let mut dev = StubDevice::new(vec![Frame::from_rgb(img)]);

        let m = Matcher::default()
            .locate(&mut dev, &chain, Some(Region::new(50, 50, 50, 50)), 0.9, Duration::ZERO)
            .unwrap();
        assert_eq!((m.x, m.y), (60, 70));
        assert_eq!(m.center(), Point::new(65, 75));
    }

    #[test]
    fn locate_gives_up_after_budget() {
        let chain = TemplateChain::single(Template::from_rgb("gone", &noise(6, 6, 1, 10)).unwrap());
        let mut dev = StubDevice::blank(50, 50);
        let started = Instant::now();
        let found = Matcher::default().locate(&mut dev, &chain, None, 0.8, Duration::from_millis(120));
        assert!(found.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn locate_all_translates_every_hit() {
        let icon = noise(6, 6, 1, 11);
        let mut img = RgbImage::from_pixel(40, 40, Rgb([200, 200, 200]));
        paste(&mut img, &icon, 22, 24);
        paste(&mut img, &icon, 30, 31);
        let t = Template::from_rgb("icon", &icon).unwrap();
        let mut dev = StubDevice::new(vec![Frame::from_rgb(img)]);
        let mut hits = Matcher::default().locate_all(&mut dev, &t, Some(Region::new(20, 20, 20, 20)), 0.9, Duration::ZERO);
        hits.sort_by_key(|m| m.x);
        assert_eq!(hits.iter().map(|m| (m.x, m.y)).collect::<Vec<_>>(), vec![(22, 24), (30, 31)]);
    }

    #[test]
    fn large_template_on_full_frame_is_found_quickly() {
        let img = noise(576, 1024, 8, 12);
        let patch = imageops::crop_imm(&img, 203, 517, 60, 60).to_image();
        let t = Template::from_rgb("portrait", &patch).unwrap();
        assert_eq!(t.factor, 4);

        let started = Instant::now();
        let m = Matcher::default().find_best(&Frame::from_rgb(img), &t, 0.8).unwrap();
        assert_eq!((m.x, m.y), (203, 517));
        assert!(m.score > 0.999);
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
    }

    #[test]
    fn coarse_pass_still_counts_every_icon() {
        let icon = noise(32, 32, 4, 13);
        let mut img = RgbImage::from_pixel(200, 160, Rgb([90, 90, 90]));
        for (x, y) in [(17, 9), (101, 40), (150, 111)] {
            paste(&mut img, &icon, x, y);
        }
        let t = Template::from_rgb("icon", &icon).unwrap();
        assert_eq!(t.factor, 2);
        let mut hits = Matcher::default().find_counted(&Frame::from_rgb(img), &t, 0.9);
        hits.sort_by_key(|m| m.x);
        assert_eq!(hits.iter().map(|m| (m.x, m.y)).collect::<Vec<_>>(), vec![(17, 9), (101, 40), (150, 111)]);
    }

    #[test]
    fn small_templates_are_matched_exhaustively() {
        assert_eq!(coarse_factor(23, 40), 1);
        assert_eq!(coarse_factor(24, 24), 2);
        assert_eq!(coarse_factor(200, 120), 8);
    }

    #[test]
    fn overlap_suppression_keeps_best() {
        let kept = suppress_overlaps(vec![cand(0, 0, 0.8), cand(2, 1, 0.95), cand(40, 40, 0.7)], 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].x, kept[0].y), (2, 1));
        assert!((iou(&cand(0, 0, 1.0), &cand(0, 0, 1.0)) - 1.0).abs() < f32::EPSILON);
        assert_eq!(iou(&cand(0, 0, 1.0), &cand(10, 0, 1.0)), 0.0);
    }

    proptest! {
        #[test]
        fn dedup_leaves_no_close_centers(
            raw in prop::collection::vec((0i32..60, 0i32..60, 0.0f32..1.0), 0..40),
            min_distance in 0i32..8,
        ) {
            let cands: Vec<_> = raw.into_iter().map(|(x, y, s)| cand(x, y, s)).collect();
            let kept = dedup_by_center(cands.clone(), min_distance);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    let (ca, cb) = (a.center(), b.center());
                    prop_assert!((ca.x - cb.x).abs() > min_distance || (ca.y - cb.y).abs() > min_distance);
                }
            }
            // the best candidate always survives
            if let Some(best) = cands.iter().max_by(|a, b| a.score.total_cmp(&b.score)) {
                prop_assert_eq!(kept[0].score, best.score);
            }
        }
    }
}
