//! Per-pixel Gaussian-mixture background model
//!
//! Each pixel carries a small bank of weighted Gaussian components over its
//! luma history. A new value matching one of the dominant components is
//! background; anything else is foreground and seeds a fresh low-weight
//! component. The learning rate is `1 / history`, bounding the statistical
//! weight of old frames.

use rayon::prelude::*;

/// Components per pixel
pub const GMM_COMPONENTS: usize = 3;

/// Match gate in standard deviations
const MATCH_SIGMA_SQ: f32 = 2.5 * 2.5;
/// Cumulative weight share considered background
const BACKGROUND_RATIO: f32 = 0.7;
/// Weight given to a freshly seeded component
const INITIAL_WEIGHT: f32 = 0.05;
/// Variance floor so a settled component never collapses to zero width
const MIN_VARIANCE: f32 = 4.0;

#[derive(Debug, Clone, Copy)]
struct Component {
    weight: f32,
    mean: f32,
    variance: f32,
}

#[derive(Debug, Clone, Copy)]
struct PixelModel {
    components: [Component; GMM_COMPONENTS],
}

impl PixelModel {
    fn seeded(value: f32, variance: f32) -> Self {
        let mut components = [Component {
            weight: 0.0,
            mean: 0.0,
            variance,
        }; GMM_COMPONENTS];
        components[0] = Component {
            weight: 1.0,
            mean: value,
            variance,
        };
        Self { components }
    }

    /// Classify `value` against the current mixture, then fold it in.
    /// Returns true when the pixel is foreground.
    fn observe(&mut self, value: f32, alpha: f32, seed_variance: f32) -> bool {
        // Background set: components ranked by weight/sigma until their
        // cumulative weight covers BACKGROUND_RATIO.
        let mut order = [0usize; GMM_COMPONENTS];
        for (i, slot) in order.iter_mut().enumerate() {
            *slot = i;
        }
        order.sort_by(|&a, &b| {
            let fa = self.components[a].weight / self.components[a].variance.sqrt();
            let fb = self.components[b].weight / self.components[b].variance.sqrt();
            fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut background = [false; GMM_COMPONENTS];
        let mut cumulative = 0.0f32;
        for &idx in &order {
            background[idx] = true;
            cumulative += self.components[idx].weight;
            if cumulative >= BACKGROUND_RATIO {
                break;
            }
        }

        // First matching component within the 2.5-sigma gate
        let mut matched: Option<usize> = None;
        for &idx in &order {
            let c = &self.components[idx];
            if c.weight <= 0.0 {
                continue;
            }
            let diff = value - c.mean;
            if diff * diff <= MATCH_SIGMA_SQ * c.variance {
                matched = Some(idx);
                break;
            }
        }

        let is_foreground = match matched {
            Some(idx) => !background[idx],
            None => true,
        };

        match matched {
            Some(m) => {
                for (i, c) in self.components.iter_mut().enumerate() {
                    let hit = if i == m { 1.0 } else { 0.0 };
                    c.weight += alpha * (hit - c.weight);
                }
                let c = &mut self.components[m];
                let diff = value - c.mean;
                c.mean += alpha * diff;
                c.variance = (c.variance + alpha * (diff * diff - c.variance)).max(MIN_VARIANCE);
            }
            None => {
                // Replace the weakest component with a fresh one centred on
                // the unexplained value.
                let weakest = self
                    .components
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        a.weight
                            .partial_cmp(&b.weight)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.components[weakest] = Component {
                    weight: INITIAL_WEIGHT,
                    mean: value,
                    variance: seed_variance,
                };
            }
        }

        // Renormalize weights
        let total: f32 = self.components.iter().map(|c| c.weight).sum();
        if total > 0.0 {
            for c in self.components.iter_mut() {
                c.weight /= total;
            }
        }

        is_foreground
    }
}

/// Adaptive background model over a whole preview frame
pub struct BackgroundModel {
    pixels: Vec<PixelModel>,
    dims: Option<(u32, u32)>,
    alpha: f32,
    seed_variance: f32,
}

impl BackgroundModel {
    /// `history` bounds the learning window in frames; `seed_variance` is the
    /// sensitivity knob (variance given to fresh components).
    pub fn new(history: u32, seed_variance: f32) -> Self {
        Self {
            pixels: Vec::new(),
            dims: None,
            alpha: 1.0 / history.max(1) as f32,
            seed_variance,
        }
    }

    /// Day/night sensitivity swap
    pub fn set_seed_variance(&mut self, variance: f32) {
        self.seed_variance = variance;
    }

    pub fn seed_variance(&self) -> f32 {
        self.seed_variance
    }

    /// Classify and update in one pass. Returns a 0/255 foreground mask the
    /// same size as the input. The first frame (or a resolution change)
    /// reseeds the model and reports no foreground.
    pub fn apply(&mut self, luma: &[u8], width: u32, height: u32) -> Vec<u8> {
        let expected = (width * height) as usize;
        debug_assert_eq!(luma.len(), expected);

        if self.dims != Some((width, height)) || self.pixels.len() != expected {
            self.pixels = luma
                .iter()
                .map(|&v| PixelModel::seeded(v as f32, self.seed_variance))
                .collect();
            self.dims = Some((width, height));
            return vec![0u8; expected];
        }

        let alpha = self.alpha;
        let seed_variance = self.seed_variance;
        self.pixels
            .par_iter_mut()
            .zip(luma.par_iter())
            .map(|(model, &value)| {
                if model.observe(value as f32, alpha, seed_variance) {
                    255u8
                } else {
                    0u8
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_is_all_background() {
        let mut model = BackgroundModel::new(200, 1500.0);
        let frame = vec![100u8; 16];
        let mask = model.apply(&frame, 4, 4);
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_static_scene_stays_background() {
        let mut model = BackgroundModel::new(200, 1500.0);
        let frame = vec![100u8; 64];
        for _ in 0..20 {
            let mask = model.apply(&frame, 8, 8);
            assert!(mask.iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_sudden_change_is_foreground() {
        let mut model = BackgroundModel::new(200, 100.0);
        let quiet = vec![100u8; 64];
        for _ in 0..30 {
            model.apply(&quiet, 8, 8);
        }

        let mut active = quiet.clone();
        for v in active.iter_mut().take(16) {
            *v = 250;
        }
        let mask = model.apply(&active, 8, 8);
        assert!(mask.iter().take(16).all(|&v| v == 255));
        assert!(mask.iter().skip(16).all(|&v| v == 0));
    }

    #[test]
    fn test_persistent_change_absorbed_into_background() {
        // With a short history the model adapts quickly; a once-novel value
        // that persists becomes the new background.
        let mut model = BackgroundModel::new(10, 100.0);
        let quiet = vec![100u8; 64];
        for _ in 0..20 {
            model.apply(&quiet, 8, 8);
        }

        let changed = vec![250u8; 64];
        let mut last = Vec::new();
        for _ in 0..60 {
            last = model.apply(&changed, 8, 8);
        }
        assert!(last.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_resolution_change_reseeds() {
        let mut model = BackgroundModel::new(200, 1500.0);
        model.apply(&vec![100u8; 64], 8, 8);
        let mask = model.apply(&vec![200u8; 16], 4, 4);
        assert!(mask.iter().all(|&v| v == 0));
    }
}
