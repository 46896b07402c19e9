use std::time::Duration;

/// Keys shown on one page.
pub const PER_PAGE: usize = 4;

/// Rewards at or above this count as successes for the Beta update.
pub const REWARD_THRESHOLD: f64 = 0.5;

/// Points sampled over [0, 1] for each Beta density curve.
pub const DENSITY_SAMPLES: usize = 500;

pub const LIVE_REFRESH: Duration = Duration::from_secs(3);

pub const BAYES_LOG: &str = "priors_log_bayes.csv";
pub const EMA_LOG: &str = "priors_log_ema.csv";
pub const SNAPSHOT_OUTPUT: &str = "combined_page.png";
pub const FIRST_PRIOR_OUTPUT: &str = "first_old_prior.csv";

pub const SNAPSHOT_DPI: u32 = 150;
pub const VIEWER_DPI: u32 = 100;

/// Figure size used when `--figsize` cannot be parsed.
pub const FALLBACK_FIGSIZE: FigSize = FigSize {
    width: 8.0,
    height: 3.0,
};

pub const VIEWER_FIGSIZE: FigSize = FigSize {
    width: 12.0,
    height: 8.0,
};

/// Figure size in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigSize {
    pub width: f64,
    pub height: f64,
}

impl FigSize {
    /// Parses `"w,h"`. Anything else falls back to [`FALLBACK_FIGSIZE`].
    pub fn parse_or_fallback(s: &str) -> Self {
        match Self::parse(s) {
            Some(size) => size,
            None => {
                log::warn!("Invalid figsize {:?}, using {}x{}", s, FALLBACK_FIGSIZE.width, FALLBACK_FIGSIZE.height);
                FALLBACK_FIGSIZE
            }
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once(',')?;
        let width: f64 = w.trim().parse().ok()?;
        let height: f64 = h.trim().parse().ok()?;
        if width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite() {
            Some(FigSize { width, height })
        } else {
            None
        }
    }

    pub fn pixels(&self, dpi: u32) -> (u32, u32) {
        let w = (self.width * dpi as f64).round().max(1.0) as u32;
        let h = (self.height * dpi as f64).round().max(1.0) as u32;
        (w, h)
    }
}

/// Parses a single-byte CSV delimiter; `\t` and `tab` mean a tab.
pub fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!("delimiter must be a single ASCII character, got {:?}", s)),
    }
}
