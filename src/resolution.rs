use serde::Serialize;

/// Shells below this index count as fully correlated when searching for a
/// threshold crossing.
pub const FIRST_SEARCHED_SHELL: usize = 3;

/// Conventional FSC threshold for half maps.
pub const DEFAULT_THRESHOLD: f64 = 0.143;

/// A per-shell curve: FSC, directional FSC or occupancy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellCurve {
    /// Spatial frequency of each shell (1/Å)
    pub frequencies: Vec<f64>,
    pub values: Vec<f64>,
}

impl ShellCurve {
    pub fn new(frequencies: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(frequencies.len(), values.len());
        Self {
            frequencies,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value used by the crossing search, the first shells read as 1.
    #[inline]
    fn searched_value(&self, shell: usize) -> f64 {
        if shell < FIRST_SEARCHED_SHELL {
            1.0
        } else {
            self.values[shell]
        }
    }

    /// Interpolated frequency at which the curve first drops to `threshold`.
    ///
    /// The frequency is interpolated linearly against the curve value between
    /// the crossing shell and its predecessor.
    pub fn resolution_at(&self, threshold: f64) -> ResolutionEstimate {
        for shell in FIRST_SEARCHED_SHELL..self.len() {
            let value = self.values[shell];
            if value > threshold || value.is_nan() {
                continue;
            }
            let previous = self.searched_value(shell - 1);
            let slope =
                (self.frequencies[shell] - self.frequencies[shell - 1]) / (value - previous);
            let frequency = self.frequencies[shell] + slope * (threshold - value);
            return ResolutionEstimate::Resolved { frequency, shell };
        }

        ResolutionEstimate::NotResolved {
            limit_frequency: self.frequencies.last().copied().unwrap_or(0.0),
        }
    }
}

/// Outcome of a threshold search on a [`ShellCurve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionEstimate {
    /// The curve crossed the threshold at `shell`; `frequency` is interpolated (1/Å).
    Resolved { frequency: f64, shell: usize },
    /// The curve never reached the threshold up to `limit_frequency`.
    NotResolved { limit_frequency: f64 },
}

impl ResolutionEstimate {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Interpolated crossing frequency (1/Å)
    pub fn frequency(&self) -> Option<f64> {
        match self {
            Self::Resolved { frequency, .. } => Some(*frequency),
            Self::NotResolved { .. } => None,
        }
    }

    /// Resolution in Å
    pub fn resolution(&self) -> Option<f64> {
        self.frequency().map(f64::recip)
    }

    /// Highest frequency the estimate vouches for: the crossing, or the last
    /// analysed shell when the curve never dropped.
    pub fn limit_frequency(&self) -> f64 {
        match self {
            Self::Resolved { frequency, .. } => *frequency,
            Self::NotResolved { limit_frequency } => *limit_frequency,
        }
    }
}

impl std::fmt::Display for ResolutionEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved { frequency, .. } => write!(f, "{:.3} Å", frequency.recip()),
            Self::NotResolved { limit_frequency } => {
                write!(
                    f,
                    "not resolved (better than {:.3} Å)",
                    limit_frequency.recip()
                )
            }
        }
    }
}
