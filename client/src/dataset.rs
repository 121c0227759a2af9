use std::{
    error::Error,
    fmt::{self, Display},
    fs, io,
    path::{Path, PathBuf},
};

use comms::ClientId;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::StandardNormal;

/// Seeds the linear relation every synthetic partition is drawn from.
const SYNTHETIC_SEED: u64 = 0x5eed;

/// Standard deviation of the noise added to synthetic targets.
const SYNTHETIC_NOISE: f32 = 0.1;

/// Errors loading a local dataset.
#[derive(Debug)]
pub enum DatasetErr {
    Io { path: PathBuf, source: io::Error },
    Parse { line: usize, reason: String },
    /// Features and targets don't line up.
    Shape(String),
}

impl Display for DatasetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse { line, reason } => write!(f, "line {line}: {reason}"),
            Self::Shape(reason) => write!(f, "invalid dataset shape: {reason}"),
        }
    }
}

impl Error for DatasetErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A client's private tabular data: one row of features per sample and a scalar target.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array1<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The `samples x features` inputs.
    /// * `y` - One target per sample.
    pub fn new(x: Array2<f32>, y: Array1<f32>) -> Result<Self, DatasetErr> {
        if x.nrows() != y.len() {
            return Err(DatasetErr::Shape(format!(
                "{} rows of features but {} targets",
                x.nrows(),
                y.len()
            )));
        }

        Ok(Self { x, y })
    }

    /// Reads a CSV file where every column but the last is a feature and the last is the target.
    ///
    /// A leading non numeric line is taken as a header and skipped.
    pub fn from_csv(path: &Path) -> Result<Self, DatasetErr> {
        let raw = fs::read_to_string(path).map_err(|source| DatasetErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse_csv(&raw)
    }

    pub fn parse_csv(raw: &str) -> Result<Self, DatasetErr> {
        let mut width = None;
        let mut header_skipped = false;
        let mut features = Vec::new();
        let mut targets = Vec::new();

        for (i, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed: Result<Vec<f32>, _> =
                line.split(',').map(|cell| cell.trim().parse::<f32>()).collect();

            let values = match parsed {
                Ok(values) => values,
                Err(_) if width.is_none() && !header_skipped => {
                    header_skipped = true;
                    continue;
                }
                Err(e) => {
                    return Err(DatasetErr::Parse {
                        line: i + 1,
                        reason: e.to_string(),
                    });
                }
            };

            if values.len() < 2 {
                return Err(DatasetErr::Parse {
                    line: i + 1,
                    reason: "expected at least one feature and a target".into(),
                });
            }

            match width {
                None => width = Some(values.len()),
                Some(width) if width != values.len() => {
                    return Err(DatasetErr::Parse {
                        line: i + 1,
                        reason: format!("expected {width} columns, got {}", values.len()),
                    });
                }
                Some(_) => {}
            }

            let (x, y) = values.split_at(values.len() - 1);
            features.extend_from_slice(x);
            targets.push(y[0]);
        }

        let Some(width) = width else {
            return Err(DatasetErr::Shape("no samples".into()));
        };

        let x = Array2::from_shape_vec((targets.len(), width - 1), features)
            .map_err(|e| DatasetErr::Shape(e.to_string()))?;

        Self::new(x, Array1::from(targets))
    }

    /// Draws a client's partition of a synthetic linear regression problem.
    ///
    /// Every client shares the same underlying relation, but the samples are seeded by `client_id`.
    ///
    /// # Arguments
    /// * `client_id` - The client whose partition to draw.
    /// * `samples` - The amount of rows.
    /// * `features` - The amount of feature columns.
    pub fn synthetic(client_id: ClientId, samples: usize, features: usize) -> Self {
        let mut shared = StdRng::seed_from_u64(SYNTHETIC_SEED);
        let coef: Array1<f32> =
            Array1::from_shape_simple_fn(features, || shared.random_range(-1.0..=1.0));
        let bias: f32 = shared.random_range(-1.0..=1.0);

        let mut rng = StdRng::seed_from_u64(client_id);
        let x = Array2::from_shape_simple_fn((samples, features), || {
            rng.sample::<f32, _>(StandardNormal)
        });

        let noise =
            Array1::from_shape_simple_fn(samples, || rng.sample::<f32, _>(StandardNormal));
        let y = x.dot(&coef) + bias + noise * SYNTHETIC_NOISE;

        Self { x, y }
    }

    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f32> {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn features(&self) -> usize {
        self.x.ncols()
    }

    /// A new dataset made of the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Shuffles the rows and splits them into a train and a validation set.
    ///
    /// The validation set takes `ceil(len * validation)` rows, but the train set always keeps at least one.
    pub fn split<R: Rng>(&self, validation: f32, rng: &mut R) -> (Self, Self) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);

        let n_val = ((self.len() as f32 * validation).ceil() as usize)
            .min(self.len().saturating_sub(1));
        let (val, train) = indices.split_at(n_val);

        (self.select(train), self.select(val))
    }
}
