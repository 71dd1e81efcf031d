use thiserror::Error;

#[derive(Error, Debug)]
pub enum IchnosError {
    #[error("Trajectories and footprints must align: {trajectories} trajectories, {footprints} footprint sequences")]
    MismatchedLengths {
        trajectories: usize,
        footprints: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("No valid variable left after filtering: {0}")]
    NoValidVariables(String),

    #[error("Not enough trackways: {required} required, {found} available")]
    NotEnoughTrackways { required: usize, found: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid trackway: {0}")]
    InvalidTrackway(String),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Gaussian noise generation failed: {0:?}")]
    NoiseGenerationError(rand_distr::NormalError),

    #[error("Unable to write table: {0}")]
    CsvError(#[from] csv::Error),
}

impl From<rand_distr::NormalError> for IchnosError {
    fn from(err: rand_distr::NormalError) -> Self {
        IchnosError::NoiseGenerationError(err)
    }
}

impl PartialEq for IchnosError {
    fn eq(&self, other: &Self) -> bool {
        use IchnosError::*;
        match (self, other) {
            (
                MismatchedLengths {
                    trajectories: a,
                    footprints: b,
                },
                MismatchedLengths {
                    trajectories: c,
                    footprints: d,
                },
            ) => a == c && b == d,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (UnknownVariable(a), UnknownVariable(b)) => a == b,
            (NoValidVariables(a), NoValidVariables(b)) => a == b,
            (
                NotEnoughTrackways {
                    required: a,
                    found: b,
                },
                NotEnoughTrackways {
                    required: c,
                    found: d,
                },
            ) => a == c && b == d,
            (ShapeMismatch(a), ShapeMismatch(b)) => a == b,
            (InvalidRegion(a), InvalidRegion(b)) => a == b,
            (InvalidTrackway(a), InvalidTrackway(b)) => a == b,
            (NumericDegeneracy(a), NumericDegeneracy(b)) => a == b,
            (NoiseGenerationError(a), NoiseGenerationError(b)) => a == b,

            // csv errors are not comparable: same variant is enough
            (CsvError(_), CsvError(_)) => true,

            (Cancelled, Cancelled) => true,

            _ => false,
        }
    }
}
