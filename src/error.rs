use polars::prelude::PolarsError;
use std::fmt;

/// Error type for model, lattice and averaging operations.
#[derive(Debug)]
pub enum ModelError {
    /// Too few distinct atoms to define a nearest-neighbour spacing
    DegenerateGeometry {
        /// Number of atoms in the model
        atoms: usize,
    },
    /// Nothing to work on
    EmptyInput(&'static str),
    /// NaN or infinite coordinate at the given atom index
    NonFinite {
        /// Index of the offending atom
        index: usize,
    },
    /// Parameter outside its valid range
    InvalidParameter(String),
    /// Header ATOM records do not line up with the atoms being saved
    RecordMismatch {
        /// ATOM records in the header
        records: usize,
        /// Atoms in the model
        atoms: usize,
    },
    /// Malformed coordinate record
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
    /// Structure file rejected by pdbtbx
    Structure(String),
    /// Failed to read or write a file
    Io(std::io::Error),
    /// Failed to build or write a table
    Table(PolarsError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::DegenerateGeometry { atoms } => write!(
                f,
                "Degenerate geometry: fineness needs at least two distinct atoms, got {atoms} atom(s)"
            ),
            ModelError::EmptyInput(what) => write!(f, "Empty input: {what}"),
            ModelError::NonFinite { index } => {
                write!(f, "Non-finite coordinate for atom {index}")
            }
            ModelError::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            ModelError::RecordMismatch { records, atoms } => write!(
                f,
                "Header holds {records} ATOM record(s) but the model has {atoms} atom(s)"
            ),
            ModelError::Parse { line, message } => {
                write!(f, "Failed to parse line {line}: {message}")
            }
            ModelError::Structure(msg) => write!(f, "Failed to read structure: {msg}"),
            ModelError::Io(e) => write!(f, "I/O error: {e}"),
            ModelError::Table(e) => write!(f, "Table error: {e}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Io(e) => Some(e),
            ModelError::Table(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Io(err)
    }
}

impl From<PolarsError> for ModelError {
    fn from(err: PolarsError) -> Self {
        ModelError::Table(err)
    }
}
