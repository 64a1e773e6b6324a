use crate::error::ModelError;
use crate::grid::Knot;
use crate::model::SasModel;
use crate::settings::FinenessMethod;
use nalgebra::{DMatrix, Point3};
use pdbtbx::PDBError;
use polars::prelude::*;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

/// Run `f` inside a dedicated rayon pool.
///
/// `num_threads` of 0 uses all available cores. If the pool cannot be built the
/// closure runs on the global pool instead.
pub fn run_with_threads<F, R>(num_threads: usize, f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Ok(pool) => pool.install(f),
        Err(e) => {
            warn!("Failed to build a thread pool ({e}), using the global pool");
            f()
        }
    }
}

/// Coordinates of an `ATOM` record.
///
/// Columns 31-54 are read first; records that do not follow the fixed layout
/// fall back to the 7th, 8th and 9th whitespace-separated fields.
fn parse_atom_record(line: &str, line_no: usize) -> Result<Point3<f64>, ModelError> {
    let fixed: Option<Vec<f64>> = [(30, 38), (38, 46), (46, 54)]
        .iter()
        .map(|&(a, b)| line.get(a..b).and_then(|s| s.trim().parse::<f64>().ok()))
        .collect();
    if let Some(c) = fixed {
        return Ok(Point3::new(c[0], c[1], c[2]));
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let coords: Option<Vec<f64>> = fields
        .get(6..9)
        .map(|xs| xs.iter().filter_map(|s| s.parse::<f64>().ok()).collect());
    match coords {
        Some(c) if c.len() == 3 => Ok(Point3::new(c[0], c[1], c[2])),
        _ => Err(ModelError::Parse {
            line: line_no,
            message: format!("no coordinates in ATOM record {:?}", line.trim_end()),
        }),
    }
}

/// Parse the text of a dummy-atom PDB file.
///
/// The whole text is kept as the model header so that it can be written back
/// with only the coordinates changed.
pub fn parse_model(text: &str) -> Result<SasModel, ModelError> {
    let atoms = text
        .lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with("ATOM"))
        .map(|(i, line)| parse_atom_record(line, i + 1))
        .collect::<Result<Vec<_>, ModelError>>()?;
    SasModel::with_header(atoms, text.to_string())
}

/// Read a dummy-atom PDB file, keeping its text for [`save_model`].
pub fn read_model(path: &Path) -> Result<SasModel, ModelError> {
    let text = std::fs::read_to_string(path)?;
    let model = parse_model(&text)?;
    debug!("Read {model} from {}", path.display());
    Ok(model)
}

/// Open a PDB or mmCIF file with [`pdbtbx`] and keep only the atom coordinates.
///
/// Problems that do not prevent reading are returned next to the model.
pub fn load_structure(path: &Path) -> Result<(SasModel, Vec<PDBError>), ModelError> {
    let input_file = path.to_str().ok_or_else(|| {
        ModelError::InvalidParameter(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    let (pdb, errors) = pdbtbx::ReadOptions::default()
        .set_only_atomic_coords(true)
        .set_level(pdbtbx::StrictnessLevel::Loose)
        .read(input_file)
        .map_err(|errs| {
            ModelError::Structure(
                errs.iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<String>>()
                    .join("; "),
            )
        })?;

    let atoms: Vec<Point3<f64>> = pdb
        .atoms()
        .map(|a| {
            let (x, y, z) = a.pos();
            Point3::new(x, y, z)
        })
        .collect();
    Ok((SasModel::new(atoms)?, errors))
}

/// Read every input, using [`read_model`] for `.pdb`/`.ent` files and
/// [`load_structure`] for anything else.
pub fn load_models(
    paths: &[impl AsRef<Path>],
    method: FinenessMethod,
) -> Result<Vec<SasModel>, ModelError> {
    if paths.is_empty() {
        return Err(ModelError::EmptyInput("no input files"));
    }
    paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            let is_pdb = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    e.eq_ignore_ascii_case("pdb") || e.eq_ignore_ascii_case("ent")
                });
            let model = if is_pdb {
                read_model(path)?
            } else {
                let (model, pdb_warnings) = load_structure(path)?;
                pdb_warnings.iter().for_each(|e| match e.level() {
                    pdbtbx::ErrorLevel::BreakingError => warn!("{e}"),
                    pdbtbx::ErrorLevel::InvalidatingError => warn!("{e}"),
                    _ => debug!("{e}"),
                });
                model
            };
            Ok(model.with_method(method))
        })
        .collect()
}

/// Fresh dummy-atom `ATOM` records, one residue per atom, terminated by `END`.
///
/// The occupancy column holds `occupancies[i]` when given and 1.00 otherwise.
pub fn format_records(atoms: &[Point3<f64>], occupancies: Option<&[f64]>) -> String {
    let mut out = String::new();
    for (i, p) in atoms.iter().enumerate() {
        let occ = occupancies.and_then(|o| o.get(i)).copied().unwrap_or(1.0);
        let serial = (i + 1) % 100_000;
        let resi = (i + 1) % 10_000;
        let _ = writeln!(
            out,
            "ATOM  {serial:>5}  CA  ASP A{resi:>4}    {:8.3}{:8.3}{:8.3}{occ:6.2}{:6.2}{:10}{:>2}",
            p.x, p.y, p.z, 20.0, "", "C"
        );
    }
    out.push_str("END\n");
    out
}

/// Text of `model` as a PDB file.
///
/// A model read from a PDB file gets its header back with columns 31-54 of each
/// `ATOM` record replaced by the current coordinates; any other model is written
/// as fresh records.
pub fn format_model(model: &SasModel) -> Result<String, ModelError> {
    if model.header().is_empty() {
        return Ok(format_records(model.atoms(), None));
    }
    let records = model
        .header()
        .lines()
        .filter(|l| l.starts_with("ATOM"))
        .count();
    if records != model.len() {
        return Err(ModelError::RecordMismatch {
            records,
            atoms: model.len(),
        });
    }

    let mut out = String::with_capacity(model.header().len());
    let mut atoms = model.atoms().iter();
    for (i, line) in model.header().split_inclusive('\n').enumerate() {
        if !line.starts_with("ATOM") {
            out.push_str(line);
            continue;
        }
        let Some(p) = atoms.next() else {
            break;
        };
        let body = line.trim_end_matches(['\r', '\n']);
        let eol = &line[body.len()..];
        let (head, _) = split_at_column(body, 30, i + 1)?;
        let (_, tail) = split_at_column(body, 54, i + 1)?;
        let _ = write!(
            out,
            "{head:<30}{:8.3}{:8.3}{:8.3}{tail}{eol}",
            p.x, p.y, p.z
        );
    }
    Ok(out)
}

/// Split a record after byte `at`. Records shorter than that stay whole.
fn split_at_column(body: &str, at: usize, line_no: usize) -> Result<(&str, &str), ModelError> {
    if body.len() <= at {
        return Ok((body, ""));
    }
    if !body.is_char_boundary(at) {
        return Err(ModelError::Parse {
            line: line_no,
            message: format!("column {at} falls inside a multi-byte character"),
        });
    }
    Ok(body.split_at(at))
}

/// Write `model` to a PDB file.
pub fn save_model(model: &SasModel, path: &Path) -> Result<(), ModelError> {
    std::fs::write(path, format_model(model)?)?;
    debug!("Saved {model} to {}", path.display());
    Ok(())
}

/// Write knots as dummy atoms, with occupancy scaled to the best supported knot.
pub fn save_knots(knots: &[Knot], path: &Path) -> Result<(), ModelError> {
    let atoms: Vec<Point3<f64>> = knots.iter().map(|k| k.position).collect();
    let top = knots.iter().map(|k| k.occupancy).fold(0.0, f64::max);
    let occupancies: Vec<f64> = knots
        .iter()
        .map(|k| if top > 0.0 { k.occupancy / top } else { 0.0 })
        .collect();
    std::fs::write(path, format_records(&atoms, Some(&occupancies)))?;
    debug!("Saved {} knots to {}", knots.len(), path.display());
    Ok(())
}

/// Per-model fineness, centroid and principal moments of inertia.
pub fn summary_df(names: &[String], models: &[SasModel]) -> Result<DataFrame, ModelError> {
    let fineness = models
        .iter()
        .map(|m| m.fineness())
        .collect::<Result<Vec<f64>, ModelError>>()?;
    let centroids: Vec<Point3<f64>> = models.iter().map(|m| m.centroid()).collect();
    let moments: Vec<[f64; 3]> = models.iter().map(|m| m.principal_moments()).collect();
    let df = df!(
        "model" => names.to_vec(),
        "atoms" => models.iter().map(|m| m.len() as u32).collect::<Vec<u32>>(),
        "fineness" => fineness,
        "centroid_x" => centroids.iter().map(|c| c.x).collect::<Vec<f64>>(),
        "centroid_y" => centroids.iter().map(|c| c.y).collect::<Vec<f64>>(),
        "centroid_z" => centroids.iter().map(|c| c.z).collect::<Vec<f64>>(),
        "moment_1" => moments.iter().map(|m| m[0]).collect::<Vec<f64>>(),
        "moment_2" => moments.iter().map(|m| m[1]).collect::<Vec<f64>>(),
        "moment_3" => moments.iter().map(|m| m[2]).collect::<Vec<f64>>(),
    )?;
    Ok(df)
}

/// Long-form table of the upper triangle of a distance matrix.
pub fn distance_df(names: &[String], matrix: &DMatrix<f64>) -> Result<DataFrame, ModelError> {
    let n = matrix.nrows();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    let df = df!(
        "model_a" => pairs.iter().map(|&(i, _)| names[i].to_owned()).collect::<Vec<String>>(),
        "model_b" => pairs.iter().map(|&(_, j)| names[j].to_owned()).collect::<Vec<String>>(),
        "nsd" => pairs.iter().map(|&(i, j)| matrix[(i, j)]).collect::<Vec<f64>>(),
    )?;
    Ok(df)
}

/// Knot coordinates with their occupancy and contribution.
pub fn occupancy_df(knots: &[Knot]) -> Result<DataFrame, ModelError> {
    let df = df!(
        "x" => knots.iter().map(|k| k.position.x).collect::<Vec<f64>>(),
        "y" => knots.iter().map(|k| k.position.y).collect::<Vec<f64>>(),
        "z" => knots.iter().map(|k| k.position.z).collect::<Vec<f64>>(),
        "occupancy" => knots.iter().map(|k| k.occupancy).collect::<Vec<f64>>(),
        "contribution" => knots.iter().map(|k| k.contribution as u32).collect::<Vec<u32>>(),
    )?;
    Ok(df)
}

/// Write a DataFrame to a file of the given type
pub fn write_df_to_file(
    df: &mut DataFrame,
    file_path: &Path,
    file_type: DataFrameFileType,
) -> Result<(), ModelError> {
    let mut file = std::fs::File::create(file_path.with_extension(file_type.to_string()))?;
    match file_type {
        DataFrameFileType::Csv => {
            CsvWriter::new(&mut file).finish(df)?;
        }
        DataFrameFileType::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        DataFrameFileType::Json => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::Json)
                .finish(df)?;
        }
        DataFrameFileType::NDJson => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::JsonLines)
                .finish(df)?;
        }
    }
    Ok(())
}

/// File format for writing DataFrames.
#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum DataFrameFileType {
    /// Comma-separated values
    Csv,
    /// Parquet columnar storage
    Parquet,
    /// Standard JSON
    Json,
    /// Newline-delimited JSON
    NDJson,
}

impl std::fmt::Display for DataFrameFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataFrameFileType::Csv => write!(f, "csv"),
            DataFrameFileType::Parquet => write!(f, "parquet"),
            DataFrameFileType::Json => write!(f, "json"),
            DataFrameFileType::NDJson => write!(f, "ndjson"),
        }
    }
}
