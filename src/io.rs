//! Text persistence: CSR and pair ingestion, result dumps.
//!
//! Every file starts with an element count. Offsets and index files then hold
//! that many integers; pair files hold `count` lines of `src des`; result files
//! hold `count` lines of `src des count`.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::buffer::AggPack;
use crate::error::GraphError;
use crate::graph::{CsrGraph, GraphIndex};
use crate::merge::MergedResult;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The file could not be opened, read or written.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// A token is not a valid integer for the element type.
    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        /// File involved.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// The header count disagrees with the body.
    #[error("{}: header declares {declared} entries but {found} follow", .path.display())]
    CountMismatch {
        /// File involved.
        path: PathBuf,
        /// Header count.
        declared: usize,
        /// Entries present.
        found: usize,
    },
    /// The loaded arrays do not form a valid CSR graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_text(path: &Path) -> Result<String, PersistError> {
    std::fs::read_to_string(path).map_err(io_error(path))
}

/// Whitespace-separated integer tokens with their line numbers.
fn tokens(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .flat_map(|(i, line)| line.split_whitespace().map(move |tok| (i + 1, tok)))
}

fn parse_token<V: std::str::FromStr>(path: &Path, line: usize, tok: &str) -> Result<V, PersistError> {
    tok.parse().map_err(|_| PersistError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("invalid integer {tok:?}"),
    })
}

fn parse_id<T: GraphIndex>(path: &Path, line: usize, tok: &str) -> Result<T, PersistError> {
    let v: usize = parse_token(path, line, tok)?;
    T::from_index(v).ok_or_else(|| PersistError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("{v} does not fit the graph element type"),
    })
}

/// Parses a count-prefixed array of ids.
fn parse_array<T: GraphIndex>(path: &Path, text: &str) -> Result<Vec<T>, PersistError> {
    let mut toks = tokens(text);
    let Some((line, head)) = toks.next() else {
        return Err(PersistError::Parse {
            path: path.to_path_buf(),
            line: 1,
            message: "missing element count".into(),
        });
    };
    let declared: usize = parse_token(path, line, head)?;
    let values = toks
        .map(|(line, tok)| parse_id(path, line, tok))
        .collect::<Result<Vec<T>, _>>()?;
    if values.len() != declared {
        return Err(PersistError::CountMismatch {
            path: path.to_path_buf(),
            declared,
            found: values.len(),
        });
    }
    Ok(values)
}

/// Loads a CSR graph from an offsets file and an index file.
///
/// # Errors
/// I/O and parse failures, count mismatches, or an invalid CSR.
pub fn load_csr<T: GraphIndex>(
    offsets_path: impl AsRef<Path>,
    index_path: impl AsRef<Path>,
) -> Result<CsrGraph<T>, PersistError> {
    let (op, ip) = (offsets_path.as_ref(), index_path.as_ref());
    let offsets = parse_array(op, &read_text(op)?)?;
    let index = parse_array(ip, &read_text(ip)?)?;
    let graph = CsrGraph::from_csr_parts(offsets, index)?;
    info!(
        nv = graph.node_count(),
        ne = graph.edge_count(),
        offsets = %op.display(),
        "loaded CSR graph"
    );
    Ok(graph)
}

/// Loads query pairs: a count line, then one `src des` line per pair.
///
/// # Errors
/// I/O and parse failures or a count mismatch.
pub fn load_pairs<T: GraphIndex>(path: impl AsRef<Path>) -> Result<Vec<(T, T)>, PersistError> {
    let path = path.as_ref();
    let flat: Vec<T> = {
        let text = read_text(path)?;
        let mut toks = tokens(&text);
        let declared: usize = match toks.next() {
            Some((line, tok)) => parse_token(path, line, tok)?,
            None => 0,
        };
        let flat = toks
            .map(|(line, tok)| parse_id(path, line, tok))
            .collect::<Result<Vec<T>, _>>()?;
        if flat.len() != declared * 2 {
            return Err(PersistError::CountMismatch {
                path: path.to_path_buf(),
                declared,
                found: flat.len() / 2,
            });
        }
        flat
    };
    Ok(flat.chunks_exact(2).map(|p| (p[0], p[1])).collect())
}

/// Writes `src des count` records with a leading count line.
///
/// # Errors
/// Any write failure.
pub fn write_records<W, V, I>(writer: &mut W, records: I) -> std::io::Result<()>
where
    W: Write,
    V: Display,
    I: ExactSizeIterator<Item = (V, V, u64)>,
{
    writeln!(writer, "{}", records.len())?;
    for (src, des, count) in records {
        writeln!(writer, "{src} {des} {count}")?;
    }
    writer.flush()
}

fn write_file<V: Display>(
    path: &Path,
    records: impl ExactSizeIterator<Item = (V, V, u64)>,
) -> Result<(), PersistError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, records).map_err(io_error(path))
}

/// Writes a merged result.
///
/// # Errors
/// Any I/O failure.
pub fn write_results<T: GraphIndex>(path: impl AsRef<Path>, result: &MergedResult<T>) -> Result<(), PersistError> {
    let path = path.as_ref();
    let records: Vec<_> = result.iter().map(|((s, d), c)| (s, d, c)).collect();
    write_file(path, records.into_iter())?;
    info!(path = %path.display(), pairs = result.len(), "wrote merged results");
    Ok(())
}

/// Writes one kernel's aggregation records unmerged.
///
/// # Errors
/// Any I/O failure.
pub fn write_aggregation<'a, T: GraphIndex>(
    path: impl AsRef<Path>,
    records: impl ExactSizeIterator<Item = &'a AggPack<T>>,
) -> Result<(), PersistError> {
    write_file(path.as_ref(), records.map(|a| (a.src, a.des, u64::from(a.count))))
}

/// Parses a result file back into `(src, des, count)` records.
///
/// # Errors
/// I/O and parse failures or a count mismatch.
pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<(u64, u64, u64)>, PersistError> {
    let path = path.as_ref();
    parse_results(path, &read_text(path)?)
}

/// Parses result text; `path` only labels errors.
///
/// # Errors
/// Parse failures or a count mismatch.
pub fn parse_results(path: &Path, text: &str) -> Result<Vec<(u64, u64, u64)>, PersistError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let declared: usize = match lines.next() {
        Some((i, l)) => parse_token(path, i + 1, l.trim())?,
        None => 0,
    };
    let mut records = Vec::with_capacity(declared);
    for (i, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [src, des, count] = fields[..] else {
            return Err(PersistError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                message: format!("expected `src des count`, got {line:?}"),
            });
        };
        records.push((
            parse_token(path, i + 1, src)?,
            parse_token(path, i + 1, des)?,
            parse_token(path, i + 1, count)?,
        ));
    }
    if records.len() != declared {
        return Err(PersistError::CountMismatch {
            path: path.to_path_buf(),
            declared,
            found: records.len(),
        });
    }
    Ok(records)
}

/// `<base>_<kernel>`, the per-kernel dump path.
pub fn kernel_path(base: &Path, kernel: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("_{kernel}"));
    PathBuf::from(name)
}
