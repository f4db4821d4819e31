use anyhow::{bail, Context, Result};
use std::path::Path;

fn parse_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read gradient file {}", path.display()))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            line.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    tok.parse::<f64>()
                        .with_context(|| format!("Invalid number '{}' in {}", tok, path.display()))
                })
                .collect()
        })
        .collect()
}

/// Read an FSL `bvals`/`bvecs` pair.
///
/// `bvecs` may be stored as 3 rows of N values or N rows of 3 values.
/// Returns the b-values and the (unnormalised) gradient vectors.
pub fn read_fsl_gradients<P: AsRef<Path>, Q: AsRef<Path>>(
    bvals: P,
    bvecs: Q,
) -> Result<(Vec<f64>, Vec<[f64; 3]>)> {
    let bvals_path = bvals.as_ref();
    let bvecs_path = bvecs.as_ref();
    let values: Vec<f64> = parse_rows(bvals_path)?.into_iter().flatten().collect();
    let rows = parse_rows(bvecs_path)?;

    let vectors: Vec<[f64; 3]> = if rows.len() == 3 && rows.iter().all(|r| r.len() == values.len()) {
        (0..values.len()).map(|i| [rows[0][i], rows[1][i], rows[2][i]]).collect()
    } else if rows.iter().all(|r| r.len() == 3) {
        rows.iter().map(|r| [r[0], r[1], r[2]]).collect()
    } else {
        bail!("bvecs file {} is neither 3xN nor Nx3", bvecs_path.display());
    };

    if vectors.len() != values.len() {
        bail!(
            "Gradient table mismatch: {} b-values in {} but {} vectors in {}",
            values.len(),
            bvals_path.display(),
            vectors.len(),
            bvecs_path.display()
        );
    }
    Ok((values, vectors))
}
