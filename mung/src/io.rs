use crate::common::*;
use crate::dataset::Dataset;
use crate::embedding::JointEmbedding;
use crate::impute::ImputationResult;
use crate::pipeline::IntegrationSummary;

use matrix_util::common_io::{open_buf_writer, Delimiter};
use matrix_util::traits::IoOps;
use std::io::Write;

fn delimiters() -> Delimiter {
    Delimiter::from(vec!['\t', ','])
}

/// Read a feature x cell matrix with cell names on the header line
/// and feature names in the first column (tab or comma separated,
/// optionally gzipped)
pub fn read_dataset(name: &str, file: &str) -> anyhow::Result<Dataset> {
    let named = Mat::read_data_with_names(file, delimiters())?;
    info!(
        "{}: read {} features x {} cells from {}",
        name,
        named.mat.nrows(),
        named.mat.ncols(),
        file
    );
    Dataset::new(name, named.mat, named.rows, named.cols)
}

/// Read cell x coordinate rows and attach them to `dataset`, matching
/// cells by name
pub fn attach_coordinates(dataset: Dataset, file: &str) -> anyhow::Result<Dataset> {
    let named = Mat::read_data_with_names(file, delimiters())?;

    let name2row: HashMap<&str, usize> = named
        .rows
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_ref(), i))
        .collect();

    let rows = dataset
        .column_names()
        .iter()
        .map(|c| {
            name2row.get(c.as_ref()).copied().ok_or_else(|| {
                anyhow::anyhow!("{}: no coordinates for cell '{}'", file, c)
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let coordinates = matrix_util::dmatrix_util::subset_rows(&named.mat, rows)?;
    dataset.with_coordinates(coordinates)
}

/// cells x `{reference}_PC{k}`
pub fn write_embedding(embedding: &JointEmbedding, file: &str) -> anyhow::Result<()> {
    embedding.data().write_data_with_names(
        file,
        "\t",
        embedding.cell_names(),
        &embedding.column_names(),
    )?;
    info!("wrote {}", file);
    Ok(())
}

/// reference features x query cells
pub fn write_imputed(imputed: &ImputationResult, file: &str) -> anyhow::Result<()> {
    imputed
        .data
        .write_data_with_names(file, "\t", &imputed.row_names, &imputed.column_names)?;
    info!("wrote {}", file);
    Ok(())
}

pub fn write_summary(summary: &IntegrationSummary, file: &str) -> anyhow::Result<()> {
    let mut writer = open_buf_writer(file)?;
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush()?;
    info!("wrote {}", file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dataset_round_trip_through_gz() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("sc.tsv.gz");
        let file = file.to_str().unwrap();

        let xx = Mat::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 0.5, 0.0, -1.0]);
        let rows: Vec<Box<str>> = vec!["GAPDH".into(), "ACTB".into()];
        let cols: Vec<Box<str>> = vec!["c1".into(), "c2".into(), "c3".into()];
        xx.write_data_with_names(file, "\t", &rows, &cols)?;

        let x = read_dataset("sc", file)?;
        assert_eq!(x.row_names(), rows.as_slice());
        assert_eq!(x.column_names(), cols.as_slice());
        assert_abs_diff_eq!(x.data().clone(), xx);
        Ok(())
    }

    #[test]
    fn coordinates_follow_dataset_cell_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("xy.csv");
        let file = file.to_str().unwrap();

        let xy = Mat::from_row_slice(2, 2, &[10.0, 11.0, 20.0, 21.0]);
        let rows: Vec<Box<str>> = vec!["c2".into(), "c1".into()];
        let cols: Vec<Box<str>> = vec!["x".into(), "y".into()];
        xy.write_data_with_names(file, ",", &rows, &cols)?;

        let x = Dataset::new(
            "sp",
            Mat::zeros(1, 2),
            vec!["g".into()],
            vec!["c1".into(), "c2".into()],
        )?;
        let x = attach_coordinates(x, file)?;
        let coord = x.coordinates().unwrap();
        assert_abs_diff_eq!(coord[(0, 0)], 20.0);
        assert_abs_diff_eq!(coord[(1, 1)], 11.0);
        Ok(())
    }
}
