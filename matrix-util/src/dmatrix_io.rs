use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter};
use crate::traits::*;
use nalgebra::DMatrix;

use std::fmt::{Debug, Display};
use std::str::FromStr;

fn parse_values<T>(words: &[Box<str>], line: usize, file: &str) -> anyhow::Result<Vec<T>>
where
    T: FromStr,
    <T as FromStr>::Err: Debug,
{
    words
        .iter()
        .map(|w| {
            w.parse::<T>().map_err(|e| {
                anyhow::anyhow!("{}: line {}: cannot parse '{}': {:?}", file, line, w, e)
            })
        })
        .collect()
}

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + Send + FromStr + Display + Copy,
    <T as FromStr>::Err: Debug,
{
    type Mat = Self;

    fn read_data_with_names(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let out = read_lines_of_words_delim(file, delim, 0)?;

        // the header may or may not carry a label for the row-name column
        let ncols = out.lines.first().map(|x| x.len().saturating_sub(1)).unwrap_or(0);
        let cols: Vec<Box<str>> = if out.header.len() == ncols + 1 {
            out.header[1..].to_vec()
        } else if out.header.len() == ncols {
            out.header.clone()
        } else {
            return Err(anyhow::anyhow!(
                "{}: header has {} names for {} columns",
                file,
                out.header.len(),
                ncols
            ));
        };

        let nrows = out.lines.len();
        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, words) in out.lines.iter().enumerate() {
            if words.len() != ncols + 1 {
                return Err(anyhow::anyhow!(
                    "{}: line {} has {} fields, expected {}",
                    file,
                    i + 2,
                    words.len(),
                    ncols + 1
                ));
            }
            rows.push(words[0].clone());
            data.extend(parse_values::<T>(&words[1..], i + 2, file)?);
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_data_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()> {
        if row_names.len() != self.nrows() || column_names.len() != self.ncols() {
            return Err(anyhow::anyhow!(
                "names [{} x {}] don't match the matrix [{} x {}]",
                row_names.len(),
                column_names.len(),
                self.nrows(),
                self.ncols()
            ));
        }

        let mut lines = Vec::with_capacity(self.nrows() + 1);
        let header = std::iter::once("")
            .chain(column_names.iter().map(|x| x.as_ref()))
            .collect::<Vec<_>>()
            .join(delim);
        lines.push(header.into_boxed_str());

        for (name, row) in row_names.iter().zip(self.row_iter()) {
            let line = std::iter::once(name.to_string())
                .chain(row.iter().map(|x| format!("{}", *x)))
                .collect::<Vec<_>>()
                .join(delim);
            lines.push(line.into_boxed_str());
        }

        write_lines(&lines, file)
    }
}
