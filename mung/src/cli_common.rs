use matrix_util::common_io::basename;
use mung::common::*;
use mung::dataset::Dataset;
use mung::io::read_dataset;

/// Split `key{sep}value`
pub fn split_pair(item: &str, sep: char) -> anyhow::Result<(Box<str>, Box<str>)> {
    match item.split_once(sep) {
        Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
            Ok((k.trim().into(), v.trim().into()))
        }
        _ => Err(MungError::invalid(format!("expected `key{}value`, got '{}'", sep, item)).into()),
    }
}

/// `name=file`, or just `file` to name the data set after the file
pub fn parse_data_arg(item: &str) -> anyhow::Result<(Box<str>, Box<str>)> {
    if item.contains('=') {
        split_pair(item, '=')
    } else {
        Ok((basename(item)?, item.into()))
    }
}

pub fn read_data_args(items: &[Box<str>]) -> anyhow::Result<Vec<Dataset>> {
    items
        .iter()
        .map(|item| {
            let (name, file) = parse_data_arg(item)?;
            read_dataset(&name, &file)
        })
        .collect()
}

pub fn init_logger(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}
