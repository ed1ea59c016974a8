use crate::common::*;
use crate::dataset::DatasetSet;
use crate::impute::KnnWeighting;

/// Which datasets take part and which of them define embedding blocks
#[derive(Clone, Debug, PartialEq, Default)]
pub enum IntegrationSetting {
    /// one reference; every dataset is embedded against it
    ReferenceOnly { reference: Box<str> },
    /// every dataset is a reference
    #[default]
    AllReferences,
    /// all matrices cut down to the features every dataset measures
    SharedFeaturesOnly { references: Vec<Box<str>> },
    /// an explicit subset of datasets and references among them
    Custom {
        datasets: Vec<Box<str>>,
        references: Vec<Box<str>>,
    },
}

impl IntegrationSetting {
    /// The datasets and references this setting applies to
    pub fn resolve(&self, datasets: &DatasetSet) -> anyhow::Result<(DatasetSet, Vec<Box<str>>)> {
        match self {
            IntegrationSetting::ReferenceOnly { reference } => {
                datasets.require(reference)?;
                Ok((datasets.clone(), vec![reference.clone()]))
            }
            IntegrationSetting::AllReferences => Ok((datasets.clone(), datasets.names())),
            IntegrationSetting::SharedFeaturesOnly { references } => {
                check_names(datasets, references, "reference")?;
                Ok((datasets.restrict_to_common_features()?, references.clone()))
            }
            IntegrationSetting::Custom {
                datasets: names,
                references,
            } => {
                check_names(datasets, names, "dataset")?;
                let selected = datasets.select(names)?;
                check_names(&selected, references, "reference")?;
                Ok((selected, references.clone()))
            }
        }
    }
}

fn check_names(datasets: &DatasetSet, names: &[Box<str>], what: &str) -> anyhow::Result<()> {
    if names.is_empty() {
        return Err(MungError::invalid(format!("no {} names given", what)).into());
    }
    let mut seen = HashSet::default();
    for n in names {
        if datasets.index_of(n).is_none() {
            return Err(MungError::invalid(format!("unknown {} '{}'", what, n)).into());
        }
        if !seen.insert(n.clone()) {
            return Err(MungError::invalid(format!("{} '{}' given twice", what, n)).into());
        }
    }
    Ok(())
}

/// Options of one integration run
#[derive(Clone, Debug)]
pub struct IntegrationArgs {
    pub setting: IntegrationSetting,
    /// components per reference block
    pub rank: usize,
    /// `(reference, weight)`; equal block totals if unset
    pub reweight: Option<Vec<(Box<str>, f32)>>,
    /// neighbours for correction and imputation
    pub knn: usize,
    /// MNN merge order, anchor first; the references if unset
    pub anchor_order: Option<Vec<Box<str>>>,
    pub min_mnn_pairs: usize,
    pub kernel_sigma: Option<f32>,
    pub weighting: KnnWeighting,
    /// `(reference, query)` dataset pairs to impute
    pub impute: Vec<(Box<str>, Box<str>)>,
}

impl Default for IntegrationArgs {
    fn default() -> Self {
        Self {
            setting: IntegrationSetting::default(),
            rank: DEFAULT_RANK,
            reweight: None,
            knn: DEFAULT_KNN,
            anchor_order: None,
            min_mnn_pairs: DEFAULT_MIN_MNN_PAIRS,
            kernel_sigma: None,
            weighting: KnnWeighting::default(),
            impute: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn toy(name: &str, features: &[&str]) -> Dataset {
        let rows = features.iter().map(|&f| f.into()).collect::<Vec<Box<str>>>();
        let cols = vec![format!("{}_c0", name).into_boxed_str(), format!("{}_c1", name).into()];
        Dataset::new(name, Mat::zeros(rows.len(), 2), rows, cols).unwrap()
    }

    fn set() -> DatasetSet {
        DatasetSet::new(vec![
            toy("sc", &["g1", "g2", "g3"]),
            toy("sp", &["g2", "g3"]),
            toy("mx", &["g3", "g4"]),
        ])
        .unwrap()
    }

    #[test]
    fn settings_resolve_to_datasets_and_references() -> anyhow::Result<()> {
        let all = set();

        let (ds, refs) = IntegrationSetting::AllReferences.resolve(&all)?;
        assert_eq!(ds.len(), 3);
        assert_eq!(refs, all.names());

        let (ds, refs) = IntegrationSetting::ReferenceOnly {
            reference: "sp".into(),
        }
        .resolve(&all)?;
        assert_eq!(ds.len(), 3);
        assert_eq!(refs, vec![Box::<str>::from("sp")]);

        let (ds, _) = IntegrationSetting::SharedFeaturesOnly {
            references: vec!["sc".into()],
        }
        .resolve(&all)?;
        assert!(ds.iter().all(|x| x.num_features() == 1));

        let (ds, refs) = IntegrationSetting::Custom {
            datasets: vec!["mx".into(), "sc".into()],
            references: vec!["sc".into()],
        }
        .resolve(&all)?;
        assert_eq!(ds.names(), vec![Box::<str>::from("mx"), "sc".into()]);
        assert_eq!(refs.len(), 1);
        Ok(())
    }

    #[test]
    fn unknown_or_empty_names() {
        let all = set();
        for setting in [
            IntegrationSetting::ReferenceOnly {
                reference: "zz".into(),
            },
            IntegrationSetting::SharedFeaturesOnly { references: vec![] },
            IntegrationSetting::Custom {
                datasets: vec!["sc".into()],
                references: vec!["sp".into()],
            },
        ] {
            let err = setting.resolve(&all).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MungError>(),
                Some(MungError::InvalidConfiguration(_))
            ));
        }
    }
}
