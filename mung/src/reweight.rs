use crate::common::*;
use crate::embedding::JointEmbedding;

/// Sum of absolute values within each block, in block order
pub fn block_totals(embedding: &JointEmbedding) -> Vec<f32> {
    let data = embedding.data();
    embedding
        .blocks()
        .iter()
        .map(|b| {
            data.columns(b.start, b.width)
                .iter()
                .map(|x| x.abs())
                .sum::<f32>()
        })
        .collect()
}

/// Rescale each reference block of the embedding by a scalar so
/// blocks contribute in controlled proportions.
///
/// Without `weights`, every block is brought to the mean block total.
/// The overall magnitude is kept and applying it twice changes
/// nothing.
///
/// With `weights`, block `b` ends up with total
/// `w[b] / sum(w) * REWEIGHT_TOTAL`. Blocks not named get weight 1.
/// The result does not depend on the input magnitudes, but repeated
/// application is only a fixed point up to rounding of the targets.
///
/// * `embedding` - joint embedding with one block per reference
/// * `weights` - `(block name, weight)`, positive and finite
pub fn reweight_embedding(
    embedding: &JointEmbedding,
    weights: Option<&[(Box<str>, f32)]>,
) -> anyhow::Result<JointEmbedding> {
    let targets = match weights {
        Some(weights) => weighted_targets(embedding, weights)?,
        None => None,
    };

    let totals = block_totals(embedding);

    for (b, &t) in embedding.blocks().iter().zip(totals.iter()) {
        if !t.is_finite() {
            return Err(MungError::invalid(format!(
                "embedding block '{}' has a non-finite total {}",
                b.name, t
            ))
            .into());
        }
        if t == 0.0 {
            return Err(MungError::ZeroNormBlock {
                block: b.name.clone(),
            }
            .into());
        }
    }

    let targets = targets.unwrap_or_else(|| {
        let mean = totals.iter().sum::<f32>() / totals.len().max(1) as f32;
        vec![mean; totals.len()]
    });

    let mut data = embedding.data().clone();
    for ((b, &t), &target) in embedding.blocks().iter().zip(totals.iter()).zip(targets.iter()) {
        let scale = target / t;
        debug!("block '{}': total {} -> {} (x{})", b.name, t, target, scale);
        data.columns_mut(b.start, b.width).scale_mut(scale);
    }

    info!("reweighted {} embedding block(s)", targets.len());
    embedding.with_data(data)
}

fn weighted_targets(
    embedding: &JointEmbedding,
    weights: &[(Box<str>, f32)],
) -> anyhow::Result<Option<Vec<f32>>> {
    let mut named: HashMap<&str, f32> = HashMap::default();
    for (name, w) in weights {
        if embedding.block(name).is_none() {
            return Err(MungError::invalid(format!(
                "weight given for '{}', which is not a reference block",
                name
            ))
            .into());
        }
        if !w.is_finite() || *w <= 0.0 {
            return Err(MungError::invalid(format!(
                "weight of '{}' must be positive and finite, got {}",
                name, w
            ))
            .into());
        }
        if named.insert(name.as_ref(), *w).is_some() {
            return Err(MungError::invalid(format!("weight of '{}' given twice", name)).into());
        }
    }

    let ww: Vec<f32> = embedding
        .blocks()
        .iter()
        .map(|b| named.get(b.name.as_ref()).copied().unwrap_or(1.0))
        .collect();
    let denom: f32 = ww.iter().sum();

    Ok(Some(ww.iter().map(|w| w / denom * REWEIGHT_TOTAL).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_blocks(scale_a: f32, scale_b: f32) -> JointEmbedding {
        let cells: Vec<Box<str>> = (0..3).map(|i| format!("c{}", i).into()).collect();
        let a = Mat::from_fn(3, 2, |i, j| scale_a * (i as f32 - j as f32 + 0.5));
        let b = Mat::from_fn(3, 3, |i, j| scale_b * ((i * j) as f32 + 1.0));
        JointEmbedding::from_blocks(cells, vec![("a".into(), a), ("b".into(), b)]).unwrap()
    }

    #[test]
    fn uniform_reweighting_equalizes_and_is_idempotent() -> anyhow::Result<()> {
        let emb = two_blocks(1.0, 100.0);
        let before: f32 = block_totals(&emb).iter().sum();

        let once = reweight_embedding(&emb, None)?;
        let t1 = block_totals(&once);
        assert_relative_eq!(t1[0], t1[1], max_relative = 1e-5);
        assert_relative_eq!(t1.iter().sum::<f32>(), before, max_relative = 1e-5);

        let twice = reweight_embedding(&once, None)?;
        assert_relative_eq!(once.data(), twice.data(), max_relative = 1e-5);
        assert_eq!(once.column_names(), emb.column_names());
        Ok(())
    }

    #[test]
    fn explicit_weights_hit_targets() -> anyhow::Result<()> {
        let emb = two_blocks(1.0, 3.0);
        let weights: Vec<(Box<str>, f32)> = vec![("b".into(), 3.0)];
        let out = reweight_embedding(&emb, Some(weights.as_slice()))?;
        let t = block_totals(&out);
        assert_relative_eq!(t[0], 0.25 * REWEIGHT_TOTAL, max_relative = 1e-4);
        assert_relative_eq!(t[1], 0.75 * REWEIGHT_TOTAL, max_relative = 1e-4);
        Ok(())
    }

    #[test]
    fn bad_weights_are_rejected() {
        let emb = two_blocks(1.0, 1.0);
        let cases: Vec<Vec<(Box<str>, f32)>> = vec![
            vec![("zzz".into(), 1.0)],
            vec![("a".into(), 0.0)],
            vec![("a".into(), f32::NAN)],
            vec![("a".into(), 1.0), ("a".into(), 2.0)],
        ];
        for w in cases {
            let err = reweight_embedding(&emb, Some(w.as_slice())).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MungError>(),
                Some(MungError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn zero_block_cannot_be_rescaled() {
        let emb = two_blocks(0.0, 1.0);
        let err = reweight_embedding(&emb, None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MungError>(),
            Some(&MungError::ZeroNormBlock { block: "a".into() })
        );
    }

    #[test]
    fn non_finite_block_is_not_a_zero_block() {
        let emb = two_blocks(1.0, 1.0);
        let mut data = emb.data().clone();
        data[(0, 3)] = f32::NAN;
        let emb = emb.with_data(data).unwrap();

        let err = reweight_embedding(&emb, None).unwrap_err();
        match err.downcast_ref::<MungError>() {
            Some(MungError::InvalidConfiguration(msg)) => assert!(msg.contains("'b'")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
