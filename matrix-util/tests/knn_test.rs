use matrix_util::knn_match::*;
use nalgebra::DMatrix;

#[test]
fn exact_and_approximate_search_agree() {
    // a 20 x 20 grid, one point per row
    let xx = DMatrix::from_fn(400, 2, |i, j| if j == 0 { (i / 20) as f32 } else { (i % 20) as f32 });
    let rows = (0..400).collect::<Vec<usize>>();

    let exact = ColumnDict::from_matrix_rows(&xx, &rows, rows.clone());
    let points = rows.iter().map(|&i| xx.row(i).to_vp()).collect::<Vec<_>>();
    let hnsw = ColumnDict::from_points(points, rows.clone(), 0);

    let query = VecPoint {
        data: vec![7.1, 3.0],
    };
    let (nn_exact, dd_exact) = exact.search_by_query_data(&query, 1);
    let (nn_approx, dd_approx) = hnsw.search_by_query_data(&query, 1);

    assert_eq!(nn_exact, vec![7 * 20 + 3]);
    assert_eq!(nn_approx, nn_exact);
    approx::assert_abs_diff_eq!(dd_exact[0], dd_approx[0], epsilon = 1e-6);
}

#[test]
fn knn_is_capped_by_dictionary_size() {
    let xx = DMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
    let dict = ColumnDict::from_matrix_rows(&xx, &[0, 1, 2], vec!["a", "b", "c"]);
    let (nn, dd) = dict.search_by_query_data(&VecPoint { data: vec![0.0] }, 10);
    assert_eq!(nn, vec!["a", "b", "c"]);
    assert_eq!(dd.len(), 3);
}
