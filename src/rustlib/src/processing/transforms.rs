use crate::config::OutputTransform;

use ndarray::{Array, ArrayView, Axis, RemoveAxis, Slice};

/// Applies `transform` along the first (time) axis of `data`.
///
/// `Identity` and `Square` keep the row count. `AbsMovingAverage` only emits
/// rows whose window lies fully inside `data`, so it returns
/// `rows - window + 1` rows (none if `data` is shorter than the window).
pub fn apply<D: RemoveAxis>(
    transform: OutputTransform,
    data: ArrayView<'_, f64, D>,
    window: usize,
) -> Array<f64, D> {
    match transform {
        OutputTransform::Identity => data.to_owned(),
        OutputTransform::Square => data.mapv(|v| v * v),
        OutputTransform::AbsMovingAverage => abs_moving_average(data, window),
    }
}

/// Trailing mean of `|x|` over `window` rows.
///
/// Output row `k` is the mean over input rows `k..k + window`, i.e. row `k`
/// belongs to the window that ends at input row `k + window - 1`.
pub fn abs_moving_average<D: RemoveAxis>(data: ArrayView<'_, f64, D>, window: usize) -> Array<f64, D> {
    let window = window.max(1);
    let n_rows = data.len_of(Axis(0));
    let n_out = (n_rows + 1).saturating_sub(window);

    let abs = data.mapv(f64::abs);
    let mut dim = data.raw_dim();
    dim[0] = n_out;
    let mut out = Array::zeros(dim);

    let scale = 1.0 / window as f64;
    for (k, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
        let sum = abs
            .slice_axis(Axis(0), Slice::from(k..k + window))
            .sum_axis(Axis(0));
        row.assign(&sum);
        row.mapv_inplace(|v| v * scale);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2, Array3};

    #[test]
    fn moving_average_keeps_only_full_windows() {
        let x = array![[1.0, -1.0], [-2.0, 2.0], [3.0, -3.0], [-4.0, 4.0], [5.0, -5.0]];
        let ma = abs_moving_average(x.view(), 3);

        assert_eq!(ma.shape(), &[3, 2]);
        assert_eq!(ma, array![[2.0, 2.0], [3.0, 3.0], [4.0, 4.0]]);
    }

    #[test]
    fn moving_average_window_ends_at_row() {
        // row i of the output matches the mean over the w rows ending at i + w - 1
        let x = Array2::from_shape_fn((30, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64 - 5.0);
        let w = 4;
        let ma = abs_moving_average(x.view(), w);

        assert_eq!(ma.nrows(), 30 - w + 1);
        for end in (w - 1)..30 {
            for j in 0..3 {
                let expected: f64 =
                    (end + 1 - w..=end).map(|i| x[[i, j]].abs()).sum::<f64>() / w as f64;
                assert!((ma[[end + 1 - w, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn moving_average_of_one_is_abs() {
        let x = array![[1.5], [-2.5], [0.0]];
        assert_eq!(abs_moving_average(x.view(), 1), x.mapv(f64::abs));
        // a zero window is treated as one
        assert_eq!(abs_moving_average(x.view(), 0), x.mapv(f64::abs));
    }

    #[test]
    fn moving_average_shorter_than_window_is_empty() {
        let x = Array3::<f64>::ones((3, 2, 2));
        let ma = abs_moving_average(x.view(), 5);
        assert_eq!(ma.shape(), &[0, 2, 2]);
    }

    #[test]
    fn elementwise_transforms_keep_rows() {
        let x = Array3::from_shape_fn((4, 2, 3), |(i, j, k)| i as f64 - j as f64 * 0.5 + k as f64);

        let identity = apply(OutputTransform::Identity, x.view(), 10);
        assert_eq!(identity, x);

        let squared = apply(OutputTransform::Square, x.view(), 10);
        assert_eq!(squared, x.mapv(|v| v * v));
    }
}
