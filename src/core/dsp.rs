use ndarray::{Array1, Array2, ArrayD, Axis, ErrorKind, IxDyn, ShapeError, Zip};

/// Normalization epsilon added to the standard deviation.
pub const EPS: f32 = 1e-8;

/// Average `(frames, channels)` down to `(frames)`.
pub fn average_channels(x: &Array2<f32>) -> Array1<f32> {
    if x.ncols() == 1 {
        return x.column(0).to_owned();
    }
    x.mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(x.nrows()))
}

/// Keep the raw layout: `(frames)` for mono input, `(frames, channels)` otherwise.
pub fn squeeze_mono(x: Array2<f32>) -> ArrayD<f32> {
    if x.ncols() == 1 {
        x.index_axis_move(Axis(1), 0).into_dyn()
    } else {
        x.into_dyn()
    }
}

fn last_axis(x: &ArrayD<f32>) -> Axis {
    Axis(x.ndim().saturating_sub(1))
}

/// Mean over the last axis, keeping it as a length-1 axis.
pub fn mean_last_axis(x: &ArrayD<f32>) -> ArrayD<f32> {
    let axis = last_axis(x);
    match x.mean_axis(axis) {
        Some(m) => m.insert_axis(axis),
        None => ArrayD::zeros(keepdim_shape(x)),
    }
}

/// Unbiased standard deviation over the last axis, keeping it as a length-1 axis.
pub fn std_last_axis(x: &ArrayD<f32>) -> ArrayD<f32> {
    let axis = last_axis(x);
    let n = x.len_of(axis);
    if n == 0 {
        return ArrayD::zeros(keepdim_shape(x));
    }
    // ddof = 1 needs at least two samples
    let ddof = if n > 1 { 1.0 } else { 0.0 };
    x.std_axis(axis, ddof).insert_axis(axis)
}

fn keepdim_shape(x: &ArrayD<f32>) -> IxDyn {
    let mut shape = x.shape().to_vec();
    if let Some(last) = shape.last_mut() {
        *last = 1;
    }
    IxDyn(&shape)
}

/// `(x - mean(x)) / (std + eps)`, with `std` typically taken from the mixture
/// so that sources keep their loudness relative to it. `std` must broadcast
/// to the shape of `x`.
pub fn normalize_with_std(
    x: &ArrayD<f32>,
    std: &ArrayD<f32>,
    eps: f32,
) -> Result<ArrayD<f32>, ShapeError> {
    let incompatible = || ShapeError::from_kind(ErrorKind::IncompatibleShape);
    let mean = mean_last_axis(x);
    let mean = mean.broadcast(x.raw_dim()).ok_or_else(incompatible)?;
    let std = std.broadcast(x.raw_dim()).ok_or_else(incompatible)?;

    let mut out = x.to_owned();
    Zip::from(&mut out)
        .and(&mean)
        .and(&std)
        .for_each(|o, &m, &s| *o = (*o - m) / (s + eps));
    Ok(out)
}
