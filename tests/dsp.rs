use approx::assert_abs_diff_eq;
use ndarray::{arr1, Array2};
use stem_dataset_core::core::dsp::{average_channels, normalize_with_std, std_last_axis, EPS};

#[test]
fn stereo_average_is_mean_of_channels() {
    let x = Array2::from_shape_vec((3, 2), vec![0.2, 0.4, -1.0, 1.0, 0.5, 0.0]).unwrap();
    let mono = average_channels(&x);
    assert_eq!(mono.len(), 3);
    assert_abs_diff_eq!(mono[0], 0.3, epsilon = 1e-7);
    assert_abs_diff_eq!(mono[1], 0.0, epsilon = 1e-7);
    assert_abs_diff_eq!(mono[2], 0.25, epsilon = 1e-7);
}

#[test]
fn normalized_mixture_has_zero_mean_unit_std() {
    let mix = arr1(&[0.1f32, 0.5, -0.3, 0.9, 0.0, -0.2]).into_dyn();
    let std = std_last_axis(&mix);
    let out = normalize_with_std(&mix, &std, EPS).unwrap();

    let mean = out.iter().sum::<f32>() / out.len() as f32;
    assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(std_last_axis(&out)[[0]], 1.0, epsilon = 1e-5);
}

#[test]
fn sources_share_the_mixture_scale() {
    let mix = arr1(&[1.0f32, -1.0, 1.0, -1.0]).into_dyn();
    let sources = Array2::from_shape_vec((2, 4), vec![0.5, -0.5, 0.5, -0.5, 2.0, 2.0, 2.0, 4.0])
        .unwrap()
        .into_dyn();
    let m_std = std_last_axis(&mix);
    let scale = m_std[[0]] + EPS;

    let out = normalize_with_std(&sources, &m_std, EPS).unwrap();
    assert_eq!(out.shape(), &[2, 4]);
    // first source is half as loud as the mixture and stays that way
    assert_abs_diff_eq!(out[[0, 0]], 0.5 / scale, epsilon = 1e-6);
    // each source is centered on its own mean
    assert_abs_diff_eq!(out[[1, 3]], (4.0 - 2.5) / scale, epsilon = 1e-6);
}
