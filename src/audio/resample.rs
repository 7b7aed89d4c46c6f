use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use super::decode::DecodeError;

/// Resample a mono signal from `input_rate` to `output_rate`.
///
/// The whole clip is processed as a single chunk; clips are capped at 30s so
/// this stays small.
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, DecodeError> {
    if input_rate == output_rate {
        log::debug!("Sample rate already at {}Hz, skipping resample", output_rate);
        return Ok(input.to_vec());
    }
    if input.is_empty() {
        return Err(DecodeError::Empty);
    }
    if input_rate == 0 || output_rate == 0 {
        return Err(DecodeError::Resample(format!(
            "invalid rate conversion {}Hz -> {}Hz",
            input_rate, output_rate
        )));
    }

    let ratio = output_rate as f64 / input_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, input.len(), 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let output = resampler
        .process(&[input], None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let mut samples = output.into_iter().next().unwrap_or_default();

    // Trim to the exact expected length so durations stay consistent.
    let expected = (input.len() as f64 * ratio).round() as usize;
    samples.resize(expected, 0.0);

    log::debug!(
        "Resampled {} frames at {}Hz to {} frames at {}Hz",
        input.len(),
        input_rate,
        samples.len(),
        output_rate
    );

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_mono(&input, 48_000, 48_000).unwrap(), input);
    }

    #[test]
    fn upsampling_scales_length() {
        let input: Vec<f32> = (0..22_050)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22_050.0).sin())
            .collect();
        let output = resample_mono(&input, 22_050, 48_000).unwrap();
        assert_eq!(output.len(), 48_000);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(resample_mono(&[], 44_100, 48_000), Err(DecodeError::Empty)));
    }
}
