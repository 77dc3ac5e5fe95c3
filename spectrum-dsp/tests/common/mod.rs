use wavegen::{sine, wf};

pub const SAMPLE_RATE: f32 = 8000.0;
pub const BLOCK_SIZE: usize = 256;
pub const BAND_COUNT: usize = 32;

/// One block of a pure sine at `frequency` Hz.
pub fn sine_block(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
    let waveform = wf!(f32, SAMPLE_RATE, sine!(frequency, amplitude));
    waveform.iter().take(len).collect()
}

/// The bin a sine at `frequency` should peak in.
pub fn expected_bin(frequency: f32, len: usize) -> usize {
    (frequency * len as f32 / SAMPLE_RATE).round() as usize
}

pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}
