#![no_std]
extern crate alloc;

mod band_mapper;
mod error;

pub use band_mapper::{quantize, BandMapper};
pub use error::DspError;

use alloc::{vec, vec::Vec};
use microfft::Complex32;

/// Smallest block size with a real FFT kernel.
pub const MIN_BLOCK_SIZE: usize = 8;
/// Largest block size with a real FFT kernel.
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Normalize a single sample from i16 to f32.
pub fn normalize_sample(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Normalize a slice of i16 samples to a slice of f32 samples.
pub fn normalize_samples(samples: &[i16], normalized_samples: &mut [f32]) {
    for (out, &sample) in normalized_samples.iter_mut().zip(samples) {
        *out = normalize_sample(sample);
    }
}

/// Whether a block of this length can be transformed.
pub fn is_supported_block_size(block_size: usize) -> bool {
    block_size.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
}

/// Compute the real FFT of `samples` in place.
///
/// Returns the `len / 2` positive-frequency bins, or `None` if there is no
/// kernel for this length. The Nyquist coefficient is packed into the
/// imaginary part of bin 0.
pub fn compute_fft(samples: &mut [f32]) -> Option<&mut [Complex32]> {
    use microfft::real;

    let bins = match samples.len() {
        8 => real::rfft_8(samples.try_into().ok()?).as_mut_slice(),
        16 => real::rfft_16(samples.try_into().ok()?).as_mut_slice(),
        32 => real::rfft_32(samples.try_into().ok()?).as_mut_slice(),
        64 => real::rfft_64(samples.try_into().ok()?).as_mut_slice(),
        128 => real::rfft_128(samples.try_into().ok()?).as_mut_slice(),
        256 => real::rfft_256(samples.try_into().ok()?).as_mut_slice(),
        512 => real::rfft_512(samples.try_into().ok()?).as_mut_slice(),
        1024 => real::rfft_1024(samples.try_into().ok()?).as_mut_slice(),
        2048 => real::rfft_2048(samples.try_into().ok()?).as_mut_slice(),
        4096 => real::rfft_4096(samples.try_into().ok()?).as_mut_slice(),
        _ => return None,
    };
    Some(bins)
}

/// Compute the magnitude of packed FFT output into `magnitude`.
///
/// Bin 0 only uses the real part, its imaginary slot holds the Nyquist
/// coefficient which is not part of the spectrum.
pub fn compute_magnitude(fft_output: &[Complex32], magnitude: &mut [f32]) -> Result<(), DspError> {
    if fft_output.len() != magnitude.len() {
        return Err(DspError::length(fft_output.len(), magnitude.len()));
    }
    for (out, (i, component)) in magnitude.iter_mut().zip(fft_output.iter().enumerate()) {
        let im = if i == 0 { 0.0 } else { component.im };
        *out = libm::sqrtf(component.re * component.re + im * im);
    }
    Ok(())
}

/// Turns fixed-size sample blocks into magnitude spectra.
///
/// Holds a scratch buffer so the per-block path does not allocate. The
/// scratch is overwritten on every call, so equal blocks always give equal
/// spectra.
pub struct SpectralTransform {
    block_size: usize,
    scratch: Vec<f32>,
}

impl SpectralTransform {
    pub fn new(block_size: usize) -> Result<Self, DspError> {
        if block_size == 0 {
            return Err(DspError::InvalidConfiguration("block size must be positive"));
        }
        if !is_supported_block_size(block_size) {
            return Err(DspError::InvalidConfiguration(
                "block size must be a power of two between 8 and 4096",
            ));
        }
        Ok(Self {
            block_size,
            scratch: vec![0.0; block_size],
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of magnitude bins produced per block.
    pub fn spectrum_len(&self) -> usize {
        self.block_size / 2
    }

    /// Transform one block, writing `block_size / 2` magnitudes.
    pub fn process(&mut self, block: &[f32], magnitude: &mut [f32]) -> Result<(), DspError> {
        if block.len() != self.block_size {
            return Err(DspError::length(self.block_size, block.len()));
        }
        if magnitude.len() != self.spectrum_len() {
            return Err(DspError::length(self.spectrum_len(), magnitude.len()));
        }

        self.scratch.copy_from_slice(block);
        let fft_output = compute_fft(&mut self.scratch)
            .ok_or(DspError::InvalidConfiguration("no FFT kernel for block size"))?;
        compute_magnitude(fft_output, magnitude)
    }
}

/// One-shot magnitude spectrum of a block whose length sets the FFT size.
pub fn magnitude_spectrum(block: &[f32]) -> Result<Vec<f32>, DspError> {
    if block.is_empty() {
        return Err(DspError::length(MIN_BLOCK_SIZE, 0));
    }
    let mut transform = SpectralTransform::new(block.len())?;
    let mut magnitude = vec![0.0; transform.spectrum_len()];
    transform.process(block, &mut magnitude)?;
    Ok(magnitude)
}

/// Run the transform and band mapper over one block.
pub fn process_block(
    transform: &mut SpectralTransform,
    mapper: &BandMapper,
    block: &[f32],
    magnitude: &mut [f32],
    bands: &mut [u8],
) -> Result<(), DspError> {
    transform.process(block, magnitude)?;
    mapper.map(magnitude, bands)
}
