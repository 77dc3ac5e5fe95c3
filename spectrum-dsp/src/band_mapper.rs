use alloc::{vec, vec::Vec};

use crate::error::DspError;

/// Clamp a band mean to `[0, 255]` and truncate it to a byte.
///
/// Values above 255 saturate. NaN maps to 0.
pub fn quantize(mean: f32) -> u8 {
    if mean.is_nan() {
        return 0;
    }
    mean.clamp(0.0, 255.0) as u8
}

fn average(bin_slice: &[f32]) -> f32 {
    if bin_slice.is_empty() {
        return 0.0;
    }
    bin_slice.iter().sum::<f32>() / bin_slice.len() as f32
}

/// Groups magnitude bins into equal-width bands and quantizes each band.
///
/// Every band spans `spectrum_len / band_count` bins. The trailing
/// `spectrum_len % band_count` bins belong to no band and are ignored,
/// so band widths never vary within one mapper.
pub struct BandMapper {
    spectrum_len: usize,
    band_ranges: Vec<(usize, usize)>,
}

impl BandMapper {
    pub fn new(spectrum_len: usize, band_count: usize) -> Result<Self, DspError> {
        if band_count == 0 {
            return Err(DspError::InvalidConfiguration("band count must be positive"));
        }
        if spectrum_len == 0 {
            return Err(DspError::InvalidConfiguration("spectrum must not be empty"));
        }
        if band_count > spectrum_len {
            return Err(DspError::InvalidConfiguration(
                "band count exceeds spectrum resolution",
            ));
        }

        Ok(Self {
            spectrum_len,
            band_ranges: Self::calculate_even_bands(spectrum_len, band_count),
        })
    }

    fn calculate_even_bands(spectrum_len: usize, band_count: usize) -> Vec<(usize, usize)> {
        let band_size = spectrum_len / band_count; // 128/32 = 4 bins per band
        let mut band_ranges = vec![(0, 0); band_count];

        for (i, range) in band_ranges.iter_mut().enumerate() {
            let start = i * band_size;
            *range = (start, start + band_size);
        }

        band_ranges
    }

    /// Half-open bin ranges, one per band, in ascending frequency order.
    pub fn band_ranges(&self) -> &[(usize, usize)] {
        &self.band_ranges
    }

    pub fn band_count(&self) -> usize {
        self.band_ranges.len()
    }

    pub fn spectrum_len(&self) -> usize {
        self.spectrum_len
    }

    pub fn bins_per_band(&self) -> usize {
        self.spectrum_len / self.band_count()
    }

    /// Number of high-frequency bins excluded from every band.
    pub fn dropped_bins(&self) -> usize {
        self.spectrum_len % self.band_count()
    }

    /// Write one quantized byte per band into `bands`.
    pub fn map(&self, magnitude: &[f32], bands: &mut [u8]) -> Result<(), DspError> {
        if magnitude.len() != self.spectrum_len {
            return Err(DspError::length(self.spectrum_len, magnitude.len()));
        }
        if bands.len() != self.band_count() {
            return Err(DspError::length(self.band_count(), bands.len()));
        }

        for (band, &(start, end)) in bands.iter_mut().zip(&self.band_ranges) {
            *band = quantize(average(&magnitude[start..end]));
        }
        Ok(())
    }

    /// Allocating variant of [`BandMapper::map`].
    pub fn map_to_vec(&self, magnitude: &[f32]) -> Result<Vec<u8>, DspError> {
        let mut bands = vec![0; self.band_count()];
        self.map(magnitude, &mut bands)?;
        Ok(bands)
    }
}
