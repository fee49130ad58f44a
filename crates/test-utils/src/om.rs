//! Synthetic `.om` file fixtures, built on [`om_format::writer::OmFileBuilder`].

use bytes::Bytes;
use om_format::writer::OmFileBuilder;
use om_format::Trailer;

/// A fixture with one data variable. `values.len()` must be a multiple of
/// `chunk_size` only up to the remainder the builder already tolerates
/// (the last chunk may be short).
pub fn single_variable(name: &str, dims: Vec<u64>, chunk_size: u64, values: &[f32]) -> (Bytes, Trailer) {
    let mut builder = OmFileBuilder::new();
    builder.add_data_variable(name, dims, chunk_size, values);
    builder.build()
}

/// A fixture with one data variable per `(name, values)` pair, all sharing
/// one `chunk_size`, for layers with multiple `om_params` (e.g. a wind
/// layer's `u10`/`v10`).
pub fn multi_variable(vars: &[(&str, &[f32])], chunk_size: u64) -> (Bytes, Trailer) {
    let mut builder = OmFileBuilder::new();
    for (name, values) in vars {
        builder.add_data_variable(name, vec![values.len() as u64], chunk_size, values);
    }
    builder.build()
}

/// A deterministic ramp `0.0, 1.0, .., n-1` for fixtures that only need
/// stable, order-distinguishable values.
pub fn ramp(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_variable_fixture_ends_with_its_own_trailer() {
        let (bytes, trailer) = single_variable("t2m", vec![8], 4, &ramp(8));
        assert_eq!(&bytes[bytes.len() - om_format::TRAILER_SIZE as usize..], &trailer.to_bytes());
    }
}
