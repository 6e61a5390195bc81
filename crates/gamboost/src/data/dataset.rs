//! The packed feature store: immutable, bit-packed bins for every feature.

use ndarray::ArrayView2;

use super::packed::{BitWidth, PackedBins};
use crate::error::{CoreError, Result};

/// Per-feature descriptor. Immutable once the dataset is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureMeta {
    /// Number of bins (>= 1).
    pub n_bins: u32,
    /// Categorical (unordered bins) vs ordinal.
    pub categorical: bool,
}

impl FeatureMeta {
    #[inline]
    pub fn ordinal(n_bins: u32) -> Self {
        Self {
            n_bins,
            categorical: false,
        }
    }

    #[inline]
    pub fn categorical(n_bins: u32) -> Self {
        Self {
            n_bins,
            categorical: true,
        }
    }

    /// Storage width of this feature's packed bins.
    #[inline]
    pub fn bit_width(&self) -> BitWidth {
        BitWidth::for_bins(self.n_bins)
    }
}

/// Read-only binned training data.
///
/// Safe to share across workers: nothing mutates it after [`build`](PackedDatasetBuilder::build).
#[derive(Clone, Debug)]
pub struct PackedDataset {
    features: Vec<FeatureMeta>,
    columns: Vec<PackedBins>,
    n_rows: usize,
}

impl PackedDataset {
    /// Start building a dataset column by column.
    pub fn builder() -> PackedDatasetBuilder {
        PackedDatasetBuilder::default()
    }

    /// Build from a row-major `[n_rows, n_features]` matrix of bins.
    pub fn from_matrix(bins: ArrayView2<'_, u32>, features: &[FeatureMeta]) -> Result<Self> {
        if bins.ncols() != features.len() {
            return Err(CoreError::invalid(
                "features",
                format!("{} descriptors for {} columns", features.len(), bins.ncols()),
            ));
        }
        features
            .iter()
            .zip(bins.columns())
            .fold(Self::builder().n_rows(bins.nrows()), |builder, (&meta, column)| {
                builder.add_feature(meta, &column.to_vec())
            })
            .build()
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn features(&self) -> &[FeatureMeta] {
        &self.features
    }

    /// Descriptor of `feature`, or `InvalidParameter` if out of range.
    pub fn feature(&self, feature: usize) -> Result<&FeatureMeta> {
        self.features.get(feature).ok_or_else(|| {
            CoreError::invalid(
                "feature",
                format!("index {feature} out of range for {} features", self.features.len()),
            )
        })
    }

    /// Packed bins of `feature`, or `InvalidParameter` if out of range.
    pub fn column(&self, feature: usize) -> Result<&PackedBins> {
        self.feature(feature)?;
        Ok(&self.columns[feature])
    }

    /// Total packed storage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.columns.iter().map(PackedBins::size_bytes).sum()
    }
}

/// Builder for [`PackedDataset`].
///
/// Errors are deferred to [`build`](Self::build) so columns can be chained.
#[derive(Debug, Default)]
pub struct PackedDatasetBuilder {
    n_rows: Option<usize>,
    features: Vec<FeatureMeta>,
    columns: Vec<PackedBins>,
    error: Option<CoreError>,
}

impl PackedDatasetBuilder {
    /// Fix the row count up front (otherwise taken from the first column).
    pub fn n_rows(mut self, n_rows: usize) -> Self {
        self.n_rows = Some(n_rows);
        self
    }

    /// Append a feature column.
    pub fn add_feature(mut self, meta: FeatureMeta, bins: &[u32]) -> Self {
        if self.error.is_some() {
            return self;
        }
        let expected = *self.n_rows.get_or_insert(bins.len());
        if bins.len() != expected {
            self.error = Some(CoreError::invalid(
                "bins",
                format!(
                    "feature {} has {} rows, expected {expected}",
                    self.features.len(),
                    bins.len()
                ),
            ));
            return self;
        }
        match PackedBins::pack(bins, meta.n_bins) {
            Ok(column) => {
                self.features.push(meta);
                self.columns.push(column);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    pub fn build(self) -> Result<PackedDataset> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(PackedDataset {
            features: self.features,
            columns: self.columns,
            n_rows: self.n_rows.unwrap_or(0),
        })
    }
}
