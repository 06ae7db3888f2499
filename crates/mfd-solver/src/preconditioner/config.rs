//! Preconditioner parameter lists.
//!
//! Each variant reads its own sub-list (`"ML Parameters"`, `"ILU
//! Parameters"`, ...). Keys follow the names used in existing input files;
//! every key is optional and falls back to the defaults below.

use serde::{Deserialize, Serialize};

/// Smoothed-aggregation multigrid (`"ML Parameters"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlParameters {
    /// Maximum number of levels including the finest
    #[serde(rename = "max levels")]
    pub max_levels: usize,
    /// Strength-of-connection drop threshold for aggregation
    #[serde(rename = "aggregation: threshold")]
    pub aggregation_threshold: f64,
    /// Jacobi prolongator damping, scaled by `1 / ρ(D⁻¹A)`
    #[serde(rename = "aggregation: damping factor")]
    pub damping_factor: f64,
    /// Gauss-Seidel sweeps before and after each coarse correction
    #[serde(rename = "smoother: sweeps")]
    pub smoother_sweeps: usize,
    /// Stop coarsening once a level has at most this many rows
    #[serde(rename = "coarse: max size")]
    pub coarse_max_size: usize,
    /// V-cycles per application
    #[serde(rename = "cycle applications")]
    pub cycle_applications: usize,
}

impl Default for MlParameters {
    fn default() -> Self {
        Self {
            max_levels: 10,
            aggregation_threshold: 0.0,
            damping_factor: 4.0 / 3.0,
            smoother_sweeps: 2,
            coarse_max_size: 32,
            cycle_applications: 1,
        }
    }
}

/// Incomplete LU (`"ILU Parameters"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IluParameters {
    #[serde(rename = "fact: level-of-fill")]
    pub level_of_fill: usize,
    /// Added to each diagonal entry (with the sign of the entry) before factoring
    #[serde(rename = "fact: absolute threshold")]
    pub absolute_threshold: f64,
    /// Multiplies each diagonal entry before factoring
    #[serde(rename = "fact: relative threshold")]
    pub relative_threshold: f64,
}

impl Default for IluParameters {
    fn default() -> Self {
        Self {
            level_of_fill: 0,
            absolute_threshold: 0.0,
            relative_threshold: 1.0,
        }
    }
}

/// How overlapping subdomain corrections are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineMode {
    #[default]
    Add,
    Zero,
    Average,
}

/// Overlapping additive-Schwarz ILU (`"Block ILU Parameters"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockIluParameters {
    /// Layers of matrix-graph neighbours added to each subdomain
    #[serde(rename = "overlap")]
    pub overlap: usize,
    /// Number of contiguous subdomains
    #[serde(rename = "partitioner: local parts")]
    pub local_parts: usize,
    /// Always reset to `Add` when the preconditioner is built
    #[serde(rename = "schwarz: combine mode")]
    pub combine_mode: CombineMode,
    #[serde(flatten)]
    pub ilu: IluParameters,
}

impl Default for BlockIluParameters {
    fn default() -> Self {
        Self {
            overlap: 0,
            local_parts: 1,
            combine_mode: CombineMode::Add,
            ilu: IluParameters::default(),
        }
    }
}

/// Classical-parameter algebraic multigrid (`"HYPRE AMG Parameters"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypreAmgParameters {
    /// V-cycles per application
    #[serde(rename = "number of cycles")]
    pub cycles: usize,
    /// Symmetric Gauss-Seidel sweeps per level
    #[serde(rename = "number of smoothing iterations")]
    pub smoothing_sweeps: usize,
    /// Relative residual at which cycling stops early; `0` runs every cycle
    #[serde(rename = "tolerance")]
    pub tolerance: f64,
    #[serde(rename = "strong threshold")]
    pub strong_threshold: f64,
    #[serde(rename = "max levels")]
    pub max_levels: usize,
}

impl Default for HypreAmgParameters {
    fn default() -> Self {
        Self {
            cycles: 5,
            smoothing_sweeps: 3,
            tolerance: 0.0,
            strong_threshold: 0.25,
            max_levels: 25,
        }
    }
}

/// Parallel ILU(k) (`"HYPRE Euclid Parameters"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypreEuclidParameters {
    #[serde(rename = "level")]
    pub level: usize,
}

impl Default for HypreEuclidParameters {
    fn default() -> Self {
        Self { level: 1 }
    }
}

/// Sparse approximate inverse (`"HYPRE ParaSails Parameters"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypreParaSailsParameters {
    /// Entries with `|a_ij| < threshold · sqrt(|a_ii a_jj|)` are dropped from
    /// the pattern
    #[serde(rename = "threshold")]
    pub threshold: f64,
    /// Power of the filtered pattern used for the approximate inverse
    #[serde(rename = "number of levels")]
    pub levels: usize,
    /// Entries of the computed inverse below `filter · max|row|` are dropped
    #[serde(rename = "filter")]
    pub filter: f64,
}

impl Default for HypreParaSailsParameters {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            levels: 1,
            filter: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let ml: MlParameters = serde_json::from_str(r#"{"max levels": 3}"#).unwrap();
        assert_eq!(ml.max_levels, 3);
        assert_eq!(ml.smoother_sweeps, 2);

        let amg: HypreAmgParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(amg.cycles, 5);
        assert_eq!(amg.smoothing_sweeps, 3);
        assert_eq!(amg.tolerance, 0.0);
        assert_eq!(amg.strong_threshold, 0.25);
    }

    #[test]
    fn block_ilu_reads_flattened_ilu_keys() {
        let p: BlockIluParameters = serde_json::from_str(
            r#"{"overlap": 2, "fact: level-of-fill": 1, "schwarz: combine mode": "Zero"}"#,
        )
        .unwrap();
        assert_eq!(p.overlap, 2);
        assert_eq!(p.ilu.level_of_fill, 1);
        assert_eq!(p.combine_mode, CombineMode::Zero);
        assert_eq!(p.local_parts, 1);
    }
}
