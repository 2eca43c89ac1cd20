use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use ndarray::{Array1, Array2};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScalerParams {
    #[serde(alias = "mean_")]
    mean: Vec<f32>,
    #[serde(alias = "scale_")]
    scale: Vec<f32>,
}

/// Per-column standardization with statistics fit at training time.
#[derive(Clone, Debug)]
pub struct StandardScaler {
    mean: Array1<f32>,
    scale: Array1<f32>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self> {
        if mean.is_empty() {
            bail!("scaler has no features");
        }
        if mean.len() != scale.len() {
            bail!(
                "scaler mean has {} entries but scale has {}",
                mean.len(),
                scale.len()
            );
        }

        // Constant columns were fit with a zero spread; they pass through.
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();

        Ok(Self {
            mean: Array1::from_vec(mean),
            scale,
        })
    }

    /// Reads `{"mean": [...], "scale": [...]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scaler from {}", path.display()))?;
        let params: ScalerParams = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scaler {}", path.display()))?;
        Self::new(params.mean, params.scale)
    }

    pub fn feature_count(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, mut flat: Array2<f32>) -> Result<Array2<f32>> {
        if flat.ncols() != self.feature_count() {
            bail!(
                "scaler expects {} features, got {}",
                self.feature_count(),
                flat.ncols()
            );
        }

        flat -= &self.mean;
        flat /= &self.scale;
        Ok(flat)
    }
}

/// Class names indexed by classifier output position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            bail!("label decoder has no classes");
        }
        Ok(Self { classes })
    }

    /// Reads a JSON array of class names.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read label classes from {}", path.display()))?;
        let classes: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse label classes {}", path.display()))?;
        Self::new(classes)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    #[test]
    fn scaler_standardizes_columns() {
        let scaler = StandardScaler::new(vec![1.0, 2.0], vec![2.0, 0.0]).unwrap();
        let scaled = scaler.transform(array![[3.0, 5.0], [1.0, 2.0]]).unwrap();
        assert_eq!(scaled, array![[1.0, 3.0], [0.0, 0.0]]);
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let scaler = StandardScaler::new(vec![0.0; 4], vec![1.0; 4]).unwrap();
        let err = scaler.transform(Array2::zeros((1, 3))).unwrap_err();
        assert_eq!(err.to_string(), "scaler expects 4 features, got 3");
    }

    #[test]
    fn scaler_rejects_mismatched_params() {
        assert!(StandardScaler::new(vec![0.0; 2], vec![1.0; 3]).is_err());
        assert!(StandardScaler::new(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn loads_scaler_with_fitted_attribute_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mean_": [0.5, 1.5, 2.5], "scale_": [1.0, 1.0, 2.0]}}"#).unwrap();
        let scaler = StandardScaler::load(file.path()).unwrap();
        assert_eq!(scaler.feature_count(), 3);
    }

    #[test]
    fn loads_label_classes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["push_up", "squat", "lunge"]"#).unwrap();
        let decoder = LabelDecoder::load(file.path()).unwrap();
        assert_eq!(decoder.classes(), ["push_up", "squat", "lunge"]);
    }

    #[test]
    fn missing_files_report_their_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let err = StandardScaler::load(&path).unwrap_err();
        assert!(err.to_string().contains("scaler.json"));
        assert!(LabelDecoder::load(&dir.path().join("labels.json")).is_err());
    }
}
