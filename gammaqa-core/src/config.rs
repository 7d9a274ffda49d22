use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GammaError, Result};
use crate::gamma::params::{GammaParameters, Normalization};
use crate::store::schema::ColumnWidths;

/// Treatment technique; decides the gamma preset and the results sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technique {
    Vmat,
    Sbrt,
    Srs,
}

impl Technique {
    pub fn sheet_name(self) -> &'static str {
        match self {
            Technique::Vmat => "VMAT",
            Technique::Sbrt | Technique::Srs => "SBRT-SRS",
        }
    }

    pub fn is_stereotactic(self) -> bool {
        !matches!(self, Technique::Vmat)
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Technique::Vmat => "VMAT",
            Technique::Sbrt => "SBRT",
            Technique::Srs => "SRS",
        })
    }
}

/// Protocol-fixed part of the gamma criteria.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub distance_to_agreement_mm: f64,
    pub dose_difference_percent: f64,
    pub resolution_mm: f64,
}

impl Preset {
    /// Complete the preset with the operator's per-run choices.
    pub fn parameters(
        &self,
        low_dose_threshold_percent: f64,
        normalization: Normalization,
    ) -> Result<GammaParameters> {
        GammaParameters::new(
            self.distance_to_agreement_mm,
            self.dose_difference_percent,
            low_dose_threshold_percent,
            self.resolution_mm,
            normalization,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Presets {
    pub conventional: Preset,
    pub stereotactic: Preset,
}

impl Default for Presets {
    fn default() -> Self {
        Self {
            conventional: Preset {
                distance_to_agreement_mm: 0.0,
                dose_difference_percent: 0.44,
                resolution_mm: 0.1,
            },
            stereotactic: Preset {
                distance_to_agreement_mm: 0.0,
                dose_difference_percent: 0.69,
                resolution_mm: 0.1,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub results_file: PathBuf,
    pub locations: Vec<String>,
    /// Width per column header; `None` auto-sizes every column.
    pub column_widths: Option<BTreeMap<String, u16>>,
    pub presets: Presets,
    pub default_threshold_percent: f64,
}

const DEFAULT_LOCATIONS: [&str; 28] = [
    "Cabeza y cuello",
    "Cerebral",
    "Canal anal",
    "Esófago",
    "SBRT Hepática",
    "Ginecológico",
    "Linfoma",
    "Mama libre con supra",
    "Mama libre sin supra",
    "Mama DIBH con supra",
    "Mama DIBH sin supra",
    "Piel",
    "Paliativo",
    "Próstata con cadenas",
    "Próstata sin cadenas",
    "Pulmón",
    "Recto",
    "Vejiga",
    "Radiocirugía",
    "Holocráneo",
    "SBRT Renal",
    "Extremidades",
    "SBRT Ósea",
    "SBRT Próstata",
    "SBRT Ganglionar",
    "SBRT Pulmón",
    "SBRT Páncreas",
    "Otros",
];

impl Default for Config {
    fn default() -> Self {
        let mut locations: Vec<String> = DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect();
        locations.sort();
        let column_widths = [
            ("Timestamp", 19),
            ("Patient ID", 15),
            ("Location", 25),
            ("Threshold (%)", 12),
            ("Gamma (%)", 10),
            ("Normalization", 12),
            ("Gamma Octavius 4D (%)", 22),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            results_file: PathBuf::from("Registro Tlogs.xlsx"),
            locations,
            column_widths: Some(column_widths),
            presets: Presets::default(),
            default_threshold_percent: 10.0,
        }
    }
}

impl Config {
    /// Load a JSON config; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut cfg: Config = serde_json::from_str(&text)
            .map_err(|e| GammaError::Config(format!("{}: {e}", path.display())))?;
        cfg.locations.sort();
        Ok(cfg)
    }

    pub fn preset(&self, technique: Technique) -> Preset {
        if technique.is_stereotactic() {
            self.presets.stereotactic
        } else {
            self.presets.conventional
        }
    }

    pub fn check_location(&self, location: &str) -> Result<()> {
        if self.locations.iter().any(|l| l == location) {
            Ok(())
        } else {
            Err(GammaError::UnknownLocation(location.to_string()))
        }
    }

    pub fn column_widths(&self) -> Result<Option<ColumnWidths>> {
        self.column_widths
            .as_ref()
            .map(ColumnWidths::from_headers)
            .transpose()
    }
}
