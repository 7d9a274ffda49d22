use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{GammaError, Result};
use crate::fluence::grid::FluenceMap;

/// Planned/delivered fluence for one beam, as handed over by log decoding.
#[derive(Clone, Debug)]
pub struct DecodedBeam {
    pub beam_id: String,
    pub planned: FluenceMap,
    pub delivered: FluenceMap,
}

/// Turns one delivery log into a fluence pair. Binary trajectory-log parsing
/// lives outside this crate; implementations adapt whatever it produces.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedBeam>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FluencePair {
    pub planned: FluenceMap,
    pub delivered: FluenceMap,
}

/// Reads pre-decoded fluence pairs stored as JSON (`.json`) or CBOR (`.cbor`).
/// The beam id is the file stem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FluenceFileDecoder;

pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["json", "cbor"];

impl LogDecoder for FluenceFileDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedBeam> {
        let decode_err = |reason: String| GammaError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let f = File::open(path).map_err(|e| decode_err(e.to_string()))?;
        let r = BufReader::new(f);
        let pair: FluencePair = match extension(path).as_deref() {
            Some("json") => serde_json::from_reader(r).map_err(|e| decode_err(e.to_string()))?,
            Some("cbor") => ciborium::de::from_reader(r).map_err(|e| decode_err(e.to_string()))?,
            _ => return Err(decode_err("unsupported file extension".into())),
        };
        Ok(DecodedBeam {
            beam_id: beam_id(path),
            planned: pair.planned,
            delivered: pair.delivered,
        })
    }
}

pub fn beam_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Expand session inputs into beam files. Files are kept in the order given;
/// directories contribute every supported file beneath them, sorted by path.
pub fn collect_session_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            for e in WalkDir::new(input).follow_links(false) {
                let e = e.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                let supported = extension(e.path())
                    .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()));
                if e.file_type().is_file() && supported {
                    found.push(e.path().to_path_buf());
                }
            }
            found.sort();
            out.extend(found);
        } else if input.is_file() {
            out.push(input.clone());
        } else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", input.display()),
            )
            .into());
        }
    }
    Ok(out)
}
