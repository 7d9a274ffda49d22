use std::path::Path;

use crate::error::{GammaError, Result};

/// Length of the patient identifier prefix in log file names.
pub const PATIENT_ID_LEN: usize = 12;

/// The patient id is the first 12 characters of the file name. Shorter names
/// are rejected rather than truncated.
pub fn patient_id_from_filename(name: &str) -> Result<String> {
    let id: String = name.chars().take(PATIENT_ID_LEN).collect();
    if id.chars().count() < PATIENT_ID_LEN {
        return Err(GammaError::PatientId(format!(
            "file name {name:?} is shorter than {PATIENT_ID_LEN} characters"
        )));
    }
    Ok(id)
}

pub fn patient_id_from_path(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GammaError::PatientId(format!("{} has no file name", path.display())))?;
    patient_id_from_filename(name)
}
