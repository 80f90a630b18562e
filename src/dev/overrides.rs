//! Build configuration layering.

use std::path::Path;

use toml::{Table, Value};

use crate::dispatch::DispatchError;

/// Deep-merge `overlay` into `base`. Tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        if let Value::Table(incoming) = value {
            if let Some(Value::Table(existing)) = base.get_mut(&key) {
                merge(existing, incoming);
                continue;
            }
            base.insert(key, Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Read a tenant override file. A missing file is not an error.
pub async fn load_override(path: &Path) -> Result<Option<Table>, DispatchError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw
            .parse::<Table>()
            .map(Some)
            .map_err(|e| DispatchError::load(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DispatchError::Io(e)),
    }
}
