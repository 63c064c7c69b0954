use crate::core::model::DocumentRecord;
use crate::error::{Result, ScanError};
use crate::export::Exporter;

#[derive(Debug, Clone, Default)]
pub struct JsonExporter;

impl JsonExporter {
    pub fn new() -> Self {
        Self
    }
}

impl Exporter for JsonExporter {
    fn render(&self, document: &DocumentRecord) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(document).map_err(|e| ScanError::Export(e.to_string()))
    }
}
