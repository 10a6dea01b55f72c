//! In-memory OOXML package: zip entry name → bytes

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::workbook::WorkbookError;

#[derive(Clone, Debug, Default)]
pub(crate) struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            // Tolerate producers that root entry names with `/` or use `\`.
            let name = file
                .name()
                .trim_start_matches(|c| c == '/' || c == '\\')
                .replace('\\', "/");
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            parts.insert(name, buf);
        }

        Ok(Self { parts })
    }

    pub(crate) fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub(crate) fn require_part(&self, name: &str) -> Result<&[u8], WorkbookError> {
        self.part(name)
            .ok_or_else(|| WorkbookError::MissingPart(name.to_string()))
    }

    pub(crate) fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub(crate) fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    pub(crate) fn write_to_vec(&self) -> Result<Vec<u8>, WorkbookError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            zip::write::FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        // BTreeMap order puts `[Content_Types].xml` first, which some readers expect.
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}
