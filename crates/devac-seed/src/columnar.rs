//! Columnar container format for relation files
//!
//! Layout of a `.col` file:
//!
//! ```text
//! magic "DVAC"
//! u32  header length
//! ...  bincode FileHeader
//! per column, in header order:
//!   u32  compressed block length
//!   u32  crc32c of the compressed block
//!   ...  zstd(bincode(ColumnData))
//! ```
//!
//! Columns are independent blocks, so projection reads skip the blocks they
//! do not need. Schema evolution is by column name: readers ignore unknown
//! optional columns and reject unknown *required* columns; missing optional
//! columns are filled with defaults by the relation layer.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SeedError;
use crate::layout::{SCHEMA_VERSION, schema_compatible};

const MAGIC: &[u8; 4] = b"DVAC";
const CONTAINER_VERSION: u16 = 1;

/// zstd level; seeds favor write latency over ratio.
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// UTF-8 text; also carries JSON-encoded list/map values.
    Text,
    OptText,
    U32,
    Bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub kind: ColumnKind,
    /// Required columns must be understood by any reader.
    pub required: bool,
}

impl ColumnDesc {
    pub fn new(name: &str, kind: ColumnKind, required: bool) -> Self {
        ColumnDesc {
            name: name.to_string(),
            kind,
            required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Text(Vec<String>),
    OptText(Vec<Option<String>>),
    U32(Vec<u32>),
    Bool(Vec<bool>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::OptText(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileHeader {
    container_version: u16,
    schema_version: String,
    relation: String,
    row_count: u64,
    columns: Vec<ColumnDesc>,
}

/// A decoded relation file: named columns plus the row count.
#[derive(Debug)]
pub struct ColumnTable {
    pub relation: String,
    pub schema_version: String,
    pub row_count: usize,
    columns: HashMap<String, ColumnData>,
}

impl ColumnTable {
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.get(name)
    }

    pub fn text(&self, name: &str, row: usize) -> String {
        match self.columns.get(name) {
            Some(ColumnData::Text(v)) => v.get(row).cloned().unwrap_or_default(),
            Some(ColumnData::OptText(v)) => {
                v.get(row).cloned().flatten().unwrap_or_default()
            }
            _ => String::new(),
        }
    }

    pub fn opt_text(&self, name: &str, row: usize) -> Option<String> {
        match self.columns.get(name) {
            Some(ColumnData::OptText(v)) => v.get(row).cloned().flatten(),
            Some(ColumnData::Text(v)) => v.get(row).cloned().filter(|s| !s.is_empty()),
            _ => None,
        }
    }

    pub fn u32(&self, name: &str, row: usize) -> u32 {
        match self.columns.get(name) {
            Some(ColumnData::U32(v)) => v.get(row).copied().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn bool(&self, name: &str, row: usize) -> bool {
        match self.columns.get(name) {
            Some(ColumnData::Bool(v)) => v.get(row).copied().unwrap_or(false),
            _ => false,
        }
    }
}

/// Encode a relation into container bytes. Column order follows `columns`;
/// every column must have exactly `row_count` values.
pub fn encode(
    relation: &str,
    columns: &[(ColumnDesc, ColumnData)],
) -> Result<Vec<u8>, SeedError> {
    let row_count = columns.first().map(|(_, d)| d.len()).unwrap_or(0);
    for (desc, data) in columns {
        if data.len() != row_count {
            return Err(SeedError::write_failed(format!(
                "column {} has {} rows, expected {row_count}",
                desc.name,
                data.len()
            )));
        }
    }

    let header = FileHeader {
        container_version: CONTAINER_VERSION,
        schema_version: SCHEMA_VERSION.to_string(),
        relation: relation.to_string(),
        row_count: row_count as u64,
        columns: columns.iter().map(|(d, _)| d.clone()).collect(),
    };
    let header_bytes = bincode::serialize(&header)
        .map_err(|e| SeedError::write_failed(format!("header encode: {e}")))?;

    let mut out = Vec::with_capacity(header_bytes.len() + 64);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);

    for (desc, data) in columns {
        let raw = bincode::serialize(data)
            .map_err(|e| SeedError::write_failed(format!("column {} encode: {e}", desc.name)))?;
        let compressed = zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| SeedError::write_failed(format!("column {} compress: {e}", desc.name)))?;
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&crc32c::crc32c(&compressed).to_le_bytes());
        out.extend_from_slice(&compressed);
    }

    Ok(out)
}

/// Decode a relation file, reading only the columns in `projection` (all
/// columns when `projection` is `None`).
pub fn decode_bytes(
    path: &Path,
    bytes: &[u8],
    known: &[ColumnDesc],
    projection: Option<&[&str]>,
) -> Result<ColumnTable, SeedError> {
    let corrupt = |reason: &str| SeedError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if bytes.len() < 8 || &bytes[..4] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let header_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let header_end = 8 + header_len;
    if bytes.len() < header_end {
        return Err(corrupt("truncated header"));
    }
    let header: FileHeader = bincode::deserialize(&bytes[8..header_end])
        .map_err(|_| corrupt("undecodable header"))?;

    if header.container_version != CONTAINER_VERSION {
        return Err(SeedError::SchemaIncompatible {
            found: format!("container v{}", header.container_version),
            expected: format!("container v{CONTAINER_VERSION}"),
        });
    }
    if !schema_compatible(&header.schema_version, SCHEMA_VERSION) {
        return Err(SeedError::SchemaIncompatible {
            found: header.schema_version.clone(),
            expected: SCHEMA_VERSION.to_string(),
        });
    }

    // Forward compatibility: additional optional columns are skipped, but a
    // required column this build does not know is a hard stop.
    for desc in &header.columns {
        if desc.required && !known.iter().any(|k| k.name == desc.name) {
            return Err(SeedError::SchemaIncompatible {
                found: format!("unknown required column {}", desc.name),
                expected: SCHEMA_VERSION.to_string(),
            });
        }
    }

    let mut columns = HashMap::new();
    let mut offset = header_end;
    for desc in &header.columns {
        if bytes.len() < offset + 8 {
            return Err(corrupt("truncated column block"));
        }
        let block_len =
            u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        let expected_crc = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        let block_start = offset + 8;
        let block_end = block_start + block_len;
        if bytes.len() < block_end {
            return Err(corrupt("truncated column block"));
        }
        offset = block_end;

        let wanted = known.iter().any(|k| k.name == desc.name)
            && projection
                .map(|p| p.contains(&desc.name.as_str()))
                .unwrap_or(true);
        if !wanted {
            continue;
        }

        let block = &bytes[block_start..block_end];
        if crc32c::crc32c(block) != expected_crc {
            return Err(corrupt(&format!("checksum mismatch in column {}", desc.name)));
        }
        let raw = zstd::decode_all(block)
            .map_err(|_| corrupt(&format!("decompression failed in column {}", desc.name)))?;
        let data: ColumnData = bincode::deserialize(&raw)
            .map_err(|_| corrupt(&format!("undecodable column {}", desc.name)))?;
        if data.len() != header.row_count as usize {
            return Err(corrupt(&format!("row count mismatch in column {}", desc.name)));
        }
        columns.insert(desc.name.clone(), data);
    }

    Ok(ColumnTable {
        relation: header.relation,
        schema_version: header.schema_version,
        row_count: header.row_count as usize,
        columns,
    })
}

/// Read and decode a relation file. A missing file yields `Ok(None)`:
/// absent partitions contribute zero rows.
pub fn read_file(
    path: &Path,
    known: &[ColumnDesc],
    projection: Option<&[&str]>,
) -> Result<Option<ColumnTable>, SeedError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    decode_bytes(path, &bytes, known, projection).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_columns() -> Vec<(ColumnDesc, ColumnData)> {
        vec![
            (
                ColumnDesc::new("entity_id", ColumnKind::Text, true),
                ColumnData::Text(vec!["a".into(), "b".into()]),
            ),
            (
                ColumnDesc::new("start_line", ColumnKind::U32, false),
                ColumnData::U32(vec![1, 9]),
            ),
            (
                ColumnDesc::new("is_deleted", ColumnKind::Bool, true),
                ColumnData::Bool(vec![false, true]),
            ),
            (
                ColumnDesc::new("documentation", ColumnKind::OptText, false),
                ColumnData::OptText(vec![Some("doc".into()), None]),
            ),
        ]
    }

    fn descs(columns: &[(ColumnDesc, ColumnData)]) -> Vec<ColumnDesc> {
        columns.iter().map(|(d, _)| d.clone()).collect()
    }

    #[test]
    fn round_trip() {
        let columns = sample_columns();
        let bytes = encode("nodes", &columns).unwrap();
        let table = decode_bytes(Path::new("t"), &bytes, &descs(&columns), None).unwrap();

        assert_eq!(table.relation, "nodes");
        assert_eq!(table.row_count, 2);
        assert_eq!(table.text("entity_id", 0), "a");
        assert_eq!(table.u32("start_line", 1), 9);
        assert!(table.bool("is_deleted", 1));
        assert_eq!(table.opt_text("documentation", 0).as_deref(), Some("doc"));
        assert_eq!(table.opt_text("documentation", 1), None);
    }

    #[test]
    fn projection_skips_unrequested_columns() {
        let columns = sample_columns();
        let bytes = encode("nodes", &columns).unwrap();
        let table =
            decode_bytes(Path::new("t"), &bytes, &descs(&columns), Some(&["entity_id"])).unwrap();
        assert!(table.column("entity_id").is_some());
        assert!(table.column("start_line").is_none());
        // Unprojected columns still fall back to defaults.
        assert_eq!(table.u32("start_line", 0), 0);
    }

    #[test]
    fn unknown_optional_column_is_ignored() {
        let mut columns = sample_columns();
        columns.push((
            ColumnDesc::new("added_in_future", ColumnKind::Text, false),
            ColumnData::Text(vec!["x".into(), "y".into()]),
        ));
        let bytes = encode("nodes", &columns).unwrap();
        // Reader's schema does not know the new column.
        let known = descs(&sample_columns());
        let table = decode_bytes(Path::new("t"), &bytes, &known, None).unwrap();
        assert!(table.column("added_in_future").is_none());
        assert_eq!(table.text("entity_id", 1), "b");
    }

    #[test]
    fn unknown_required_column_is_rejected() {
        let mut columns = sample_columns();
        columns.push((
            ColumnDesc::new("mandatory_future", ColumnKind::Text, true),
            ColumnData::Text(vec!["x".into(), "y".into()]),
        ));
        let bytes = encode("nodes", &columns).unwrap();
        let known = descs(&sample_columns());
        let err = decode_bytes(Path::new("t"), &bytes, &known, None).unwrap_err();
        assert!(matches!(err, SeedError::SchemaIncompatible { .. }));
    }

    #[test]
    fn corruption_is_detected() {
        let columns = sample_columns();
        let mut bytes = encode("nodes", &columns).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = decode_bytes(Path::new("t"), &bytes, &descs(&columns), None).unwrap_err();
        assert!(matches!(err, SeedError::Corrupt { .. }));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let columns = sample_columns();
        let table = read_file(Path::new("/nonexistent/nodes.col"), &descs(&columns), None).unwrap();
        assert!(table.is_none());
    }

    #[test]
    fn mismatched_column_lengths_refuse_to_encode() {
        let mut columns = sample_columns();
        columns[1].1 = ColumnData::U32(vec![1]);
        assert!(encode("nodes", &columns).is_err());
    }
}
