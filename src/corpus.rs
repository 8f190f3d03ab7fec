use crate::error::{AppError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// One source unit of a corpus with the fields of the row it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The text that gets chunked and embedded
    pub content: String,
    /// Every field of the source row plus loader bookkeeping
    pub metadata: Map<String, Value>,
}

impl Record {
    pub fn new(content: impl Into<String>) -> Self {
        Record {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An image discovered in a corpus directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub path: PathBuf,
    pub media_type: String,
}

/// Load a JSON array of objects, taking each record's text from `content_key`.
///
/// The whole object is kept as metadata along with `source` and `seq_num`.
pub fn load_json_records<P: AsRef<Path>>(file_path: P, content_key: &str) -> Result<Vec<Record>> {
    let path = file_path.as_ref();
    info!("Loading JSON corpus: {}", path.display());

    let raw = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
        AppError::input(format!("{} is not valid JSON: {}", path.display(), e))
    })?;

    let Value::Array(rows) = parsed else {
        return Err(AppError::input(format!(
            "{} must contain a JSON array of objects",
            path.display()
        )));
    };

    let mut records = Vec::with_capacity(rows.len());
    for (seq, row) in rows.into_iter().enumerate() {
        let Value::Object(mut fields) = row else {
            return Err(AppError::input(format!(
                "entry {} of {} is not an object",
                seq,
                path.display()
            )));
        };

        let content = match fields.get(content_key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) | None => {
                return Err(AppError::input(format!(
                    "entry {} of {} has no text field {:?}",
                    seq,
                    path.display(),
                    content_key
                )))
            }
        };

        fields.insert(
            "source".to_string(),
            Value::String(path.display().to_string()),
        );
        fields.insert("seq_num".to_string(), Value::from(seq + 1));

        records.push(Record {
            content,
            metadata: fields,
        });
    }

    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Load a CSV file with a header row; each row becomes `header: value` lines
pub fn load_csv_records<P: AsRef<Path>>(file_path: P) -> Result<Vec<Record>> {
    let path = file_path.as_ref();
    info!("Loading CSV corpus: {}", path.display());

    let file = fs::File::open(path).map_err(|e| AppError::io(path, e))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("{} has no readable header: {}", path.display(), e)))?
        .clone();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let fields = result.map_err(|e| {
            AppError::input(format!("row {} of {} is malformed: {}", row, path.display(), e))
        })?;

        let content = headers
            .iter()
            .zip(fields.iter())
            .map(|(header, value)| format!("{}: {}", header.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        records.push(
            Record::new(content)
                .with_metadata("source", path.display().to_string())
                .with_metadata("row", row),
        );
    }

    info!("Loaded {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// List the images in a directory, sorted by path.
///
/// A missing directory is an error, not an empty corpus.
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<ImageFile>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(AppError::input(format!(
            "directory '{}' does not exist",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir).map_err(|e| AppError::io(dir, e))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| AppError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }

        let mime = from_path(&path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            warn!("Skipping non-image file: {}", path.display());
            continue;
        }

        debug!("Found image {} ({})", path.display(), mime);
        images.push(ImageFile {
            path,
            media_type: mime.to_string(),
        });
    }

    images.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Found {} images in {}", images.len(), dir.display());
    Ok(images)
}

/// Read an image file and detect its media type
pub fn read_image<P: AsRef<Path>>(file_path: P) -> Result<(Vec<u8>, String)> {
    let path = file_path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| AppError::input(format!("cannot read image {}: {}", path.display(), e)))?;
    if bytes.is_empty() {
        return Err(AppError::input(format!(
            "image {} is empty",
            path.display()
        )));
    }

    let media_type = from_path(path).first_or_octet_stream().to_string();
    Ok((bytes, media_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_json_records_keeps_row_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.json");
        fs::write(
            &path,
            r#"[{"log": "disk usage at 95%", "level": "WARN"}, {"log": "login succeeded", "level": "INFO"}]"#,
        )
        .unwrap();

        let records = load_json_records(&path, "log").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "disk usage at 95%");
        assert_eq!(records[0].metadata["level"], "WARN");
        assert_eq!(records[1].metadata["seq_num"], 2);
    }

    #[test]
    fn test_load_json_records_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoices.json");
        fs::write(&path, r#"[{"amount": 10}]"#).unwrap();

        let err = load_json_records(&path, "invoice_id").unwrap_err();
        assert!(matches!(err, AppError::InputValidation { .. }));
    }

    #[test]
    fn test_load_json_records_missing_file() {
        let err = load_json_records("/nonexistent/corpus.json", "log").unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }

    #[test]
    fn test_load_csv_records_formats_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge_base.csv");
        fs::write(
            &path,
            "question,answer\nHow many vacation days?,25 days per year\nWho runs payroll?,The finance team\n",
        )
        .unwrap();

        let records = load_csv_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].content,
            "question: How many vacation days?\nanswer: 25 days per year"
        );
        assert_eq!(records[1].metadata["row"], 1);
    }

    #[test]
    fn test_list_images_missing_directory() {
        let err = list_images("./definitely-not-here/images").unwrap_err();
        assert!(matches!(err, AppError::InputValidation { .. }));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_list_images_skips_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.png"), [1u8, 2, 3]).unwrap();
        fs::write(dir.path().join("a.jpg"), [4u8, 5, 6]).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let images = list_images(dir.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].path.ends_with("a.jpg"));
        assert_eq!(images[0].media_type, "image/jpeg");
        assert_eq!(images[1].media_type, "image/png");
    }

    #[test]
    fn test_read_image_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.png");
        fs::write(&path, b"").unwrap();
        assert!(matches!(
            read_image(&path).unwrap_err(),
            AppError::InputValidation { .. }
        ));
    }
}
