
use anyhow::Context;
use std::io::{BufWriter, Write};
use std::fs::File;
use std::path::Path;

/// Saves a serializable value as pretty JSON, gzip-compressed when the path ends in `.gz`.
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let file: Box<dyn std::io::Write> = if out_filename.extension().unwrap_or_default() == "gz" {
        Box::new(
            flate2::write::GzEncoder::new(
                File::create(out_filename)?,
                flate2::Compression::best()
            )
        )
    } else {
        Box::new(File::create(out_filename)?)
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    writer.flush()
        .with_context(|| format!("Error while flushing output to {out_filename:?}:"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[derive(serde::Serialize)]
    struct Record {
        k: usize,
        objective: f64
    }

    #[test]
    fn test_save_json_gz() {
        let filename = std::env::temp_dir().join("strainmix_test_records.json.gz");
        save_json(&vec![Record { k: 2, objective: 0.4 }], &filename).unwrap();

        let mut text = String::new();
        flate2::read::MultiGzDecoder::new(File::open(&filename).unwrap())
            .read_to_string(&mut text).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["k"], 2);
        assert_eq!(value[0]["objective"], 0.4);
        std::fs::remove_file(&filename).unwrap();
    }
}
