use std::{fs::File, io, path::Path};

use super::InstallError;

const MAX_ZIP_ENTRIES: usize = 10_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 4 * 1024 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// Bounds applied while unpacking a model archive.
///
/// Weight files are often zero-padded and compress extremely well, so the
/// per-entry compression ratio is only checked when a limit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_entries: usize,
    pub max_entry_uncompressed_bytes: u64,
    pub max_total_uncompressed_bytes: u64,
    pub max_compression_ratio: Option<u64>,
}

impl ExtractionLimits {
    pub fn standard() -> Self {
        Self {
            max_entries: MAX_ZIP_ENTRIES,
            max_entry_uncompressed_bytes: MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES,
            max_total_uncompressed_bytes: MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES,
            max_compression_ratio: None,
        }
    }
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self::standard()
    }
}

/// Unpack `archive` into `dest_dir`, returning how many entries were written.
///
/// Every limit is checked against the central directory before the first
/// file is written. Entries whose names would land outside `dest_dir` are
/// skipped.
pub(super) fn extract_zip(
    archive: File,
    dest_dir: &Path,
    limits: ExtractionLimits,
) -> Result<usize, InstallError> {
    let mut archive = zip::ZipArchive::new(archive)
        .map_err(|err| failed(format!("Not a valid zip archive: {err}")))?;
    check_limits(&mut archive, limits)?;

    let mut written = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| failed(format!("Unreadable entry #{i}: {err}")))?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe archive entry '{}'", entry.name());
            continue;
        };
        let outpath = dest_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|err| write_failed(&outpath, err))?;
            written += 1;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|err| write_failed(parent, err))?;
        }
        let mut outfile = File::create(&outpath).map_err(|err| write_failed(&outpath, err))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| write_failed(&outpath, err))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(
                    &outpath,
                    std::fs::Permissions::from_mode(safe_unix_file_mode(mode)),
                )
                .map_err(|err| write_failed(&outpath, err))?;
            }
        }
        written += 1;
    }
    Ok(written)
}

fn check_limits(
    archive: &mut zip::ZipArchive<File>,
    limits: ExtractionLimits,
) -> Result<(), InstallError> {
    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(failed(format!(
            "Archive has {entry_count} entries, limit is {}",
            limits.max_entries
        )));
    }
    let mut total_uncompressed: u64 = 0;
    for i in 0..entry_count {
        let entry = archive
            .by_index_raw(i)
            .map_err(|err| failed(format!("Unreadable entry #{i}: {err}")))?;
        let uncompressed_size = entry.size();
        if uncompressed_size > limits.max_entry_uncompressed_bytes {
            return Err(failed(format!(
                "Entry '{}' is too large ({} bytes, limit {})",
                entry.name(),
                uncompressed_size,
                limits.max_entry_uncompressed_bytes
            )));
        }
        if let Some(max_ratio) = limits.max_compression_ratio {
            if uncompressed_size > 0 {
                let compressed_size = entry.compressed_size();
                if compressed_size == 0 {
                    return Err(failed(format!(
                        "Entry '{}' has zero compressed size",
                        entry.name()
                    )));
                }
                if uncompressed_size > compressed_size.saturating_mul(max_ratio) {
                    return Err(failed(format!(
                        "Entry '{}' exceeds compression ratio limit",
                        entry.name()
                    )));
                }
            }
        }
        total_uncompressed = total_uncompressed
            .checked_add(uncompressed_size)
            .ok_or_else(|| failed("Archive size overflow".into()))?;
        if total_uncompressed > limits.max_total_uncompressed_bytes {
            return Err(failed(format!(
                "Extracted size {} exceeds limit {}",
                total_uncompressed, limits.max_total_uncompressed_bytes
            )));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn safe_unix_file_mode(archive_mode: u32) -> u32 {
    if archive_mode & 0o111 != 0 { 0o755 } else { 0o644 }
}

fn failed(message: String) -> InstallError {
    InstallError::ExtractionFailed(message)
}

fn write_failed(path: &Path, err: io::Error) -> InstallError {
    failed(format!("Writing {} failed: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn open(path: &Path) -> File {
        File::open(path).unwrap()
    }

    #[test]
    fn extracts_nested_entries() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("model.zip");
        write_zip(
            &zip_path,
            &[("model.onnx", b"graph"), ("tokenizer/vocab.txt", b"a b c")],
        );
        let out = temp.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let written = extract_zip(open(&zip_path), &out, ExtractionLimits::standard()).unwrap();

        assert_eq!(written, 2);
        assert_eq!(std::fs::read(out.join("model.onnx")).unwrap(), b"graph");
        assert_eq!(
            std::fs::read(out.join("tokenizer").join("vocab.txt")).unwrap(),
            b"a b c"
        );
    }

    #[test]
    fn rejects_non_zip_input() {
        let temp = tempdir().unwrap();
        let bogus = temp.path().join("bogus.zip");
        std::fs::write(&bogus, b"this is not a zip").unwrap();
        let err = extract_zip(open(&bogus), temp.path(), ExtractionLimits::standard()).unwrap_err();
        assert!(matches!(err, InstallError::ExtractionFailed(_)));
    }

    #[test]
    fn empty_archive_writes_nothing() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("empty.zip");
        write_zip(&zip_path, &[]);
        let out = temp.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let written = extract_zip(open(&zip_path), &out, ExtractionLimits::standard()).unwrap();
        assert_eq!(written, 0);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn skips_entries_escaping_destination() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("escape.zip");
        write_zip(&zip_path, &[("../evil.txt", b"x"), ("ok.txt", b"y")]);
        let out = temp.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let written = extract_zip(open(&zip_path), &out, ExtractionLimits::standard()).unwrap();

        assert_eq!(written, 1);
        assert!(out.join("ok.txt").exists());
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[test]
    fn rejects_entry_over_size_limit() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("oversize.zip");
        write_zip(&zip_path, &[("big.bin", &[1u8; 8])]);
        let limits = ExtractionLimits {
            max_entries: 10,
            max_entry_uncompressed_bytes: 4,
            max_total_uncompressed_bytes: 100,
            max_compression_ratio: None,
        };
        let err = extract_zip(open(&zip_path), temp.path(), limits).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn rejects_too_many_entries() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("many.zip");
        write_zip(&zip_path, &[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let limits = ExtractionLimits {
            max_entries: 2,
            ..ExtractionLimits::standard()
        };
        let err = extract_zip(open(&zip_path), temp.path(), limits).unwrap_err();
        assert!(err.to_string().contains("entries"));
    }

    #[test]
    fn rejects_suspicious_compression_ratio() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("ratio.zip");
        let data = vec![b'a'; 2048];
        write_zip(&zip_path, &[("dense.txt", data.as_slice())]);
        let limits = ExtractionLimits {
            max_compression_ratio: Some(2),
            ..ExtractionLimits::standard()
        };
        let err = extract_zip(open(&zip_path), temp.path(), limits).unwrap_err();
        assert!(err.to_string().contains("compression ratio"));
    }

    #[test]
    fn limit_breach_in_a_later_entry_writes_nothing() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("late.zip");
        let big = vec![0u8; 64];
        write_zip(&zip_path, &[("config.json", b"{}"), ("weights.bin", big.as_slice())]);
        let out = temp.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let limits = ExtractionLimits {
            max_entry_uncompressed_bytes: 16,
            ..ExtractionLimits::standard()
        };

        let err = extract_zip(open(&zip_path), &out, limits).unwrap_err();

        assert!(err.to_string().contains("weights.bin"));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn zero_filled_payload_extracts_with_standard_limits() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("sparse.zip");
        let zeros = vec![0u8; 4 * 1024 * 1024];
        write_zip(&zip_path, &[("weights.bin", zeros.as_slice())]);
        let out = temp.path().join("out");

        let written = extract_zip(open(&zip_path), &out, ExtractionLimits::standard()).unwrap();

        assert_eq!(written, 1);
        assert_eq!(
            std::fs::metadata(out.join("weights.bin")).unwrap().len(),
            zeros.len() as u64
        );
    }

    #[cfg(unix)]
    #[test]
    fn strips_unsafe_permissions() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("perms.zip");
        let file = File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data, mode) in [("bin/run", b"run", 0o7777), ("data/cfg", b"cfg", 0o6666)] {
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(mode);
            zip.start_file(name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
        let out = temp.path().join("out");

        extract_zip(open(&zip_path), &out, ExtractionLimits::standard()).unwrap();

        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode(&out.join("bin/run")), 0o755);
        assert_eq!(mode(&out.join("data/cfg")), 0o644);
    }
}
