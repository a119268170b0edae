//! Locating the PDF to index: local files under the data directory, or a URL
//! downloaded into it.

use reqwest::Url;
use std::fs::{self, File};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::AcquisitionError;

const FALLBACK_FILE_NAME: &str = "downloaded.pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Local(PathBuf),
    Url(String),
}

impl DocumentSource {
    /// `http(s)://` arguments are URLs; anything else is a path, looked up
    /// under `data_dir` when it does not exist as given.
    pub fn parse(arg: &str, data_dir: &Path) -> Self {
        let lower = arg.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Self::Url(arg.to_string());
        }
        let path = PathBuf::from(arg);
        if !path.exists() && data_dir.join(&path).exists() {
            return Self::Local(data_dir.join(path));
        }
        Self::Local(path)
    }
}

/// Sorted names of `*.pdf` files in `dir`, creating `dir` if needed.
pub fn list_local_pdfs(dir: &Path) -> Result<Vec<String>, AcquisitionError> {
    fs::create_dir_all(dir)?;
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".pdf") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    text: &str,
) -> Result<String, AcquisitionError> {
    write!(out, "{}", text)?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Shows the source menu. `None` means the user chose to exit.
pub fn select_source<R: BufRead, W: Write>(
    mut input: R,
    out: &mut W,
    data_dir: &Path,
) -> Result<Option<DocumentSource>, AcquisitionError> {
    writeln!(out, "Select PDF source:")?;
    writeln!(out, "  1) Local file in {}", data_dir.display())?;
    writeln!(out, "  2) Link (URL)")?;
    writeln!(out, "  3) Exit")?;
    let choice = prompt(&mut input, out, "Enter 1, 2 or 3 [default 1]: ")?;

    match choice.as_str() {
        "3" => Ok(None),
        "2" => loop {
            let url = prompt(&mut input, out, "Enter PDF URL: ")?;
            if !url.is_empty() {
                return Ok(Some(DocumentSource::Url(url)));
            }
            writeln!(out, "URL is required.")?;
        },
        _ => choose_local_pdf(input, out, data_dir).map(|path| Some(DocumentSource::Local(path))),
    }
}

/// Numbered picker over the PDFs in `data_dir`. Blank picks the first entry;
/// a number picks by position; anything else is taken as a file name.
pub fn choose_local_pdf<R: BufRead, W: Write>(
    mut input: R,
    out: &mut W,
    data_dir: &Path,
) -> Result<PathBuf, AcquisitionError> {
    let files = list_local_pdfs(data_dir)?;
    if files.is_empty() {
        let name = prompt(
            &mut input,
            out,
            &format!(
                "No PDFs found in {}. Enter a filename to use (will look under {}): ",
                data_dir.display(),
                data_dir.display()
            ),
        )?;
        return Ok(data_dir.join(name));
    }

    writeln!(out, "Available PDFs in {}:", data_dir.display())?;
    for (i, name) in files.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, name)?;
    }
    let choice = prompt(
        &mut input,
        out,
        &format!("Enter number or name [1-{}] (default 1): ", files.len()),
    )?;

    let name = if choice.is_empty() {
        files[0].clone()
    } else {
        match choice.parse::<usize>() {
            Ok(n) if (1..=files.len()).contains(&n) => files[n - 1].clone(),
            _ => choice,
        }
    };
    Ok(data_dir.join(name))
}

/// File name for a downloaded PDF: the `fileName` query parameter, else the
/// last path segment, else `downloaded.pdf`; always ends in `.pdf`.
pub fn filename_from_url(url: &str) -> Result<String, AcquisitionError> {
    let parsed = Url::parse(url).map_err(|e| AcquisitionError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let from_query = parsed
        .query_pairs()
        .find(|(key, _)| key == "fileName")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    let from_path = || {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
    };

    // Decoded names may carry path separators; keep only the final component.
    let mut name = from_query
        .or_else(from_path)
        .and_then(|name| final_component(&name).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    if !name.to_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    Ok(name)
}

/// Last path component that names a file, ignoring empty, `.` and `..` parts.
fn final_component(name: &str) -> Option<&str> {
    name.rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
}

/// `dir/name`, or `dir/stem_1.ext`, `dir/stem_2.ext`, ... if taken.
pub fn unique_target(dir: &Path, name: &str) -> PathBuf {
    let target = dir.join(name);
    if !target.exists() {
        return target;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|i| dir.join(format!("{}_{}{}", stem, i, ext)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(target)
}

/// Downloads `url` into `dest_dir`, returning the saved path.
pub fn download_pdf(
    url: &str,
    dest_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, AcquisitionError> {
    fs::create_dir_all(dest_dir)?;
    let target = unique_target(dest_dir, &filename_from_url(url)?);

    let http_err = |source| AcquisitionError::Http {
        url: url.to_string(),
        source,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(http_err)?;

    info!(url, "Downloading PDF");
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(http_err)?;

    let mut file = File::create(&target)?;
    if let Err(e) = response.copy_to(&mut file) {
        drop(file);
        let _ = fs::remove_file(&target);
        return Err(http_err(e));
    }

    debug!(path = %target.display(), "Download complete");
    Ok(target)
}

/// Turns a source into an existing local path, downloading if needed.
pub fn resolve<W: Write>(
    source: &DocumentSource,
    data_dir: &Path,
    timeout: Duration,
    out: &mut W,
) -> Result<PathBuf, AcquisitionError> {
    let path = match source {
        DocumentSource::Local(path) => path.clone(),
        DocumentSource::Url(url) => {
            writeln!(out, "Downloading PDF ...")?;
            let path = download_pdf(url, data_dir, timeout)?;
            writeln!(out, "Saved to {}", path.display())?;
            path
        }
    };
    if !path.is_file() {
        return Err(AcquisitionError::NotFound(path));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"%PDF-1.4").unwrap();
    }

    #[test]
    fn test_filename_from_query_parameter() {
        let url = "https://example.com/download?id=7&fileName=Annual%20Report";
        let name = filename_from_url(url).unwrap();
        assert_eq!(name, "Annual Report.pdf");
    }

    #[test]
    fn test_filename_from_path() {
        assert_eq!(
            filename_from_url("https://example.com/docs/my%20paper.PDF").unwrap(),
            "my paper.PDF"
        );
        assert_eq!(
            filename_from_url("https://example.com/files/report").unwrap(),
            "report.pdf"
        );
    }

    #[test]
    fn test_filename_fallback() {
        assert_eq!(
            filename_from_url("https://example.com/").unwrap(),
            FALLBACK_FILE_NAME
        );
        assert_eq!(
            filename_from_url("https://example.com/?fileName=").unwrap(),
            FALLBACK_FILE_NAME
        );
        assert_eq!(
            filename_from_url("https://example.com/get?fileName=").unwrap(),
            "get.pdf"
        );
    }

    #[test]
    fn test_filename_drops_directory_parts() {
        for url in [
            "https://example.com/get?fileName=..%2F..%2Fetc%2Fx%2F",
            "https://example.com/get?fileName=..%5C..%5Cwindows%5Cx",
            "https://example.com/files/..%2F..%2Fsecret.pdf",
        ] {
            let name = filename_from_url(url).unwrap();
            assert!(!name.contains('/') && !name.contains('\\'), "{url} -> {name}");
            assert_ne!(name, "..");
            let temp = TempDir::new().unwrap();
            assert_eq!(unique_target(temp.path(), &name).parent(), Some(temp.path()));
        }
        assert_eq!(
            filename_from_url("https://example.com/get?fileName=..%2F..%2Fetc%2Fx%2F").unwrap(),
            "x.pdf"
        );
        assert_eq!(
            filename_from_url("https://example.com/get?fileName=..%2F.%2F").unwrap(),
            FALLBACK_FILE_NAME
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            filename_from_url("not a url"),
            Err(AcquisitionError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_unique_target_counts_up() {
        let temp = TempDir::new().unwrap();
        assert_eq!(unique_target(temp.path(), "a.pdf"), temp.path().join("a.pdf"));
        touch(temp.path(), "a.pdf");
        touch(temp.path(), "a_1.pdf");
        assert_eq!(unique_target(temp.path(), "a.pdf"), temp.path().join("a_2.pdf"));
    }

    #[test]
    fn test_list_local_pdfs_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("data");
        assert!(list_local_pdfs(&dir).unwrap().is_empty());
        assert!(dir.is_dir());

        touch(&dir, "zeta.pdf");
        touch(&dir, "alpha.pdf");
        touch(&dir, "notes.txt");
        fs::create_dir(dir.join("folder.pdf")).unwrap();
        assert_eq!(list_local_pdfs(&dir).unwrap(), vec!["alpha.pdf", "zeta.pdf"]);
    }

    #[test]
    fn test_choose_local_pdf_by_default_number_and_name() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.pdf");
        touch(temp.path(), "b.pdf");

        let mut out = Vec::new();
        let path = choose_local_pdf(Cursor::new("\n"), &mut out, temp.path()).unwrap();
        assert_eq!(path, temp.path().join("a.pdf"));

        let path = choose_local_pdf(Cursor::new("2\n"), &mut out, temp.path()).unwrap();
        assert_eq!(path, temp.path().join("b.pdf"));

        let path = choose_local_pdf(Cursor::new("9\n"), &mut out, temp.path()).unwrap();
        assert_eq!(path, temp.path().join("9"));

        let path = choose_local_pdf(Cursor::new("other.pdf\n"), &mut out, temp.path()).unwrap();
        assert_eq!(path, temp.path().join("other.pdf"));
    }

    #[test]
    fn test_choose_local_pdf_when_none_present() {
        let temp = TempDir::new().unwrap();
        let mut out = Vec::new();
        let path = choose_local_pdf(Cursor::new("manual.pdf\n"), &mut out, temp.path()).unwrap();
        assert_eq!(path, temp.path().join("manual.pdf"));
        assert!(String::from_utf8(out).unwrap().contains("No PDFs found"));
    }

    #[test]
    fn test_select_source_menu() {
        let temp = TempDir::new().unwrap();
        let mut out = Vec::new();

        assert_eq!(select_source(Cursor::new("3\n"), &mut out, temp.path()).unwrap(), None);

        let source = select_source(
            Cursor::new("2\n\nhttps://example.com/a.pdf\n"),
            &mut out,
            temp.path(),
        )
        .unwrap();
        assert_eq!(
            source,
            Some(DocumentSource::Url("https://example.com/a.pdf".to_string()))
        );
        assert!(String::from_utf8(out.clone()).unwrap().contains("URL is required."));

        touch(temp.path(), "only.pdf");
        let source = select_source(Cursor::new("\n\n"), &mut out, temp.path()).unwrap();
        assert_eq!(
            source,
            Some(DocumentSource::Local(temp.path().join("only.pdf")))
        );
    }

    #[test]
    fn test_parse_source() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "in_data.pdf");

        assert_eq!(
            DocumentSource::parse("HTTPS://example.com/x.pdf", temp.path()),
            DocumentSource::Url("HTTPS://example.com/x.pdf".to_string())
        );
        assert_eq!(
            DocumentSource::parse("in_data.pdf", temp.path()),
            DocumentSource::Local(temp.path().join("in_data.pdf"))
        );
        assert_eq!(
            DocumentSource::parse("elsewhere.pdf", temp.path()),
            DocumentSource::Local(PathBuf::from("elsewhere.pdf"))
        );
    }

    #[test]
    fn test_resolve_missing_local_file() {
        let temp = TempDir::new().unwrap();
        let source = DocumentSource::Local(temp.path().join("missing.pdf"));
        let err =
            resolve(&source, temp.path(), Duration::from_secs(1), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, AcquisitionError::NotFound(_)));
        assert_eq!(
            err.to_string(),
            format!("PDF not found: {}", temp.path().join("missing.pdf").display())
        );
    }

    #[test]
    fn test_resolve_existing_local_file() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "here.pdf");
        let source = DocumentSource::Local(temp.path().join("here.pdf"));
        let path = resolve(&source, temp.path(), Duration::from_secs(1), &mut Vec::new()).unwrap();
        assert_eq!(path, temp.path().join("here.pdf"));
    }
}
