use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected when sniffing for binary content.
const SNIFF_LEN: usize = 1024;

// Simple binary check
fn is_binary(data: &[u8]) -> bool {
    data.iter().take(SNIFF_LEN).any(|&b| b == 0)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Reads the text to summarize from a file. PDFs go through text
/// extraction; other files must be text.
pub fn read_file(path: &Path) -> Result<String> {
    if is_pdf(path) {
        log::debug!("Extracting text from PDF {}", path.display());
        return pdf_extract::extract_text(path)
            .map_err(|e| anyhow!("Failed to extract text from {}: {}", path.display(), e));
    }

    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if is_binary(&bytes) {
        bail!("{} looks like a binary file", path.display());
    }
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(text)
}

pub fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read from stdin")?;
    Ok(text)
}

/// `--text` wins over `--file`, which wins over stdin.
pub fn resolve(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => read_file(path),
        (None, None) => read_stdin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn text_argument_wins() {
        let text = resolve(Some("inline".into()), Some(Path::new("/does/not/exist"))).unwrap();
        assert_eq!(text, "inline");
    }

    #[test]
    fn reads_plain_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Meeting moved to Thursday.\n").unwrap();

        assert_eq!(
            resolve(None, Some(&path)).unwrap(),
            "Meeting moved to Thursday.\n"
        );
    }

    #[test]
    fn rejects_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, [0x89, b'P', b'N', b'G', 0x00, 0x01]).unwrap();

        let err = read_file(&path).unwrap_err();
        assert!(err.to_string().contains("binary"));
    }

    #[test]
    fn null_byte_after_sniff_window_is_not_binary() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0);
        assert!(!is_binary(&data));
        assert!(is_binary(b"ab\0cd"));
    }

    #[test]
    fn pdf_detection_ignores_case() {
        assert!(is_pdf(Path::new("report.PDF")));
        assert!(is_pdf(Path::new("a/b/report.pdf")));
        assert!(!is_pdf(Path::new("report.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_file(Path::new("/no/such/input.txt")).unwrap_err();
        assert!(err.to_string().contains("/no/such/input.txt"));
    }
}
