//! Zip export of a file set.

use std::io::{self, Cursor, Write};

use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Writes every `(path, content)` pair under `<root>/` into an in-memory
/// zip archive, in iteration order.
pub fn zip<'a>(
    root: &str,
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> io::Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in files {
        writer.start_file(format!("{root}/{path}"), options)?;
        writer.write_all(content.as_bytes())?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Directory name used inside the archive: the project name with path
/// separators and other awkward characters replaced.
pub fn root_name(project_name: &str) -> String {
    let cleaned: String = project_name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "project".to_owned()
    } else {
        cleaned.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn archive_contains_every_file_under_root() -> anyhow::Result<()> {
        let bytes = zip("demo", [("a.ts", "let x=1;"), ("src/b.ts", "export {};\n")])?;
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        assert_eq!(archive.len(), 2);

        let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
        names.sort();
        assert_eq!(names, vec!["demo/a.ts", "demo/src/b.ts"]);

        let mut content = String::new();
        archive.by_name("demo/a.ts")?.read_to_string(&mut content)?;
        assert_eq!(content, "let x=1;");
        Ok(())
    }

    #[test]
    fn root_name_replaces_separators() {
        assert_eq!(root_name("my-app"), "my-app");
        assert_eq!(root_name("../evil/name"), "-evil-name");
        assert_eq!(root_name("My App"), "My-App");
        assert_eq!(root_name("  "), "project");
        assert_eq!(root_name(".."), "project");
    }
}
