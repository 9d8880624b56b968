//! On-disk layout of an exported model and the atomic writer that produces it.
//!
//! A bundle directory contains the label vocabulary, the tokenizer, the
//! encoder config and one weights file. It is written into a staging
//! directory next to the target. A new target is created by renaming the
//! staging directory; an existing one gets its bundle files replaced one by
//! one, and any other file in it is left alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use crate::labels::LABEL_NAMES_FILE;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";
pub const SAFETENSORS_FILE: &str = "model.safetensors";
pub const ONNX_FILE: &str = "model.onnx";

/// Every file name a bundle may contain. Committing over an existing
/// directory touches these names and nothing else.
pub const BUNDLE_FILES: [&str; 5] = [LABEL_NAMES_FILE, TOKENIZER_FILE, CONFIG_FILE, SAFETENSORS_FILE, ONNX_FILE];

/// Which runtime can execute the weights found in a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    Safetensors,
    Onnx,
}

impl WeightsFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Safetensors => SAFETENSORS_FILE,
            Self::Onnx => ONNX_FILE,
        }
    }
}

/// Paths of the files inside one bundle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn label_names(&self) -> PathBuf {
        self.root.join(LABEL_NAMES_FILE)
    }

    pub fn tokenizer(&self) -> PathBuf {
        self.root.join(TOKENIZER_FILE)
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn weights(&self, format: WeightsFormat) -> PathBuf {
        self.root.join(format.file_name())
    }

    /// Detects the weights format, preferring safetensors when both exist.
    pub fn weights_format(&self) -> Option<WeightsFormat> {
        [WeightsFormat::Safetensors, WeightsFormat::Onnx]
            .into_iter()
            .find(|format| self.weights(*format).is_file())
    }
}

/// Writes a bundle through a staging directory.
///
/// ```no_run
/// use emotion_classifier::bundle::BundleWriter;
///
/// # fn main() -> std::io::Result<()> {
/// let writer = BundleWriter::new("./exported_emotion_model")?;
/// std::fs::write(writer.staging().label_names(), r#"["joy"]"#)?;
/// writer.commit()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BundleWriter {
    target: PathBuf,
    staging: BundleLayout,
    committed: bool,
}

impl BundleWriter {
    pub fn new<P: AsRef<Path>>(target: P) -> io::Result<Self> {
        let target = resolve_target(target.as_ref())?;
        if target.exists() && !target.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", target.display()),
            ));
        }

        let (parent, name) = match (target.parent(), target.file_name()) {
            (Some(parent), Some(name)) => (parent, name.to_string_lossy()),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot export a bundle to {}", target.display()),
                ))
            }
        };
        let staging_dir = parent.join(format!(".{}.staging-{}", name, std::process::id()));

        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }
        fs::create_dir_all(&staging_dir)?;
        log::info!("Staging bundle in {:?}", staging_dir);

        Ok(Self {
            target,
            staging: BundleLayout::new(staging_dir),
            committed: false,
        })
    }

    pub fn staging(&self) -> &BundleLayout {
        &self.staging
    }

    /// Absolute path the bundle is committed to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Moves the staged files into the target directory.
    ///
    /// Bundle files the new bundle does not contain (for example the weights
    /// of another format) are removed from an existing target so the two
    /// bundles never mix.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        if !self.target.exists() {
            fs::rename(self.staging.root(), &self.target)?;
        } else {
            log::warn!("Replacing bundle files in existing directory {:?}", self.target);
            for name in BUNDLE_FILES {
                let staged = self.staging.root().join(name);
                let existing = self.target.join(name);
                if staged.is_file() {
                    fs::rename(&staged, &existing)?;
                } else if existing.is_file() {
                    fs::remove_file(&existing)?;
                }
            }
            fs::remove_dir_all(self.staging.root())?;
        }
        self.committed = true;
        log::info!("Bundle written to {:?}", self.target);
        Ok(self.target.clone())
    }
}

/// Turns `target` into an absolute path with a real final component, so
/// `.` and `..` name the directory they point at.
fn resolve_target(target: &Path) -> io::Result<PathBuf> {
    if target.exists() {
        return fs::canonicalize(target);
    }
    let name = target.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot export a bundle to {}", target.display()),
        )
    })?;
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    Ok(fs::canonicalize(parent)?.join(name))
}

impl Drop for BundleWriter {
    fn drop(&mut self) {
        if !self.committed && self.staging.root().exists() {
            log::warn!("Discarding incomplete bundle in {:?}", self.staging.root());
            let _ = fs::remove_dir_all(self.staging.root());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_moves_files_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("model");

        let writer = BundleWriter::new(&target).unwrap();
        fs::write(writer.staging().label_names(), r#"["joy"]"#).unwrap();
        fs::write(writer.staging().weights(WeightsFormat::Onnx), b"onnx").unwrap();
        let staging_root = writer.staging().root().to_path_buf();
        writer.commit().unwrap();

        let layout = BundleLayout::new(&target);
        assert!(layout.label_names().is_file());
        assert_eq!(layout.weights_format(), Some(WeightsFormat::Onnx));
        assert!(!staging_root.exists());
    }

    #[test]
    fn test_dropped_writer_leaves_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("model");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join(LABEL_NAMES_FILE), r#"["old"]"#).unwrap();

        let staging_root = {
            let writer = BundleWriter::new(&target).unwrap();
            fs::write(writer.staging().label_names(), r#"["new"]"#).unwrap();
            writer.staging().root().to_path_buf()
        };

        assert!(!staging_root.exists());
        let raw = fs::read_to_string(target.join(LABEL_NAMES_FILE)).unwrap();
        assert_eq!(raw, r#"["old"]"#);
    }

    #[test]
    fn test_commit_keeps_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("models");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("notes.txt"), "keep me").unwrap();
        fs::write(target.join(ONNX_FILE), b"old weights").unwrap();
        fs::write(target.join(LABEL_NAMES_FILE), r#"["old"]"#).unwrap();

        let writer = BundleWriter::new(&target).unwrap();
        fs::write(writer.staging().label_names(), r#"["new"]"#).unwrap();
        fs::write(writer.staging().weights(WeightsFormat::Safetensors), b"new weights").unwrap();
        let staging_root = writer.staging().root().to_path_buf();
        assert!(!staging_root.starts_with(fs::canonicalize(&target).unwrap()));
        writer.commit().unwrap();

        assert_eq!(fs::read_to_string(target.join("notes.txt")).unwrap(), "keep me");
        assert_eq!(fs::read_to_string(target.join(LABEL_NAMES_FILE)).unwrap(), r#"["new"]"#);
        assert!(!target.join(ONNX_FILE).exists());
        assert_eq!(
            BundleLayout::new(&target).weights_format(),
            Some(WeightsFormat::Safetensors)
        );
        assert!(!staging_root.exists());
    }

    #[test]
    fn test_dot_dot_target_resolves_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("train.py"), "print('hi')").unwrap();

        let writer = BundleWriter::new(root.join("sub").join("..")).unwrap();
        assert_eq!(writer.target(), root.as_path());
        assert_eq!(writer.staging().root().parent(), root.parent());
        fs::write(writer.staging().label_names(), r#"["joy"]"#).unwrap();
        let committed = writer.commit().unwrap();

        assert_eq!(committed, root);
        assert!(root.join("train.py").is_file());
        assert!(root.join("sub").is_dir());
        assert!(root.join(LABEL_NAMES_FILE).is_file());
    }

    #[test]
    fn test_file_target_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("model");
        fs::write(&target, "not a directory").unwrap();
        assert!(BundleWriter::new(&target).is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "not a directory");
    }

    #[test]
    fn test_safetensors_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        assert_eq!(layout.weights_format(), None);
        fs::write(layout.weights(WeightsFormat::Onnx), b"").unwrap();
        fs::write(layout.weights(WeightsFormat::Safetensors), b"").unwrap();
        assert_eq!(layout.weights_format(), Some(WeightsFormat::Safetensors));
    }
}
