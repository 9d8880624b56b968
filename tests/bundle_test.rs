use std::fs;

use emotion_classifier::bundle::{BundleLayout, BundleWriter, LABEL_NAMES_FILE};
use emotion_classifier::labels::LabelVocabulary;

// Changes the working directory, so it is the only test in this binary.
#[test]
fn test_export_to_current_directory_keeps_its_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    fs::write(root.join("train.py"), "print('train')").unwrap();
    std::env::set_current_dir(&root).unwrap();

    let writer = BundleWriter::new(".").unwrap();
    assert_eq!(writer.target(), root.as_path());
    assert!(!writer.staging().root().starts_with(&root));

    let labels = LabelVocabulary::new(vec!["joy".into(), "neutral".into()]);
    labels.save(writer.staging().label_names()).unwrap();
    let committed = writer.commit().unwrap();

    assert_eq!(committed, root);
    assert_eq!(fs::read_to_string(root.join("train.py")).unwrap(), "print('train')");
    let loaded = LabelVocabulary::load(BundleLayout::new(&root).label_names()).unwrap();
    assert_eq!(loaded, labels);
    assert!(root.join(LABEL_NAMES_FILE).is_file());
}
