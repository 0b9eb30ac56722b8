//! Rules file resolution (§6): each stage loads `blog-<stage>.md` from a
//! configured directory; a missing file yields an empty rules block.

use std::path::Path;

use crate::registry::Stage;

/// Load the rules text for `stage` from `rules_dir`, returning an empty
/// string if the file is absent.
pub fn load_rules(rules_dir: &Path, stage: Stage) -> String {
    let path = rules_dir.join(stage.meta().rules_file);
    std::fs::read_to_string(&path).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rules_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_rules(dir.path(), Stage::Research), "");
    }

    #[test]
    fn present_rules_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blog-outline.md"), "Keep it punchy.").unwrap();
        assert_eq!(load_rules(dir.path(), Stage::Outline), "Keep it punchy.");
    }
}
