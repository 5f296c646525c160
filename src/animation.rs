//! Animation index (`.cal`) parsing and project root inference.
//!
//! A `.cal` file sits next to a model and maps action names to clip files:
//!
//! ```text
//! // comment
//! run  = \Anims\run.caf   // trailing comments are stripped
//! everytime = idle.caf    // reserved, ignored
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use crate::error::Result;

/// Reserved directive, never an action
const RESERVED_KEY: &str = "everytime";

/// Folder clip paths fall back to under the project root
const OBJECTS_DIR: &str = "Objects";

/// Index extension looked up next to a model
pub const INDEX_EXTENSION: &str = "cal";

/// Project root for an asset: everything before the first path component
/// matching a marker, trying markers in order. Falls back to the asset's
/// own directory.
pub fn infer_project_root(asset: &Path, markers: &[String]) -> PathBuf {
    let components: Vec<Component> = asset.components().collect();
    for marker in markers {
        // The marker must be a directory, not the file name itself
        let found = components
            .iter()
            .take(components.len().saturating_sub(1))
            .position(|c| c.as_os_str() == marker.as_str());
        if let Some(position) = found {
            return components[..position].iter().collect();
        }
    }
    asset
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// `.cal` path belonging to a model, if `asset` is a `.cgf`
pub fn index_path_for(asset: &Path) -> Option<PathBuf> {
    let is_model = asset
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cgf"));
    is_model.then(|| asset.with_extension(INDEX_EXTENSION))
}

/// Components of `path` compared without regard to ASCII case
fn ends_with_ignore_case(path: &Path, suffix: &Path) -> Option<PathBuf> {
    let path: Vec<_> = path.components().collect();
    let suffix: Vec<_> = suffix.components().collect();
    if suffix.len() > path.len() {
        return None;
    }
    let split = path.len() - suffix.len();
    let matches = path[split..].iter().zip(&suffix).all(|(a, b)| {
        a.as_os_str()
            .to_string_lossy()
            .eq_ignore_ascii_case(&b.as_os_str().to_string_lossy())
    });
    matches.then(|| path[..split].iter().collect())
}

/// Base directory a clip path from the index is relative to.
///
/// When the model's directory ends with the clip's directory the clip path
/// is taken relative to the common prefix; otherwise it is relative to
/// `<project_root>/Objects`. A bare file name has an empty directory, which
/// every directory ends with, so it resolves next to the model.
fn resolve_base(source: &Path, target: &Path, project_root: &Path) -> PathBuf {
    let source_dir = source.parent().unwrap_or(Path::new(""));
    let target_dir = target.parent().unwrap_or(Path::new(""));
    ends_with_ignore_case(source_dir, target_dir).unwrap_or_else(|| project_root.join(OBJECTS_DIR))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnimationIndex {
    /// Action name to clip path, in file order
    entries: Vec<(String, PathBuf)>,
}

impl AnimationIndex {
    /// Parse index text belonging to the model at `source`
    pub fn parse(text: &str, source: &Path, project_root: &Path) -> Self {
        let mut index = Self::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let line = line.split("//").next().unwrap_or_default();
            let Some((key, value)) = line.split_once('=') else {
                warn!("Animation index line {} has no '=', skipping", number + 1);
                continue;
            };

            let action = key.trim();
            if action == RESERVED_KEY {
                continue;
            }
            let relative = value.trim().replace('\\', "/");
            let relative = Path::new(relative.trim_start_matches('/'));
            let path = resolve_base(source, relative, project_root).join(relative);
            index.insert(action, path);
        }
        debug!("Animation index lists {} actions", index.len());
        index
    }

    /// Read and parse the index file at `path`
    pub fn load(path: &Path, source: &Path, project_root: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text, source, project_root))
    }

    /// Later entries for the same action replace the path but keep the
    /// original position.
    pub fn insert(&mut self, action: &str, path: PathBuf) {
        match self.entries.iter_mut().find(|(a, _)| a == action) {
            Some(entry) => entry.1 = path,
            None => self.entries.push((action.to_string(), path)),
        }
    }

    pub fn get(&self, action: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(a, _)| a == action)
            .map(|(_, p)| p.as_path())
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(a, _)| a.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(a, p)| (a.as_str(), p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Short clip name: the file name without its extension
pub fn clip_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["Objects".to_string(), "Levels".to_string(), "Effects".to_string()]
    }

    #[test]
    fn test_reserved_key_and_comments() {
        let text = "run = \\Anims\\run.caf // loop\neverytime = foo\n";
        let source = Path::new("/game/Objects/Anims/hero.cgf");
        let index = AnimationIndex::parse(text, source, Path::new("/game"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.actions().collect::<Vec<_>>(), vec!["run"]);
        assert!(index.get("everytime").is_none());
        assert_eq!(
            index.get("run"),
            Some(Path::new("/game/Objects/Anims/run.caf"))
        );
    }

    #[test]
    fn test_comment_lines_and_blank_lines_skipped() {
        let text = "  // header\n\n   walk=walk.caf\nbroken line\n";
        let source = Path::new("/game/Objects/hero.cgf");
        let index = AnimationIndex::parse(text, source, Path::new("/game"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("walk"), Some(Path::new("/game/Objects/walk.caf")));
    }

    #[test]
    fn test_bare_file_name_resolves_next_to_model() {
        let text = "walk = walk.caf";
        let source = Path::new("/game/Objects/Characters/Hero/hero.cgf");
        let index = AnimationIndex::parse(text, source, Path::new("/game"));
        assert_eq!(
            index.get("walk"),
            Some(Path::new("/game/Objects/Characters/Hero/walk.caf"))
        );
    }

    #[test]
    fn test_unrelated_directory_falls_back_to_objects() {
        let text = "jump = Characters\\Shared\\jump.caf";
        let source = Path::new("/game/Objects/Characters/Hero/hero.cgf");
        let index = AnimationIndex::parse(text, source, Path::new("/game"));

        assert_eq!(
            index.get("jump"),
            Some(Path::new("/game/Objects/Characters/Shared/jump.caf"))
        );
    }

    #[test]
    fn test_suffix_match_ignores_case() {
        let text = "idle = anims/IDLE.caf";
        let source = Path::new("/game/Objects/Anims/hero.cgf");
        let index = AnimationIndex::parse(text, source, Path::new("/elsewhere"));
        assert_eq!(
            index.get("idle"),
            Some(Path::new("/game/Objects/anims/IDLE.caf"))
        );
    }

    #[test]
    fn test_duplicate_action_keeps_position() {
        let text = "a = one.caf\nb = two.caf\na = three.caf";
        let index = AnimationIndex::parse(text, Path::new("/m/x.cgf"), Path::new("/m"));
        let actions: Vec<_> = index.iter().map(|(a, p)| (a, clip_name(p))).collect();
        assert_eq!(
            actions,
            vec![("a", "three".to_string()), ("b", "two".to_string())]
        );
    }

    #[test]
    fn test_project_root_markers_in_order() {
        let root = infer_project_root(Path::new("/data/Levels/Objects/rock.cgf"), &markers());
        assert_eq!(root, PathBuf::from("/data/Levels"), "Objects is tried first");

        let root = infer_project_root(Path::new("/data/Effects/fire/fx.cgf"), &markers());
        assert_eq!(root, PathBuf::from("/data"));
    }

    #[test]
    fn test_project_root_fallback_is_asset_dir() {
        let root = infer_project_root(Path::new("/tmp/export/Objects"), &markers());
        assert_eq!(root, PathBuf::from("/tmp/export"), "a file named like a marker does not count");

        let root = infer_project_root(Path::new("/tmp/export/hero.cgf"), &markers());
        assert_eq!(root, PathBuf::from("/tmp/export"));
    }

    #[test]
    fn test_index_path_only_for_models() {
        assert_eq!(
            index_path_for(Path::new("/a/hero.CGF")),
            Some(PathBuf::from("/a/hero.cal"))
        );
        assert_eq!(index_path_for(Path::new("/a/run.caf")), None);
    }
}
