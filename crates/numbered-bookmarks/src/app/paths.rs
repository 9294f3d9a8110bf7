//! Display labels and listing order for bookmarked paths.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::app::store::owning_folder;
use crate::domain::model::WorkspaceFolder;

/// Where a path sits relative to the folder the user is working in. Listing order follows the
/// variant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathGroup {
    CurrentFolder,
    OtherFolder,
    Outside,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLabel {
    pub group: PathGroup,
    /// Name of the owning folder, for paths inside any folder.
    pub folder: Option<String>,
    pub label: String,
}

/// Labels paths relative to the workspace folders.
#[derive(Debug, Clone, Default)]
pub struct PathDisplayResolver {
    folders: Vec<WorkspaceFolder>,
    current: Option<PathBuf>,
}

impl PathDisplayResolver {
    /// `current` is the root of the folder the user is working in. A single-folder workspace
    /// always treats its only folder as current.
    pub fn new(folders: &[WorkspaceFolder], current: Option<&Path>) -> Self {
        let current = current
            .map(Path::to_path_buf)
            .or_else(|| match folders {
                [only] => Some(only.root.clone()),
                _ => None,
            });
        Self {
            folders: folders.to_vec(),
            current,
        }
    }

    pub fn label(&self, path: &Path) -> PathLabel {
        let Some(folder) = owning_folder(&self.folders, path) else {
            return PathLabel {
                group: PathGroup::Outside,
                folder: None,
                label: path.display().to_string(),
            };
        };

        let relative = relative_display(path, &folder.root);
        if self.current.as_deref() == Some(folder.root.as_path()) {
            PathLabel {
                group: PathGroup::CurrentFolder,
                folder: Some(folder.name.clone()),
                label: relative,
            }
        } else {
            PathLabel {
                group: PathGroup::OtherFolder,
                folder: Some(folder.name.clone()),
                label: format!("[{}] {relative}", folder.name),
            }
        }
    }

    /// Listing order: current folder first, then other folders by name, then outside paths;
    /// alphabetical by label within a group.
    pub fn compare(&self, a: &Path, b: &Path) -> Ordering {
        let a = self.label(a);
        let b = self.label(b);
        a.group
            .cmp(&b.group)
            .then_with(|| a.folder.cmp(&b.folder))
            .then_with(|| a.label.cmp(&b.label))
    }
}

fn relative_display(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders() -> Vec<WorkspaceFolder> {
        vec![
            WorkspaceFolder::new("/work/api"),
            WorkspaceFolder::new("/work/web"),
        ]
    }

    #[test]
    fn labels_paths_by_group() {
        let resolver = PathDisplayResolver::new(&folders(), Some(Path::new("/work/web")));

        let current = resolver.label(Path::new("/work/web/src/app.ts"));
        assert_eq!(current.group, PathGroup::CurrentFolder);
        assert_eq!(current.label, "src/app.ts");

        let other = resolver.label(Path::new("/work/api/main.rs"));
        assert_eq!(other.group, PathGroup::OtherFolder);
        assert_eq!(other.label, "[api] main.rs");

        let outside = resolver.label(Path::new("/tmp/scratch.txt"));
        assert_eq!(outside.group, PathGroup::Outside);
        assert_eq!(outside.label, "/tmp/scratch.txt");
    }

    #[test]
    fn single_folder_is_always_current() {
        let resolver = PathDisplayResolver::new(&[WorkspaceFolder::new("/repo")], None);
        let label = resolver.label(Path::new("/repo/README.md"));
        assert_eq!(label.group, PathGroup::CurrentFolder);
        assert_eq!(label.label, "README.md");
    }

    #[test]
    fn compare_orders_groups_then_labels() {
        let resolver = PathDisplayResolver::new(&folders(), Some(Path::new("/work/web")));
        let mut paths = vec![
            PathBuf::from("/tmp/a.txt"),
            PathBuf::from("/work/api/z.rs"),
            PathBuf::from("/work/web/b.ts"),
            PathBuf::from("/work/api/a.rs"),
            PathBuf::from("/work/web/a.ts"),
        ];

        paths.sort_by(|a, b| resolver.compare(a, b));

        assert_eq!(
            paths,
            vec![
                PathBuf::from("/work/web/a.ts"),
                PathBuf::from("/work/web/b.ts"),
                PathBuf::from("/work/api/a.rs"),
                PathBuf::from("/work/api/z.rs"),
                PathBuf::from("/tmp/a.txt"),
            ]
        );
    }
}
