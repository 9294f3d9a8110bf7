//! Resolving a numbered jump to a concrete file and line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::app::store::{Controller, same_path};
use crate::domain::model::Slot;

/// How a slot number resolves across the files of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationPolicy {
    /// Only the active file's slot counts.
    #[default]
    Strict,
    /// A slot lives in at most one file at a time.
    Replace,
    /// A slot may be set in many files; repeated jumps cycle through them.
    AllowDuplicates,
}

impl NavigationPolicy {
    /// Identifier used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationPolicy::Strict => "strict",
            NavigationPolicy::Replace => "replace",
            NavigationPolicy::AllowDuplicates => "allowDuplicates",
        }
    }
}

impl fmt::Display for NavigationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationPolicy {
    type Err = NavigationPolicyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" | "false" => Ok(NavigationPolicy::Strict),
            "replace" => Ok(NavigationPolicy::Replace),
            "allowduplicates" | "allow-duplicates" | "allow_duplicates" => {
                Ok(NavigationPolicy::AllowDuplicates)
            }
            other => Err(NavigationPolicyParseError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Error returned when parsing a [`NavigationPolicy`] fails.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum NavigationPolicyParseError {
    #[error("unknown navigation policy '{0}' (expected strict, replace, or allowDuplicates)")]
    UnknownPolicy(String),
}

/// Where a jump lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    pub path: PathBuf,
    pub line: usize,
}

/// Outcome of resolving a jump. `NotDefined` is an ordinary result, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Target(NavigationTarget),
    NotDefined { slot: Slot },
}

impl Resolution {
    pub fn target(&self) -> Option<&NavigationTarget> {
        match self {
            Resolution::Target(target) => Some(target),
            Resolution::NotDefined { .. } => None,
        }
    }
}

/// Decides the next jump target for a slot under one policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationResolver {
    policy: NavigationPolicy,
}

impl NavigationResolver {
    pub fn new(policy: NavigationPolicy) -> Self {
        Self { policy }
    }

    /// Resolve `slot` from the file at `active`, with the cursor on `cursor_line` when known.
    ///
    /// An untracked active file behaves like a file with every slot empty.
    pub fn resolve(
        &self,
        controller: &Controller,
        active: &Path,
        slot: Slot,
        cursor_line: Option<usize>,
    ) -> Resolution {
        let local = controller.lookup(active).and_then(|set| set.get(slot));

        let target = match self.policy {
            NavigationPolicy::Strict => local.map(|line| target_in(active, line)),
            NavigationPolicy::Replace => local
                .map(|line| target_in(active, line))
                .or_else(|| first_elsewhere(controller, active, slot, 0)),
            NavigationPolicy::AllowDuplicates => match local {
                Some(line) if cursor_line != Some(line) => Some(target_in(active, line)),
                _ => {
                    let from = controller.index_of(active).map_or(0, |index| index + 1);
                    first_elsewhere(controller, active, slot, from)
                }
            },
        };

        debug!(%slot, policy = %self.policy, found = target.is_some(), "resolved jump");
        match target {
            Some(target) => Resolution::Target(target),
            None => Resolution::NotDefined { slot },
        }
    }
}

fn target_in(path: &Path, line: usize) -> NavigationTarget {
    NavigationTarget {
        path: path.to_path_buf(),
        line,
    }
}

/// First file other than `active` holding `slot`, scanning from `from` to the end and then
/// wrapping around to the start.
fn first_elsewhere(
    controller: &Controller,
    active: &Path,
    slot: Slot,
    from: usize,
) -> Option<NavigationTarget> {
    let files = controller.files();
    let from = from.min(files.len());
    files[from..]
        .iter()
        .chain(&files[..from])
        .filter(|set| !same_path(set.path(), active))
        .find_map(|set| set.get(slot).map(|line| target_in(set.path(), line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::store::StoreScope;

    fn slot(index: usize) -> Slot {
        Slot::new(index).expect("valid slot")
    }

    fn store(marks: &[(&str, usize, usize)]) -> Controller {
        let mut controller = Controller::new(StoreScope::Session);
        for &(path, index, line) in marks {
            controller.add_file(path, None).toggle(slot(index), line);
        }
        controller
    }

    fn landed(resolution: &Resolution) -> Option<(&Path, usize)> {
        resolution
            .target()
            .map(|target| (target.path.as_path(), target.line))
    }

    #[test]
    fn parses_policy_aliases() {
        assert_eq!("false".parse::<NavigationPolicy>(), Ok(NavigationPolicy::Strict));
        assert_eq!(" Replace ".parse::<NavigationPolicy>(), Ok(NavigationPolicy::Replace));
        assert_eq!(
            "allowDuplicates".parse::<NavigationPolicy>(),
            Ok(NavigationPolicy::AllowDuplicates)
        );
        assert!("sometimes".parse::<NavigationPolicy>().is_err());
    }

    #[test]
    fn strict_only_consults_active_file() {
        let controller = store(&[("/a.txt", 1, 4), ("/b.txt", 2, 9)]);
        let resolver = NavigationResolver::new(NavigationPolicy::Strict);

        let hit = resolver.resolve(&controller, Path::new("/a.txt"), slot(1), None);
        assert_eq!(landed(&hit), Some((Path::new("/a.txt"), 4)));

        let miss = resolver.resolve(&controller, Path::new("/a.txt"), slot(2), None);
        assert_eq!(miss, Resolution::NotDefined { slot: slot(2) });
    }

    #[test]
    fn replace_prefers_local_then_scans_in_order() {
        let mut controller = store(&[("/a.txt", 0, 1)]);
        controller.add_file("/b.txt", None);
        controller.add_file("/c.txt", None).toggle(slot(3), 12);
        let resolver = NavigationResolver::new(NavigationPolicy::Replace);

        let local = resolver.resolve(&controller, Path::new("/a.txt"), slot(0), Some(1));
        assert_eq!(landed(&local), Some((Path::new("/a.txt"), 1)));

        let remote = resolver.resolve(&controller, Path::new("/a.txt"), slot(3), None);
        assert_eq!(landed(&remote), Some((Path::new("/c.txt"), 12)));

        let none = resolver.resolve(&controller, Path::new("/b.txt"), slot(7), None);
        assert_eq!(none, Resolution::NotDefined { slot: slot(7) });
    }

    #[test]
    fn allow_duplicates_scans_forward_before_wrapping() {
        let mut controller = store(&[("/f0.txt", 3, 5)]);
        controller.add_file("/f1.txt", None);
        controller.add_file("/f2.txt", None).toggle(slot(3), 8);
        let resolver = NavigationResolver::new(NavigationPolicy::AllowDuplicates);

        let first = resolver.resolve(&controller, Path::new("/f1.txt"), slot(3), Some(0));
        assert_eq!(landed(&first), Some((Path::new("/f2.txt"), 8)));

        // The jump left the cursor on F2's bookmark, so the next jump wraps to F0.
        let second = resolver.resolve(&controller, Path::new("/f2.txt"), slot(3), Some(8));
        assert_eq!(landed(&second), Some((Path::new("/f0.txt"), 5)));
    }

    #[test]
    fn allow_duplicates_stays_local_when_cursor_is_elsewhere() {
        let controller = store(&[("/f0.txt", 3, 5), ("/f2.txt", 3, 8)]);
        let resolver = NavigationResolver::new(NavigationPolicy::AllowDuplicates);

        let local = resolver.resolve(&controller, Path::new("/f2.txt"), slot(3), Some(2));
        assert_eq!(landed(&local), Some((Path::new("/f2.txt"), 8)));
    }

    #[test]
    fn allow_duplicates_never_returns_the_active_file_from_a_scan() {
        let controller = store(&[("/f0.txt", 6, 2), ("/f1.txt", 1, 0)]);
        let resolver = NavigationResolver::new(NavigationPolicy::AllowDuplicates);

        let resolution = resolver.resolve(&controller, Path::new("/f0.txt"), slot(6), Some(2));
        assert_eq!(resolution, Resolution::NotDefined { slot: slot(6) });
    }

    #[test]
    fn allow_duplicates_from_untracked_file_scans_from_start() {
        let controller = store(&[("/f0.txt", 4, 1), ("/f1.txt", 4, 3)]);
        let resolver = NavigationResolver::new(NavigationPolicy::AllowDuplicates);

        let resolution = resolver.resolve(&controller, Path::new("/new.txt"), slot(4), None);
        assert_eq!(landed(&resolution), Some((Path::new("/f0.txt"), 1)));
    }
}
