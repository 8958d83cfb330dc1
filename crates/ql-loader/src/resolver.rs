use std::path::{Component, Path, PathBuf};

use ql_core::{codes, ErrorDetail, ModuleLimits, QuillError};

use crate::source::SourceProvider;

/// Turns include references into canonical paths and guards against
/// circular inclusion with an ordered stack.
#[derive(Debug, Clone)]
pub struct PathResolver {
    project_root: PathBuf,
    search_paths: Vec<PathBuf>,
    extension: String,
    include_stack: Vec<PathBuf>,
}

impl PathResolver {
    pub fn new(
        project_root: impl Into<PathBuf>,
        search_paths: Vec<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            project_root: Self::normalize(&project_root.into()),
            search_paths: search_paths
                .iter()
                .map(|path| Self::normalize(path))
                .collect(),
            extension: extension.into(),
            include_stack: Vec::new(),
        }
    }

    pub fn from_limits(limits: &ModuleLimits) -> Self {
        Self::new(
            limits.project_root.clone(),
            limits.search_paths.clone(),
            limits.extension.clone(),
        )
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Appends the canonical extension to bare references.
    pub fn with_extension(&self, reference: &str) -> String {
        if Path::new(reference).extension().is_some() {
            reference.to_string()
        } else {
            format!("{}.{}", reference, self.extension)
        }
    }

    /// Candidate locations in lookup order, duplicates removed.
    pub fn candidates(&self, reference: &str, from_file: Option<&Path>) -> Vec<PathBuf> {
        let reference = self.with_extension(reference.trim());
        let from_dir = from_file.and_then(Path::parent);
        let mut out: Vec<PathBuf> = Vec::new();
        let mut push = |candidate: PathBuf| {
            let candidate = Self::normalize(&candidate);
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        };

        if let Some(rooted) = reference.strip_prefix('/') {
            push(self.project_root.join(rooted));
        }
        if Path::new(&reference).is_absolute() {
            push(PathBuf::from(&reference));
            return out;
        }
        if reference.starts_with('/') {
            return out;
        }

        let explicit = reference.starts_with("./") || reference.starts_with("../");
        if explicit {
            match from_dir {
                Some(dir) => push(dir.join(&reference)),
                None => push(self.project_root.join(&reference)),
            }
            return out;
        }

        if let Some(dir) = from_dir {
            push(dir.join(&reference));
        }
        for search in &self.search_paths {
            push(search.join(&reference));
        }
        push(self.project_root.join(&reference));
        out
    }

    /// First existing candidate wins.
    pub fn resolve(
        &self,
        reference: &str,
        from_file: Option<&Path>,
        source: &dyn SourceProvider,
    ) -> Option<PathBuf> {
        let found = self
            .candidates(reference, from_file)
            .into_iter()
            .find(|candidate| source.exists(candidate));
        tracing::debug!(reference, resolved = ?found, "include resolution");
        found
    }

    /// Lexical `.`/`..` collapse. Never touches the filesystem.
    pub fn normalize(path: &Path) -> PathBuf {
        let mut prefix: Option<PathBuf> = None;
        let mut rooted = false;
        let mut parts: Vec<String> = Vec::new();
        for component in path.components() {
            match component {
                Component::Prefix(value) => {
                    prefix = Some(PathBuf::from(value.as_os_str()));
                }
                Component::RootDir => rooted = true,
                Component::CurDir => {}
                Component::ParentDir => match parts.last() {
                    Some(last) if last != ".." => {
                        parts.pop();
                    }
                    _ if rooted => {}
                    _ => parts.push("..".to_string()),
                },
                Component::Normal(value) => parts.push(value.to_string_lossy().into_owned()),
            }
        }

        let mut out = prefix.unwrap_or_default();
        if rooted {
            out.push(Component::RootDir.as_os_str());
        }
        for part in parts {
            out.push(part);
        }
        if out.as_os_str().is_empty() {
            out.push(".");
        }
        out
    }

    pub fn include_stack(&self) -> &[PathBuf] {
        &self.include_stack
    }

    pub fn include_depth(&self) -> usize {
        self.include_stack.len()
    }

    /// Fails with the full cycle chain when `resolved` is already being loaded.
    pub fn push_include(&mut self, resolved: &Path) -> Result<(), QuillError> {
        if let Some(start) = self
            .include_stack
            .iter()
            .position(|entry| entry.as_path() == resolved)
        {
            let chain = self.include_stack[start..]
                .iter()
                .chain(std::iter::once(&resolved.to_path_buf()))
                .map(|entry| entry.display().to_string())
                .collect::<Vec<_>>();
            return Err(QuillError::new(
                codes::INCLUDE_CIRCULAR,
                format!("Circular include: {}", chain.join(" -> ")),
            )
            .suggest("Move the shared definitions into a file both sides include.")
            .detail(ErrorDetail::IncludeChain { chain }));
        }
        self.include_stack.push(resolved.to_path_buf());
        Ok(())
    }

    pub fn pop_include(&mut self) -> Option<PathBuf> {
        self.include_stack.pop()
    }
}

#[cfg(test)]
mod resolver_tests {
    use super::*;
    use crate::source::MemorySource;

    fn resolver() -> PathResolver {
        PathResolver::new("/story", vec![PathBuf::from("/shared/lib")], "ql")
    }

    #[test]
    fn normalize_collapses_without_filesystem() {
        assert_eq!(
            PathResolver::normalize(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(
            PathResolver::normalize(Path::new("../../a/b/..")),
            PathBuf::from("../../a")
        );
        assert_eq!(
            PathResolver::normalize(Path::new("/../../a")),
            PathBuf::from("/a")
        );
        assert_eq!(PathResolver::normalize(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn bare_references_get_extension() {
        let resolver = resolver();
        assert_eq!(resolver.with_extension("util/math"), "util/math.ql");
        assert_eq!(resolver.with_extension("data.json"), "data.json");
    }

    #[test]
    fn candidate_order_follows_lookup_rules() {
        let resolver = resolver();
        let from = Path::new("/story/chapters/one.ql");
        assert_eq!(
            resolver.candidates("util", Some(from)),
            vec![
                PathBuf::from("/story/chapters/util.ql"),
                PathBuf::from("/shared/lib/util.ql"),
                PathBuf::from("/story/util.ql"),
            ]
        );
        assert_eq!(
            resolver.candidates("../util", Some(from)),
            vec![PathBuf::from("/story/util.ql")]
        );
        assert_eq!(
            resolver.candidates("/lib/util", Some(from))[0],
            PathBuf::from("/story/lib/util.ql")
        );
    }

    #[test]
    fn first_existing_candidate_wins() {
        let resolver = resolver();
        let source = MemorySource::from_entries([
            ("/shared/lib/util.ql", "a"),
            ("/story/util.ql", "b"),
        ]);
        assert_eq!(
            resolver.resolve("util", Some(Path::new("/story/chapters/one.ql")), &source),
            Some(PathBuf::from("/shared/lib/util.ql"))
        );
        assert_eq!(resolver.resolve("nope", None, &source), None);
    }

    #[test]
    fn cycle_reports_chain_and_recovers() {
        let mut resolver = resolver();
        resolver.push_include(Path::new("A")).expect("push A");
        resolver.push_include(Path::new("B")).expect("push B");
        let error = resolver
            .push_include(Path::new("A"))
            .expect_err("cycle");
        assert_eq!(error.code, codes::INCLUDE_CIRCULAR);
        assert_eq!(
            error.include_chain().map(|chain| chain.join(" -> ")),
            Some("A -> B -> A".to_string())
        );
        assert_eq!(resolver.include_depth(), 2);

        resolver.pop_include();
        resolver.pop_include();
        resolver.push_include(Path::new("A")).expect("push A again");
    }
}
