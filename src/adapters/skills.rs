//! Skill catalog reading a directory of `<id>/SKILL.md` plugins.

use crate::manifest::domain::Skill;
use crate::manifest::ports::{SkillCatalog, SkillCatalogError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

const SKILL_FILE: &str = "SKILL.md";

/// Skill catalog over a plugin directory.
///
/// Each subdirectory holding a `SKILL.md` is one skill. The file may start
/// with a `---` delimited front matter block carrying `name:` and
/// `description:` lines; the directory name is the skill identifier.
#[derive(Debug, Clone)]
pub struct DirectorySkillCatalog {
    root: PathBuf,
}

impl DirectorySkillCatalog {
    /// Creates a catalog rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_skill(dir: &Path) -> Result<Option<Skill>, SkillCatalogError> {
        let Some(id) = dir.file_name().and_then(|name| name.to_str()) else {
            return Ok(None);
        };
        if id.starts_with('.') {
            return Ok(None);
        }
        let manifest = dir.join(SKILL_FILE);
        let content = match tokio::fs::read_to_string(&manifest).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&manifest, &err)),
        };
        let front = FrontMatter::parse(&content);
        Ok(Some(Skill {
            id: id.to_owned(),
            name: front.name.unwrap_or_else(|| id.to_owned()),
            description: front.description.unwrap_or_default(),
            path: dir.to_path_buf(),
        }))
    }
}

#[async_trait]
impl SkillCatalog for DirectorySkillCatalog {
    async fn resolve(&self, name: &str) -> Result<Option<Skill>, SkillCatalogError> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Ok(None);
        }
        Self::read_skill(&self.root.join(name)).await
    }

    async fn list(&self) -> Result<Vec<Skill>, SkillCatalogError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.root, &err)),
        };
        let mut skills = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(&self.root, &err))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match Self::read_skill(&path).await {
                Ok(Some(skill)) => skills.push(skill),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable skill"),
            }
        }
        skills.sort_by_key(|skill| skill.name.to_lowercase());
        Ok(skills)
    }
}

#[derive(Debug, Default)]
struct FrontMatter {
    name: Option<String>,
    description: Option<String>,
}

impl FrontMatter {
    fn parse(content: &str) -> Self {
        let mut front = Self::default();
        let mut lines = content.lines();
        if lines.next().map(str::trim) != Some("---") {
            return front;
        }
        for line in lines {
            if line.trim() == "---" {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let text = value.trim().trim_matches(['"', '\'']).to_owned();
            match key.trim() {
                "name" => front.name = Some(text),
                "description" => front.description = Some(text),
                _ => {}
            }
        }
        front
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> SkillCatalogError {
    SkillCatalogError {
        reason: format!("{}: {err}", path.display()),
    }
}
