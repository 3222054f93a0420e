use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{SoundCatalog, SoundCategory, SoundEntry, SoundFile, TrackInfo};
use crate::audio::{AudioError, AudioResult};

/// Biblioteca de sonidos sobre dos directorios locales (música y efectos)
pub struct SoundLibrary {
    music_dir: PathBuf,
    effects_dir: PathBuf,
    separators: Regex,
    word_start: Regex,
}

impl SoundLibrary {
    pub async fn new(music_dir: PathBuf, effects_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&music_dir).await?;
        fs::create_dir_all(&effects_dir).await?;

        info!(
            "📁 Biblioteca de sonidos: música en {}, efectos en {}",
            music_dir.display(),
            effects_dir.display()
        );

        Ok(Self {
            music_dir,
            effects_dir,
            separators: Regex::new(r"[-_]+")?,
            word_start: Regex::new(r"\b\w")?,
        })
    }

    fn dir(&self, category: SoundCategory) -> &Path {
        match category {
            SoundCategory::Music => &self.music_dir,
            SoundCategory::Effects => &self.effects_dir,
        }
    }

    /// `lofi_beats-vol-2.mp3` → `Lofi Beats Vol 2`
    pub fn humanize(&self, filename: &str) -> String {
        let stem = file_stem(filename);
        let spaced = self.separators.replace_all(stem, " ");
        self.word_start
            .replace_all(&spaced, |caps: &Captures| caps[0].to_uppercase())
            .into_owned()
    }

    fn to_file(&self, category: SoundCategory, info: TrackInfo) -> SoundFile {
        let path = self.dir(category).join(&info.filename);
        SoundFile { info, path }
    }
}

#[async_trait]
impl SoundCatalog for SoundLibrary {
    async fn list(&self, category: SoundCategory) -> AudioResult<Vec<SoundEntry>> {
        let dir = self.dir(category);
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| AudioError::Catalog(format!("{}: {}", dir.display(), e)))?;

        let mut results = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AudioError::Catalog(e.to_string()))?
        {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if filename.starts_with('.') {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Ignorando archivo inaccesible {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            let created_at = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();

            results.push(SoundEntry {
                info: TrackInfo {
                    id: file_stem(&filename).to_string(),
                    name: self.humanize(&filename),
                    filename,
                    category,
                },
                size: metadata.len(),
                created_at,
            });
        }

        sort_newest_first(&mut results);
        debug!("📋 {} sonidos en {}", results.len(), category.as_str());
        Ok(results)
    }

    async fn resolve(&self, category: SoundCategory, query: &str) -> AudioResult<SoundFile> {
        let query = query.trim();
        let not_found = || AudioError::NotFound {
            category,
            query: query.to_string(),
        };
        if query.is_empty() {
            return Err(not_found());
        }

        let entries = self.list(category).await?;

        if let Some(exact) = entries.iter().find(|entry| entry.info.id == query) {
            return Ok(self.to_file(category, exact.info.clone()));
        }

        let lower = query.to_lowercase();
        entries
            .into_iter()
            .find(|entry| {
                entry.info.id.to_lowercase() == lower || entry.info.name.to_lowercase().contains(&lower)
            })
            .map(|entry| self.to_file(category, entry.info))
            .ok_or_else(not_found)
    }
}

fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => &filename[..dot],
        _ => filename,
    }
}

/// Más recientes primero; a igual fecha, por id.
fn sort_newest_first(entries: &mut [SoundEntry]) {
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.info.id.cmp(&b.info.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn library() -> (TempDir, SoundLibrary) {
        let dir = tempfile::tempdir().unwrap();
        let library = SoundLibrary::new(dir.path().join("music"), dir.path().join("effects"))
            .await
            .unwrap();
        (dir, library)
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"ID3").unwrap();
    }

    #[tokio::test]
    async fn test_humanize_replaces_separators_and_capitalises() {
        let (_dir, library) = library().await;
        assert_eq!(library.humanize("lofi_beats-vol-2.mp3"), "Lofi Beats Vol 2");
        assert_eq!(library.humanize("air--horn__loud.wav"), "Air Horn Loud");
        assert_eq!(library.humanize("ambience"), "Ambience");
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_hidden_files() {
        let (dir, library) = library().await;
        let music = dir.path().join("music");
        touch(&music, "track.mp3");
        touch(&music, ".DS_Store");
        std::fs::create_dir(music.join("subdir")).unwrap();

        let entries = library.list(SoundCategory::Music).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].info.id, "track");
        assert_eq!(entries[0].info.filename, "track.mp3");
        assert_eq!(entries[0].info.category, SoundCategory::Music);
        assert_eq!(entries[0].size, 3);
    }

    #[tokio::test]
    async fn test_categories_are_separate() {
        let (dir, library) = library().await;
        touch(&dir.path().join("effects"), "boom.wav");

        assert!(library.list(SoundCategory::Music).await.unwrap().is_empty());
        assert_eq!(library.list(SoundCategory::Effects).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_prefers_exact_id() {
        let (dir, library) = library().await;
        let music = dir.path().join("music");
        touch(&music, "rain.ogg");
        touch(&music, "rain-forest.mp3");

        let file = library.resolve(SoundCategory::Music, "rain").await.unwrap();

        assert_eq!(file.info.filename, "rain.ogg");
        assert_eq!(file.path, music.join("rain.ogg"));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_case_insensitive_name() {
        let (dir, library) = library().await;
        touch(&dir.path().join("music"), "tavern_night.mp3");

        let by_id = library.resolve(SoundCategory::Music, "TAVERN_NIGHT").await.unwrap();
        let by_name = library.resolve(SoundCategory::Music, "tavern n").await.unwrap();

        assert_eq!(by_id.info.name, "Tavern Night");
        assert_eq!(by_name.info.id, "tavern_night");
    }

    #[tokio::test]
    async fn test_resolve_miss_is_not_found() {
        let (dir, library) = library().await;
        touch(&dir.path().join("effects"), "boom.wav");

        let result = library.resolve(SoundCategory::Effects, "laser").await;
        assert!(matches!(
            result,
            Err(AudioError::NotFound { category: SoundCategory::Effects, ref query }) if query == "laser"
        ));

        let empty = library.resolve(SoundCategory::Effects, "  ").await;
        assert!(matches!(empty, Err(AudioError::NotFound { .. })));
    }

    #[test]
    fn test_sort_newest_first() {
        let entry = |id: &str, secs: i64| SoundEntry {
            info: TrackInfo {
                id: id.to_string(),
                name: id.to_string(),
                filename: format!("{}.mp3", id),
                category: SoundCategory::Music,
            },
            size: 0,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        };
        let mut entries = vec![entry("old", 10), entry("new", 30), entry("b", 20), entry("a", 20)];

        sort_newest_first(&mut entries);

        let ids: Vec<_> = entries.iter().map(|e| e.info.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "a", "b", "old"]);
    }

    #[test]
    fn test_file_stem_keeps_dotfiles_and_inner_dots() {
        assert_eq!(file_stem("song.final.mp3"), "song.final");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }
}
