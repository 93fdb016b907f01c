//! In-memory partition of discovered files plus the deletion selection.

use crate::models::{Category, MediaFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    notes: Vec<MediaFile>,
    other: Vec<MediaFile>,
    index: HashMap<PathBuf, Category>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.other.clear();
        self.index.clear();
    }

    pub fn list(&self, category: Category) -> &[MediaFile] {
        match category {
            Category::Notes => &self.notes,
            Category::Other => &self.other,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<MediaFile> {
        match category {
            Category::Notes => &mut self.notes,
            Category::Other => &mut self.other,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn category_of(&self, path: &Path) -> Option<Category> {
        self.index.get(path).copied()
    }

    /// Adds or replaces a file. A file already listed in the same category
    /// keeps its position; one listed in the other category moves.
    pub fn insert(&mut self, file: MediaFile, category: Category) {
        match self.index.get(&file.path).copied() {
            Some(existing) if existing == category => {
                let list = self.list_mut(category);
                if let Some(slot) = list.iter_mut().find(|f| **f == file) {
                    *slot = file;
                }
            }
            Some(existing) => {
                self.list_mut(existing).retain(|f| f.path != file.path);
                self.index.insert(file.path.clone(), category);
                self.list_mut(category).push(file);
            }
            None => {
                self.index.insert(file.path.clone(), category);
                self.list_mut(category).push(file);
            }
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<MediaFile> {
        let category = self.index.remove(path)?;
        let list = self.list_mut(category);
        let pos = list.iter().position(|f| f.path == path)?;
        Some(list.remove(pos))
    }

    /// Flips one file's selection; returns the new state, or `None` if the
    /// path is not listed.
    pub fn toggle(&mut self, path: &Path) -> Option<bool> {
        let category = self.category_of(path)?;
        let file = self.list_mut(category).iter_mut().find(|f| f.path == path)?;
        file.selected = !file.selected;
        Some(file.selected)
    }

    pub fn set_selected(&mut self, paths: &[PathBuf], selected: bool) -> usize {
        let mut changed = 0;
        for path in paths {
            let Some(category) = self.category_of(path) else {
                continue;
            };
            if let Some(f) = self.list_mut(category).iter_mut().find(|f| &f.path == path) {
                f.selected = selected;
                changed += 1;
            }
        }
        changed
    }

    pub fn select_all(&mut self, category: Category, selected: bool) -> usize {
        let list = self.list_mut(category);
        list.iter_mut().for_each(|f| f.selected = selected);
        list.len()
    }

    pub fn clear_selection(&mut self) {
        self.notes
            .iter_mut()
            .chain(self.other.iter_mut())
            .for_each(|f| f.selected = false);
    }

    pub fn selected(&self) -> Vec<MediaFile> {
        self.notes
            .iter()
            .chain(self.other.iter())
            .filter(|f| f.selected)
            .cloned()
            .collect()
    }

    /// Images before documents, then case-insensitive name.
    pub fn sort(&mut self) {
        for list in [&mut self.notes, &mut self.other] {
            sort_files(list);
        }
    }
}

pub fn sort_files(files: &mut [MediaFile]) {
    files.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;

    fn file(path: &str, kind: MediaKind) -> MediaFile {
        MediaFile::new(PathBuf::from(path), 1, kind)
    }

    fn names(store: &ResultStore, category: Category) -> Vec<String> {
        store.list(category).iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn images_sort_before_documents_then_by_name() {
        let mut store = ResultStore::new();
        store.insert(file("/m/b.png", MediaKind::Image), Category::Other);
        store.insert(file("/m/a.pdf", MediaKind::Document), Category::Other);
        store.insert(file("/m/a.png", MediaKind::Image), Category::Other);
        store.sort();
        assert_eq!(names(&store, Category::Other), vec!["a.png", "b.png", "a.pdf"]);
    }

    #[test]
    fn name_sort_ignores_case() {
        let mut files = vec![
            file("/m/b.jpg", MediaKind::Image),
            file("/m/A.jpg", MediaKind::Image),
            file("/m/c.jpg", MediaKind::Image),
        ];
        sort_files(&mut files);
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["A.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn same_path_is_listed_once_and_moves_between_categories() {
        let mut store = ResultStore::new();
        store.insert(file("/m/x.png", MediaKind::Image), Category::Notes);
        store.insert(file("/m/y.png", MediaKind::Image), Category::Notes);
        store.insert(file("/m/x.png", MediaKind::Image), Category::Notes);
        assert_eq!(names(&store, Category::Notes), vec!["x.png", "y.png"]);

        store.insert(file("/m/x.png", MediaKind::Image), Category::Other);
        assert_eq!(names(&store, Category::Notes), vec!["y.png"]);
        assert_eq!(names(&store, Category::Other), vec!["x.png"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn selection_operations() {
        let mut store = ResultStore::new();
        store.insert(file("/m/n.png", MediaKind::Image), Category::Notes);
        store.insert(file("/m/o1.png", MediaKind::Image), Category::Other);
        store.insert(file("/m/o2.png", MediaKind::Image), Category::Other);

        assert_eq!(store.toggle(Path::new("/m/n.png")), Some(true));
        assert_eq!(store.toggle(Path::new("/m/missing.png")), None);
        assert_eq!(store.select_all(Category::Other, true), 2);
        assert_eq!(store.selected().len(), 3);

        assert_eq!(store.set_selected(&[PathBuf::from("/m/o1.png")], false), 1);
        assert_eq!(store.selected().len(), 2);

        store.clear_selection();
        assert!(store.selected().is_empty());

        assert!(store.remove(Path::new("/m/o2.png")).is_some());
        assert_eq!(store.len(), 2);
        assert!(store.category_of(Path::new("/m/o2.png")).is_none());
    }
}
