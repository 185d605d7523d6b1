//! Static quiz content.

use alloc::{boxed::Box, collections::BTreeMap, sync::Arc, vec::Vec};
use model::Quiz;
use std::{fs, io, path::Path};

/// Read-only access to quiz definitions.
pub trait QuizSource: Send + Sync + 'static {
    fn load(&self, id: &str) -> Option<Arc<Quiz>>;
    fn ids(&self) -> Vec<Box<str>>;
}

/// Quizzes held in memory, keyed by their identifier.
#[derive(Default)]
pub struct Library {
    quizzes: BTreeMap<Box<str>, Arc<Quiz>>,
}

impl Library {
    /// Loads every `*.json` file in the directory. The file stem becomes the quiz ID.
    /// Malformed or structurally invalid quizzes are skipped.
    pub fn load_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        let mut quizzes = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                log::warn!("skipping quiz with a non-UTF-8 name: {}", path.display());
                continue;
            };

            let text = fs::read_to_string(&path)?;
            let quiz: Quiz = match serde_json::from_str(&text) {
                Ok(quiz) => quiz,
                Err(err) => {
                    log::warn!("skipping malformed quiz {id}: {err}");
                    continue;
                }
            };

            if !quiz.is_valid() {
                log::warn!("skipping invalid quiz {id}");
                continue;
            }

            log::info!("loaded quiz {id} with {} questions", quiz.questions.len());
            quizzes.insert(id.into(), Arc::new(quiz));
        }
        Ok(Self { quizzes })
    }

    pub fn len(&self) -> usize {
        self.quizzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quizzes.is_empty()
    }
}

impl<K: Into<Box<str>>> FromIterator<(K, Quiz)> for Library {
    fn from_iter<T: IntoIterator<Item = (K, Quiz)>>(iter: T) -> Self {
        let quizzes = iter.into_iter().map(|(id, quiz)| (id.into(), Arc::new(quiz))).collect();
        Self { quizzes }
    }
}

impl QuizSource for Library {
    fn load(&self, id: &str) -> Option<Arc<Quiz>> {
        self.quizzes.get(id).cloned()
    }

    fn ids(&self) -> Vec<Box<str>> {
        self.quizzes.keys().cloned().collect()
    }
}
